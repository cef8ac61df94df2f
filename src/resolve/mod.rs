//! Turns taxonomy resources into resolved, ordered variable sets.
pub mod parameters;
pub mod scope;
pub mod variables;

pub use parameters::{parameter_from_resource, ParameterResolver};
pub use scope::{global_order, ScopeResolver};
pub use variables::{order_variables, VariableResolver};
