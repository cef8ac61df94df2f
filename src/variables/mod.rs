//! Variable sets, variables, filters and parameters.
pub mod factory;
pub mod filter;
pub mod parameter;
pub mod variable;
pub mod variable_set;

pub use factory::{FactoryDefaults, ResourceFactory};
pub use filter::{aspect_values, Aspect, AspectModel, FactView, Filter, FilterKind};
pub use parameter::Parameter;
pub use variable::{FactVariable, GeneralVariable, ScopeBinding, ScopeVariable, Variable};
pub use variable_set::{
    ConsistencyRules, FormulaRules, Precondition, VariableSet, VariableSetKey, VariableSetKind,
};
