//! Consistency assertions: equality rules and the checker that applies them.
pub mod checker;
pub mod equality;

pub use checker::{ConsistencyChecker, ConsistencyVerdict};
pub use equality::{context_equal, precision_to_decimals, tolerance_for, unit_equal, value_equal, Tolerance};
