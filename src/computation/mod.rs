//! Binds variables, evaluates variable sets and accumulates their output.
pub mod binding;
pub mod context;
pub mod engine;
pub mod evaluator;
pub mod ledger;
pub mod value;

pub use context::{EvaluationContext, EvaluationEnv};
pub use engine::{process_evaluation_result, Scheduler, SetOutcome, SetStatus};
pub use evaluator::{scan_variable_references, Bindings, EvaluationError, ExpressionEvaluator};
pub use ledger::{EvaluationOutcome, EvaluationResult, GeneratedFacts};
pub use value::{Value, XsType};
