// Library root: the XBRL formula evaluation core.
// Parsing linkbases and instances, and evaluating XPath, belong to collaborators
// that plug in through `ArcProvider`, `Instance` and `ExpressionEvaluator`.

pub mod analysis;
pub mod computation;
pub mod config;
pub mod consistency;
pub mod diagnostics;
pub mod graph;
pub mod processor;
pub mod resolve;
pub mod store;
pub mod validation;
pub mod variables;

pub mod display {
    pub mod trace;
}

#[cfg(test)]
pub(crate) mod testing;

pub use computation::{Bindings, EvaluationContext, EvaluationError, ExpressionEvaluator, GeneratedFacts, Value};
pub use config::{ConfigError, EngineConfig};
pub use consistency::ConsistencyVerdict;
pub use diagnostics::{Diagnostic, DiagnosticSink, ErrorCode, Severity};
pub use processor::{FormulaProcessor, RunReport, RunSummary};
pub use store::{ArcProvider, Instance, QName, ResourceRegistry};
