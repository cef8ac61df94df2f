//! Structured diagnostics: error codes, sections and the shared sink.
pub mod error;
pub mod sink;

pub use error::{Diagnostic, ErrorCode, Section, Severity};
pub use sink::DiagnosticSink;
