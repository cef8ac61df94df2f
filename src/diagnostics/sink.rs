//! The single collection point for diagnostics.
use super::error::{Diagnostic, ErrorCode, Severity};
use serde::Serialize;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Default, Serialize)]
pub struct DiagnosticSink {
    entries: Vec<Diagnostic>,
}

impl DiagnosticSink {
    pub fn new() -> Self { Self::default() }

    /// Records a diagnostic and emits it through `tracing` at the matching level.
    pub fn report(&mut self, diagnostic: Diagnostic) {
        let code = diagnostic.code.code();
        let section = diagnostic.section.to_string();
        match diagnostic.severity {
            Severity::Error => error!(code, section = %section, details = ?diagnostic.details, "{}", diagnostic.message),
            Severity::Warning => warn!(code, section = %section, details = ?diagnostic.details, "{}", diagnostic.message),
            Severity::Info => info!(code, section = %section, "{}", diagnostic.message),
        }
        self.entries.push(diagnostic);
    }

    pub fn extend(&mut self, diagnostics: impl IntoIterator<Item = Diagnostic>) {
        for d in diagnostics {
            self.report(d);
        }
    }

    pub fn entries(&self) -> &[Diagnostic] { &self.entries }

    pub fn with_code(&self, code: ErrorCode) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter().filter(move |d| d.code == code)
    }

    pub fn contains(&self, code: ErrorCode) -> bool { self.with_code(code).next().is_some() }

    pub fn error_count(&self) -> usize { self.entries.iter().filter(|d| d.is_error()).count() }

    pub fn len(&self) -> usize { self.entries.len() }
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    pub fn into_entries(self) -> Vec<Diagnostic> { self.entries }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sink_counts_and_filters() {
        let mut sink = DiagnosticSink::new();
        sink.report(Diagnostic::new(ErrorCode::CyclicDependencies, "x -> y -> x"));
        sink.report(Diagnostic::new(ErrorCode::Inconsistency, "1 != 2"));
        sink.report(Diagnostic::new(ErrorCode::Inconsistency, "3 != 4"));

        assert_eq!(sink.len(), 3);
        assert_eq!(sink.error_count(), 1);
        assert_eq!(sink.with_code(ErrorCode::Inconsistency).count(), 2);
        assert!(!sink.contains(ErrorCode::MissingParameterValue));
    }
}
