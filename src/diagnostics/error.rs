//! Defines the diagnostic types shared by every resolver and the scheduler.
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Category tag carried by every diagnostic entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Section {
    Parameters,
    Variables,
    Filters,
    Dependencies,
    Scope,
    Evaluation,
    Consistency,
    Resources,
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Section::Parameters => "parameters",
            Section::Variables => "variables",
            Section::Filters => "filters",
            Section::Dependencies => "dependencies",
            Section::Scope => "scope",
            Section::Evaluation => "evaluation",
            Section::Consistency => "consistency",
            Section::Resources => "resources",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// The machine-readable error taxonomy.
///
// Matching on the variant is how callers decide whether a diagnostic is fatal
// to the unit of work they are building.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ErrorCode {
    CyclicDependencies,
    ParameterCyclicDependencies,
    UnresolvedDependency,
    MissingParameterValue,
    ParameterTypeMismatch,
    FilterAspectModelMismatch,
    VariableSetFilterCovered,
    FactVariableReferenceNotAllowed,
    FallbackValueVariableReferenceNotAllowed,
    DirectedCycleError,
    DifferentInstances,
    DifferentAspectModels,
    DifferentVariableSetTypes,
    MissingTargetFormula,
    UnknownResourceType,
    MissingConceptRule,
    UndefinedSource,
    EvaluationFailure,
    Inconsistency,
}

impl ErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            ErrorCode::CyclicDependencies => "xbrlve:cyclicDependencies",
            ErrorCode::ParameterCyclicDependencies => "xbrlve:parameterCyclicDependencies",
            ErrorCode::UnresolvedDependency => "xbrlve:unresolvedDependency",
            ErrorCode::MissingParameterValue => "xbrlve:missingParameterValue",
            ErrorCode::ParameterTypeMismatch => "xbrlve:parameterTypeMismatch",
            ErrorCode::FilterAspectModelMismatch => "xbrlve:filterAspectModelMismatch",
            ErrorCode::VariableSetFilterCovered => "xbrlve:variableSetFilterCovered",
            ErrorCode::FactVariableReferenceNotAllowed => "xbrlve:factVariableReferenceNotAllowed",
            ErrorCode::FallbackValueVariableReferenceNotAllowed => "xbrlve:fallbackValueVariableReferenceNotAllowed",
            ErrorCode::DirectedCycleError => "xbrlvarscopee:directedCycleError",
            ErrorCode::DifferentInstances => "xbrlvarscopee:differentInstances",
            ErrorCode::DifferentAspectModels => "xbrlvarscopee:differentAspectModels",
            ErrorCode::DifferentVariableSetTypes => "xbrlvarscopee:differentVariableSetTypes",
            ErrorCode::MissingTargetFormula => "xbrlcae:missingTargetFormula",
            ErrorCode::UnknownResourceType => "xbrlfe:unknownResourceType",
            ErrorCode::MissingConceptRule => "xbrlfe:missingConceptRule",
            ErrorCode::UndefinedSource => "xbrlfe:undefinedSAV",
            ErrorCode::EvaluationFailure => "xbrlve:evaluationFailure",
            ErrorCode::Inconsistency => "xbrlcae:inconsistency",
        }
    }

    pub fn section(&self) -> Section {
        match self {
            ErrorCode::ParameterCyclicDependencies
            | ErrorCode::MissingParameterValue
            | ErrorCode::ParameterTypeMismatch => Section::Parameters,
            ErrorCode::CyclicDependencies | ErrorCode::UnresolvedDependency => Section::Dependencies,
            ErrorCode::FilterAspectModelMismatch
            | ErrorCode::VariableSetFilterCovered
            | ErrorCode::FactVariableReferenceNotAllowed => Section::Filters,
            ErrorCode::FallbackValueVariableReferenceNotAllowed => Section::Variables,
            ErrorCode::DirectedCycleError
            | ErrorCode::DifferentInstances
            | ErrorCode::DifferentAspectModels
            | ErrorCode::DifferentVariableSetTypes => Section::Scope,
            ErrorCode::MissingTargetFormula | ErrorCode::Inconsistency => Section::Consistency,
            ErrorCode::UnknownResourceType => Section::Resources,
            ErrorCode::MissingConceptRule | ErrorCode::UndefinedSource | ErrorCode::EvaluationFailure => {
                Section::Evaluation
            }
        }
    }

    /// Type/value and consistency problems are warnings; structural problems are errors.
    pub fn default_severity(&self) -> Severity {
        match self {
            ErrorCode::ParameterTypeMismatch
            | ErrorCode::FilterAspectModelMismatch
            | ErrorCode::VariableSetFilterCovered
            | ErrorCode::FactVariableReferenceNotAllowed
            | ErrorCode::FallbackValueVariableReferenceNotAllowed
            | ErrorCode::DifferentInstances
            | ErrorCode::DifferentAspectModels
            | ErrorCode::DifferentVariableSetTypes
            | ErrorCode::Inconsistency => Severity::Warning,
            _ => Severity::Error,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.code()) }
}

/// A structured report entry.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("[{code}] {message}")]
pub struct Diagnostic {
    pub section: Section,
    pub code: ErrorCode,
    pub severity: Severity,
    pub message: String,
    /// Variable/formula labels, roles and similar context.
    pub details: BTreeMap<String, String>,
}

impl Diagnostic {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            section: code.section(),
            code,
            severity: code.default_severity(),
            message: message.into(),
            details: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn is_error(&self) -> bool { self.severity == Severity::Error }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_display_and_defaults() {
        let d = Diagnostic::new(ErrorCode::ParameterTypeMismatch, "expected xs:integer").with("parameter", "p1");
        assert_eq!(d.to_string(), "[xbrlve:parameterTypeMismatch] expected xs:integer");
        assert_eq!(d.section, Section::Parameters);
        assert_eq!(d.severity, Severity::Warning);
        assert_eq!(d.details.get("parameter").map(String::as_str), Some("p1"));
        assert!(std::error::Error::source(&d).is_none());

        let cyc = Diagnostic::new(ErrorCode::CyclicDependencies, "a -> b -> a");
        assert!(cyc.is_error());
        assert_eq!(cyc.section, Section::Dependencies);
    }
}
