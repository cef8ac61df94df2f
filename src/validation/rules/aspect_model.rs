//! Validation rule for filters against the variable set's aspect model.

use crate::diagnostics::{Diagnostic, ErrorCode};
use crate::variables::{AspectModel, Filter, VariableSet};

/// Dimension filters need the dimensional aspect model; segment and scenario
/// filters are only meaningful under the non-dimensional one.
pub(crate) fn validate_aspect_model(set: &VariableSet, variable: &str, filter: &Filter) -> Option<Diagnostic> {
    let mismatch = match set.aspect_model {
        AspectModel::NonDimensional => filter.is_dimensional(),
        AspectModel::Dimensional => filter.is_non_dimensional_only(),
    };
    if !mismatch {
        return None;
    }
    Some(
        Diagnostic::new(
            ErrorCode::FilterAspectModelMismatch,
            format!(
                "Filter '{}' on variable '{}' cannot be used under the {} aspect model of '{}'",
                filter.label,
                variable,
                set.aspect_model,
                set.label()
            ),
        )
        .with("variableSet", set.label())
        .with("variable", variable)
        .with("filter", filter.label.clone()),
    )
}
