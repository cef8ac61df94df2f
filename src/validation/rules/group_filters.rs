//! Validation rules for filters attached to a whole variable set.

use crate::computation::ExpressionEvaluator;
use crate::diagnostics::{Diagnostic, ErrorCode};
use crate::store::QName;
use crate::variables::{Filter, VariableSet};

/// A group filter applies to every fact variable, so it may not cover an aspect.
pub(crate) fn validate_covering(set: &VariableSet, filter: &Filter) -> Option<Diagnostic> {
    if !filter.cover || filter.aspects().is_empty() {
        return None;
    }
    Some(
        Diagnostic::new(
            ErrorCode::VariableSetFilterCovered,
            format!("Group filter '{}' of '{}' covers aspects; group filters must be non-covering", filter.label, set.label()),
        )
        .with("variableSet", set.label())
        .with("filter", filter.label.clone()),
    )
}

/// Group filters run before any variable is bound, so they may name parameters only.
pub(crate) fn validate_references(
    set: &VariableSet,
    filter: &Filter,
    evaluator: &dyn ExpressionEvaluator,
) -> Option<Diagnostic> {
    let offending: Vec<QName> = filter
        .expressions()
        .into_iter()
        .flat_map(|e| evaluator.references(e))
        .filter(|name| set.variables.contains_key(name) && !set.parameters.contains_key(name))
        .collect();
    if offending.is_empty() {
        return None;
    }
    let names: Vec<String> = offending.iter().map(QName::to_string).collect();
    Some(
        Diagnostic::new(
            ErrorCode::FactVariableReferenceNotAllowed,
            format!("Group filter '{}' of '{}' references variables: {}", filter.label, set.label(), names.join(", ")),
        )
        .with("variableSet", set.label())
        .with("filter", filter.label.clone()),
    )
}
