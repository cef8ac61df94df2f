use crate::computation::ExpressionEvaluator;
use crate::diagnostics::{Diagnostic, ErrorCode};
use crate::store::QName;
use crate::variables::{FactVariable, VariableSet};

/// A fallback value stands in for a missing fact and may not depend on other fact variables.
pub(crate) fn validate_fallback(
    set: &VariableSet,
    name: &QName,
    variable: &FactVariable,
    evaluator: &dyn ExpressionEvaluator,
) -> Option<Diagnostic> {
    let expr = variable.fallback.as_deref()?;
    let fact_vars = set.fact_variable_names();
    let offending: Vec<String> =
        evaluator.references(expr).into_iter().filter(|r| fact_vars.contains(&r)).map(|r| r.to_string()).collect();
    if offending.is_empty() {
        return None;
    }
    Some(
        Diagnostic::new(
            ErrorCode::FallbackValueVariableReferenceNotAllowed,
            format!("Fallback value of '{}' references fact variables: {}", name, offending.join(", ")),
        )
        .with("variableSet", set.label())
        .with("variable", variable.label.clone()),
    )
}
