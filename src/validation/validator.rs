//! The central validator that runs every rule for one piece of a variable set.
use super::rules::{aspect_model, fallback, group_filters, scope};
use crate::computation::ExpressionEvaluator;
use crate::diagnostics::Diagnostic;
use crate::store::QName;
use crate::variables::{FactVariable, Filter, VariableSet};

/// Collects rule violations without deciding what to do about them.
///
/// Every rule is advisory: callers ignore the offending filter or fallback and
/// carry on, so the validator only reports.
pub struct Validator<'a> {
    evaluator: &'a dyn ExpressionEvaluator,
}

impl<'a> Validator<'a> {
    pub fn new(evaluator: &'a dyn ExpressionEvaluator) -> Self {
        Self { evaluator }
    }

    /// Checks a filter attached to a fact variable.
    pub fn validate_filter(&self, set: &VariableSet, variable: &str, filter: &Filter) -> Option<Diagnostic> {
        aspect_model::validate_aspect_model(set, variable, filter)
    }

    /// Checks a filter attached to the variable set itself. Runs after all variables are known.
    pub fn validate_group_filter(&self, set: &VariableSet, filter: &Filter) -> Vec<Diagnostic> {
        [
            aspect_model::validate_aspect_model(set, "*", filter),
            group_filters::validate_covering(set, filter),
            group_filters::validate_references(set, filter, self.evaluator),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    pub fn validate_fallback(&self, set: &VariableSet, name: &QName, variable: &FactVariable) -> Option<Diagnostic> {
        fallback::validate_fallback(set, name, variable, self.evaluator)
    }

    /// Scope-link mismatches are reported but never stop the link from being built.
    pub fn validate_scope_link(&self, consumer: &VariableSet, donor: &VariableSet) -> Vec<Diagnostic> {
        [
            scope::validate_kind(consumer, donor),
            scope::validate_aspect_model(consumer, donor),
            scope::validate_instance(consumer, donor),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}
