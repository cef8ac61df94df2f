//! variable.rs
//! Fact, general and scope variables.

use super::filter::Filter;
use super::variable_set::VariableSetKey;
use crate::computation::evaluator::ExpressionEvaluator;
use crate::computation::value::Value;
use crate::store::{Context, QName, XbrlUnit};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FactVariable {
    pub label: String,
    pub filters: Vec<Filter>,
    /// Instance the variable binds facts from.
    pub instance: QName,
    pub bind_as_sequence: bool,
    /// Evaluated when no fact matches.
    pub fallback: Option<String>,
    pub nils: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneralVariable {
    pub label: String,
    pub select: String,
    pub bind_as_sequence: bool,
}

/// One donor evaluation as seen from a dependent variable set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScopeBinding {
    /// The generated fact, or the assertion's boolean outcome.
    pub output: Value,
    /// Aspects of a generated fact, so it can serve as a formula source.
    pub context: Option<Context>,
    pub unit: Option<XbrlUnit>,
    /// The donor's variable values for that evaluation.
    pub donor_bindings: BTreeMap<QName, Value>,
}

/// A variable populated from another variable set's results.
///
/// A shadow placeholder has no bindings. It only declares a donor's name so
/// that reference checks in the dependent set succeed; the scheduler swaps
/// placeholders for a bound scope variable before evaluation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScopeVariable {
    pub donor: VariableSetKey,
    pub bindings: Option<Vec<ScopeBinding>>,
}

impl ScopeVariable {
    pub fn placeholder(donor: VariableSetKey) -> Self { Self { donor, bindings: None } }

    pub fn is_placeholder(&self) -> bool { self.bindings.is_none() }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Variable {
    Fact(FactVariable),
    General(GeneralVariable),
    Scope(ScopeVariable),
}

impl Variable {
    pub fn label(&self) -> &str {
        match self {
            Variable::Fact(v) => &v.label,
            Variable::General(v) => &v.label,
            Variable::Scope(v) => &v.donor.label,
        }
    }

    pub fn is_fact(&self) -> bool { matches!(self, Variable::Fact(_)) }

    pub fn is_placeholder(&self) -> bool { matches!(self, Variable::Scope(s) if s.is_placeholder()) }

    /// Expressions whose references must be bound before this variable.
    pub fn expressions(&self) -> Vec<&str> {
        match self {
            Variable::Fact(v) => {
                let mut exprs: Vec<&str> = v.filters.iter().flat_map(Filter::expressions).collect();
                exprs.extend(v.fallback.as_deref());
                exprs
            }
            Variable::General(v) => vec![v.select.as_str()],
            Variable::Scope(_) => Vec::new(),
        }
    }

    /// Names referenced by this variable's expressions, without repeats.
    pub fn references(&self, evaluator: &dyn ExpressionEvaluator) -> Vec<QName> {
        let mut names: Vec<QName> = Vec::new();
        for expr in self.expressions() {
            for name in evaluator.references(expr) {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedEvaluator;
    use crate::variables::filter::FilterKind;

    #[test]
    fn test_fact_variable_references_cover_filters_and_fallback() {
        let var = Variable::Fact(FactVariable {
            label: "v".into(),
            filters: vec![Filter::new("g", FilterKind::General { test: ". gt $threshold".into() })],
            instance: crate::store::standard_input_instance(),
            bind_as_sequence: false,
            fallback: Some("$threshold * 0".into()),
            nils: false,
        });
        let refs = var.references(&ScriptedEvaluator::new());
        assert_eq!(refs, vec![QName::local("threshold")]);
    }

    #[test]
    fn test_placeholder_detection() {
        let key = VariableSetKey::new("role", "f1");
        assert!(Variable::Scope(ScopeVariable::placeholder(key.clone())).is_placeholder());
        let bound = ScopeVariable { donor: key, bindings: Some(vec![]) };
        assert!(!Variable::Scope(bound).is_placeholder());
    }
}
