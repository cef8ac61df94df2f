//! variable_set.rs
//! Formulas and assertions: the unit of resolution, ordering and evaluation.

use super::filter::{AspectModel, Filter};
use super::parameter::Parameter;
use super::variable::Variable;
use crate::computation::ledger::{EvaluationOutcome, EvaluationResult, GeneratedFacts};
use crate::store::QName;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Identity of a variable set: its extended link role and resource label.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct VariableSetKey {
    pub link_role: String,
    pub label: String,
}

impl VariableSetKey {
    pub fn new(link_role: impl Into<String>, label: impl Into<String>) -> Self {
        Self { link_role: link_role.into(), label: label.into() }
    }
}

impl fmt::Display for VariableSetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.label) }
}

/// Aspect rules of a formula. Expressions are handed to the evaluator as-is.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct FormulaRules {
    pub value: String,
    pub concept: Option<QName>,
    /// Variable whose bound fact supplies every aspect no rule sets.
    pub source: Option<QName>,
    /// Unit measure expression, e.g. `{ns}USD/{ns}shares`.
    pub unit: Option<String>,
    pub decimals: Option<String>,
    pub precision: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ConsistencyRules {
    pub strict: bool,
    pub absolute_radius: Option<String>,
    pub proportional_radius: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum VariableSetKind {
    Formula(FormulaRules),
    ValueAssertion { test: String },
    ExistenceAssertion,
    ConsistencyAssertion(ConsistencyRules),
}

impl VariableSetKind {
    pub fn name(&self) -> &'static str {
        match self {
            VariableSetKind::Formula(_) => "formula",
            VariableSetKind::ValueAssertion { .. } => "valueAssertion",
            VariableSetKind::ExistenceAssertion => "existenceAssertion",
            VariableSetKind::ConsistencyAssertion(_) => "consistencyAssertion",
        }
    }

    pub fn is_formula(&self) -> bool { matches!(self, VariableSetKind::Formula(_)) }

    /// Expressions evaluated once per binding combination.
    pub fn expressions(&self) -> Vec<&str> {
        match self {
            VariableSetKind::Formula(rules) => {
                let mut exprs = vec![rules.value.as_str()];
                exprs.extend(rules.decimals.as_deref());
                exprs.extend(rules.precision.as_deref());
                exprs
            }
            VariableSetKind::ValueAssertion { test } => vec![test.as_str()],
            VariableSetKind::ExistenceAssertion | VariableSetKind::ConsistencyAssertion(_) => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Precondition {
    pub label: String,
    pub test: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct VariableSet {
    pub key: VariableSetKey,
    /// Locator of the defining resource.
    pub path: String,
    pub kind: VariableSetKind,
    pub aspect_model: AspectModel,
    pub implicit_filtering: bool,
    /// Output instance for formulas, source instance for assertions.
    pub instance: QName,
    pub variables: BTreeMap<QName, Variable>,
    /// Every resolved parameter, plus aliases declared by variable arcs.
    pub parameters: BTreeMap<QName, Parameter>,
    pub group_filters: Vec<Filter>,
    pub preconditions: Vec<Precondition>,
    /// Direct scope links: name the donor's output is visible under -> donor.
    pub scope_dependencies: BTreeMap<QName, VariableSetKey>,
    pub variable_order: Vec<QName>,
    pub results: Vec<EvaluationResult>,
    /// The shared accumulator, attached only while a formula evaluates.
    #[serde(skip)]
    pub generated_facts: Option<GeneratedFacts>,
    /// Formulas a consistency assertion checks.
    pub targets: Vec<VariableSetKey>,
}

impl VariableSet {
    pub fn new(key: VariableSetKey, path: impl Into<String>, kind: VariableSetKind, instance: QName) -> Self {
        Self {
            key,
            path: path.into(),
            kind,
            aspect_model: AspectModel::default(),
            implicit_filtering: true,
            instance,
            variables: BTreeMap::new(),
            parameters: BTreeMap::new(),
            group_filters: Vec::new(),
            preconditions: Vec::new(),
            scope_dependencies: BTreeMap::new(),
            variable_order: Vec::new(),
            results: Vec::new(),
            generated_facts: None,
            targets: Vec::new(),
        }
    }

    pub fn label(&self) -> &str { &self.key.label }

    pub fn is_formula(&self) -> bool { self.kind.is_formula() }

    pub fn fact_variable_names(&self) -> Vec<&QName> {
        self.variables.iter().filter(|(_, v)| v.is_fact()).map(|(n, _)| n).collect()
    }

    pub fn declares(&self, name: &QName) -> bool {
        self.variables.contains_key(name) || self.parameters.contains_key(name)
    }

    pub fn passed_count(&self) -> usize { self.count(|o| matches!(o, EvaluationOutcome::Passed)) }
    pub fn failed_count(&self) -> usize { self.count(|o| matches!(o, EvaluationOutcome::Failed)) }
    pub fn generated_count(&self) -> usize { self.count(|o| matches!(o, EvaluationOutcome::Generated(_))) }

    fn count(&self, pred: impl Fn(&EvaluationOutcome) -> bool) -> usize {
        self.results.iter().filter(|r| pred(&r.outcome)).count()
    }
}
