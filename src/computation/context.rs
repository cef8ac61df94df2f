//! State threaded through resolution and evaluation.

use super::evaluator::ExpressionEvaluator;
use super::ledger::GeneratedFacts;
use crate::config::EngineConfig;
use crate::diagnostics::{DiagnosticSink, ErrorCode};
use crate::store::{Instance, QName};
use crate::variables::{Parameter, VariableSet, VariableSetKey};
use std::collections::BTreeMap;

/// Everything one pass over a taxonomy and its instances works on.
pub struct EvaluationContext {
    pub config: EngineConfig,
    pub instances: BTreeMap<QName, Instance>,
    pub parameters: BTreeMap<QName, Parameter>,
    pub variable_sets: BTreeMap<VariableSetKey, VariableSet>,
    /// Variable sets that failed resolution, with the reason.
    pub rejected: BTreeMap<VariableSetKey, ErrorCode>,
    /// Global evaluation order; every set follows its scope sources.
    pub order: Vec<VariableSetKey>,
    /// Created by the first formula evaluation.
    pub generated: Option<GeneratedFacts>,
    pub diagnostics: DiagnosticSink,
    /// Rendered scope-dependency hierarchy.
    pub dependency_trace: String,
}

impl EvaluationContext {
    pub fn new(config: EngineConfig, instances: BTreeMap<QName, Instance>) -> Self {
        Self {
            config,
            instances,
            parameters: BTreeMap::new(),
            variable_sets: BTreeMap::new(),
            rejected: BTreeMap::new(),
            order: Vec::new(),
            generated: None,
            diagnostics: DiagnosticSink::new(),
            dependency_trace: String::new(),
        }
    }

    /// Removes a variable set from further processing.
    pub fn reject(&mut self, key: &VariableSetKey, code: ErrorCode) {
        if self.variable_sets.remove(key).is_some() {
            self.rejected.insert(key.clone(), code);
        }
    }
}

/// Read-only collaborators a variable set evaluates against.
#[derive(Clone, Copy)]
pub struct EvaluationEnv<'a> {
    pub instances: &'a BTreeMap<QName, Instance>,
    pub evaluator: &'a dyn ExpressionEvaluator,
}
