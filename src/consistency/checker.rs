//! checker.rs
//! Compares facts derived by formulas against the facts they are meant to reconcile with.

use super::equality::{context_equal, tolerance_for, unit_equal, value_equal, Tolerance};
use crate::computation::{Bindings, EvaluationContext, EvaluationOutcome, EvaluationResult, ExpressionEvaluator};
use crate::diagnostics::{Diagnostic, ErrorCode};
use crate::store::{Context, Fact, Instance, QName, XbrlUnit};
use crate::variables::{ConsistencyRules, VariableSetKey, VariableSetKind};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsistencyVerdict {
    pub assertion: VariableSetKey,
    pub formula: VariableSetKey,
    pub derived: Fact,
    /// `None` when the input instance has no matching fact.
    pub existing: Option<Fact>,
    pub consistent: bool,
}

/// One comparison, fully prepared so it can run on any thread.
struct Comparison {
    assertion: VariableSetKey,
    formula: VariableSetKey,
    derived: Fact,
    existing: Option<Fact>,
    radius: Option<Tolerance>,
    strict: bool,
}

impl Comparison {
    fn judge(self) -> ConsistencyVerdict {
        let consistent = match &self.existing {
            None => !self.strict,
            Some(existing) => {
                let tolerance = self.radius.unwrap_or_else(|| tolerance_for(&self.derived, existing));
                value_equal(&self.derived.value, &existing.value, tolerance)
            }
        };
        ConsistencyVerdict {
            assertion: self.assertion,
            formula: self.formula,
            derived: self.derived,
            existing: self.existing,
            consistent,
        }
    }
}

pub struct ConsistencyChecker<'a> {
    evaluator: &'a dyn ExpressionEvaluator,
    parallel: bool,
    /// Treat every assertion as strict.
    strict: bool,
}

impl<'a> ConsistencyChecker<'a> {
    pub fn new(evaluator: &'a dyn ExpressionEvaluator, parallel: bool, strict: bool) -> Self {
        Self { evaluator, parallel, strict }
    }

    /// Judges every fact generated by the targets of each consistency assertion.
    ///
    /// Each verdict is also recorded as a pass or fail result on its
    /// assertion. Inconsistencies are reported and never stop the check.
    pub fn check(&self, ctx: &mut EvaluationContext) -> Vec<ConsistencyVerdict> {
        let comparisons = self.prepare(ctx);
        debug!(comparisons = comparisons.len(), parallel = self.parallel, "checking consistency");

        let verdicts: Vec<ConsistencyVerdict> = if self.parallel {
            comparisons.into_par_iter().map(Comparison::judge).collect()
        } else {
            comparisons.into_iter().map(Comparison::judge).collect()
        };

        for verdict in &verdicts {
            if !verdict.consistent {
                let existing = verdict.existing.as_ref().map_or("<none>", |f| f.value.as_str());
                ctx.diagnostics.report(
                    Diagnostic::new(
                        ErrorCode::Inconsistency,
                        format!(
                            "{} derived by '{}' is {}, existing value is {}",
                            verdict.derived.concept, verdict.formula, verdict.derived.value, existing
                        ),
                    )
                    .with("assertion", verdict.assertion.label.clone())
                    .with("formula", verdict.formula.label.clone()),
                );
            }
            if let Some(set) = ctx.variable_sets.get_mut(&verdict.assertion) {
                let mut bound_facts = BTreeMap::new();
                bound_facts.insert(QName::local("derived"), vec![verdict.derived.clone()]);
                if let Some(existing) = &verdict.existing {
                    bound_facts.insert(QName::local("existing"), vec![existing.clone()]);
                }
                set.results.push(EvaluationResult {
                    bindings: BTreeMap::new(),
                    bound_facts,
                    outcome: if verdict.consistent { EvaluationOutcome::Passed } else { EvaluationOutcome::Failed },
                });
            }
        }

        let failed = verdicts.iter().filter(|v| !v.consistent).count();
        info!(checked = verdicts.len(), failed, "consistency check complete");
        verdicts
    }

    fn prepare(&self, ctx: &mut EvaluationContext) -> Vec<Comparison> {
        let input = ctx.instances.get(&ctx.config.input_instance());
        let mut comparisons = Vec::new();
        let mut problems = Vec::new();

        for (key, set) in &ctx.variable_sets {
            let VariableSetKind::ConsistencyAssertion(rules) = &set.kind else { continue };
            let radius = match self.radius(rules) {
                Ok(radius) => radius,
                Err(message) => {
                    problems.push(Diagnostic::new(ErrorCode::EvaluationFailure, message).with("assertion", key.label.clone()));
                    continue;
                }
            };
            let strict = rules.strict || self.strict;

            for target in &set.targets {
                let Some(formula) = ctx.variable_sets.get(target) else { continue };
                for derived in formula.results.iter().filter_map(EvaluationResult::generated_fact) {
                    let generated = ctx.generated.as_ref();
                    let context = generated.and_then(|g| g.context(&derived.context_ref));
                    let unit = derived.unit_ref.as_deref().and_then(|u| generated.and_then(|g| g.unit(u)));
                    comparisons.push(Comparison {
                        assertion: key.clone(),
                        formula: target.clone(),
                        derived: derived.clone(),
                        existing: input.and_then(|i| find_existing(i, derived, context, unit)).cloned(),
                        radius,
                        strict,
                    });
                }
            }
        }

        ctx.diagnostics.extend(problems);
        comparisons
    }

    /// An acceptance radius replaces the accuracy-based tolerance.
    fn radius(&self, rules: &ConsistencyRules) -> Result<Option<Tolerance>, String> {
        let eval = |expr: &str| {
            self.evaluator
                .evaluate(expr, &Bindings::new())
                .map_err(|e| e.to_string())?
                .as_decimal()
                .ok_or_else(|| format!("acceptance radius '{}' is not numeric", expr))
        };
        match (rules.absolute_radius.as_deref(), rules.proportional_radius.as_deref()) {
            (Some(expr), _) => eval(expr).map(|r| Some(Tolerance::Absolute(r))),
            (None, Some(expr)) => eval(expr).map(|r| Some(Tolerance::Proportional(r))),
            (None, None) => Ok(None),
        }
    }
}

/// The input fact with the same concept, an equal context and an equal unit.
fn find_existing<'i>(
    input: &'i Instance,
    derived: &Fact,
    context: Option<&Context>,
    unit: Option<&XbrlUnit>,
) -> Option<&'i Fact> {
    let context = context?;
    input.get_element(&derived.concept).into_iter().find(|candidate| {
        input.context(&candidate.context_ref).is_some_and(|c| context_equal(c, context))
            && unit_equal(candidate.unit_ref.as_deref().and_then(|u| input.unit(u)), unit)
    })
}
