//! A synchronous, single-threaded evaluation scheduler.
use super::context::{EvaluationContext, EvaluationEnv};
use super::evaluator::{EvaluationError, ExpressionEvaluator};
use super::ledger::EvaluationOutcome;
use super::value::Value;
use crate::diagnostics::{Diagnostic, DiagnosticSink, ErrorCode};
use crate::variables::{ScopeBinding, ScopeVariable, Variable, VariableSet, VariableSetKey};
use serde::Serialize;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SetStatus {
    Evaluated { passed: usize, failed: usize, generated: usize },
    /// Evaluation raised an error; the set has no results.
    Failed(ErrorCode),
    /// Rejected during resolution and never scheduled.
    Rejected(ErrorCode),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SetOutcome {
    pub key: VariableSetKey,
    pub kind: &'static str,
    pub status: SetStatus,
}

/// Walks the global order and evaluates each variable set once.
pub struct Scheduler<'a> {
    evaluator: &'a dyn ExpressionEvaluator,
}

impl<'a> Scheduler<'a> {
    pub fn new(evaluator: &'a dyn ExpressionEvaluator) -> Self {
        Self { evaluator }
    }

    /// Evaluates every scheduled variable set in `ctx.order`.
    ///
    /// A failing set only loses its own results; the loop always moves on.
    pub fn run(&self, ctx: &mut EvaluationContext) -> Vec<SetOutcome> {
        let mut outcomes = Vec::with_capacity(ctx.order.len());
        let order = ctx.order.clone();

        for key in &order {
            // Sets referenced by scope arcs but never declared appear in the order too.
            let Some(mut set) = ctx.variable_sets.remove(key) else { continue };

            if !set.scope_dependencies.is_empty() {
                inject_scope_variables(&mut set, ctx);
            }

            let is_formula = set.is_formula();
            if is_formula {
                set.generated_facts = Some(ctx.generated.take().unwrap_or_default());
            }

            let env = EvaluationEnv { instances: &ctx.instances, evaluator: self.evaluator };
            let result = set.evaluate(&env);

            if is_formula {
                ctx.generated = set.generated_facts.take();
            }

            outcomes.push(process_evaluation_result(&set, result, &mut ctx.diagnostics));
            ctx.variable_sets.insert(key.clone(), set);
        }

        for (key, code) in &ctx.rejected {
            outcomes.push(SetOutcome { key: key.clone(), kind: "rejected", status: SetStatus::Rejected(*code) });
        }
        outcomes
    }
}

/// Replaces shadow placeholders with scope variables bound to each donor's results.
///
/// Donors precede `set` in the global order, so their results are final.
/// A donor that produced nothing yields a scope variable with no bindings,
/// which leaves `set` with no combinations to evaluate.
pub fn inject_scope_variables(set: &mut VariableSet, ctx: &EvaluationContext) {
    set.variables.retain(|_, v| !v.is_placeholder());
    let variables = &set.variables;
    set.variable_order.retain(|n| variables.contains_key(n));

    for (position, (name, donor_key)) in set.scope_dependencies.iter().enumerate() {
        let bindings = match ctx.variable_sets.get(donor_key) {
            Some(donor) => donor_bindings(donor, ctx),
            None => {
                warn!(variable_set = %set.key, donor = %donor_key, "scope donor was not evaluated");
                Vec::new()
            }
        };
        debug!(variable_set = %set.key, scope = %name, bindings = bindings.len(), "injecting scope variable");

        set.variables
            .insert(name.clone(), Variable::Scope(ScopeVariable { donor: donor_key.clone(), bindings: Some(bindings) }));
        set.variable_order.retain(|n| n != name);
        set.variable_order.insert(position, name.clone());
    }
}

fn donor_bindings(donor: &VariableSet, ctx: &EvaluationContext) -> Vec<ScopeBinding> {
    donor
        .results
        .iter()
        .map(|r| match &r.outcome {
            EvaluationOutcome::Generated(fact) => {
                let generated = ctx.generated.as_ref();
                ScopeBinding {
                    output: Value::fact(fact),
                    context: generated.and_then(|g| g.context(&fact.context_ref)).cloned(),
                    unit: fact.unit_ref.as_deref().and_then(|u| generated.and_then(|g| g.unit(u))).cloned(),
                    donor_bindings: r.bindings.clone(),
                }
            }
            outcome => ScopeBinding {
                output: Value::Boolean(matches!(outcome, EvaluationOutcome::Passed)),
                context: None,
                unit: None,
                donor_bindings: r.bindings.clone(),
            },
        })
        .collect()
}

/// Logs the outcome of one variable set and turns evaluation errors into diagnostics.
pub fn process_evaluation_result(
    set: &VariableSet,
    result: Result<bool, EvaluationError>,
    sink: &mut DiagnosticSink,
) -> SetOutcome {
    let status = match result {
        Ok(success) => {
            let (passed, failed, generated) = (set.passed_count(), set.failed_count(), set.generated_count());
            info!(variable_set = %set.key, kind = set.kind.name(), success, passed, failed, generated, "evaluation complete");
            SetStatus::Evaluated { passed, failed, generated }
        }
        Err(e) => {
            let code = match &e {
                EvaluationError::MissingConcept(_) => ErrorCode::MissingConceptRule,
                EvaluationError::MissingSource(_) => ErrorCode::UndefinedSource,
                _ => ErrorCode::EvaluationFailure,
            };
            sink.report(
                Diagnostic::new(code, e.to_string())
                    .with("variableSet", set.key.label.clone())
                    .with("linkRole", set.key.link_role.clone()),
            );
            SetStatus::Failed(code)
        }
    };
    SetOutcome { key: set.key.clone(), kind: set.kind.name(), status }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::computation::ledger::EvaluationResult;
    use crate::config::EngineConfig;
    use crate::store::{standard_input_instance, standard_output_instance, QName};
    use crate::testing::ScriptedEvaluator;
    use crate::variables::{FormulaRules, VariableSetKind};
    use std::collections::BTreeMap;

    fn assertion(label: &str, test: &str) -> VariableSet {
        VariableSet::new(
            VariableSetKey::new("role", label),
            format!("a.xml#{}", label),
            VariableSetKind::ValueAssertion { test: test.into() },
            standard_input_instance(),
        )
    }

    #[test]
    fn test_errors_map_to_codes() {
        let set = assertion("a", "true()");
        let mut sink = DiagnosticSink::new();
        let outcome = process_evaluation_result(&set, Err(EvaluationError::MissingSource("a".into())), &mut sink);
        assert_eq!(outcome.status, SetStatus::Failed(ErrorCode::UndefinedSource));
        assert!(sink.contains(ErrorCode::UndefinedSource));

        let outcome = process_evaluation_result(&set, Err(EvaluationError::expression("x", "boom")), &mut sink);
        assert_eq!(outcome.status, SetStatus::Failed(ErrorCode::EvaluationFailure));
    }

    #[test]
    fn test_injection_replaces_placeholders_with_donor_results() {
        let mut ctx = EvaluationContext::new(EngineConfig::default(), BTreeMap::new());
        let mut donor = assertion("donor", "true()");
        donor.results.push(EvaluationResult {
            bindings: BTreeMap::from([(QName::local("x"), Value::Integer(3))]),
            bound_facts: BTreeMap::new(),
            outcome: EvaluationOutcome::Passed,
        });
        ctx.variable_sets.insert(donor.key.clone(), donor);

        let mut consumer = assertion("consumer", "$x eq 3");
        let donor_key = VariableSetKey::new("role", "donor");
        consumer.scope_dependencies.insert(QName::local("d"), donor_key.clone());
        for name in ["d", "x"] {
            consumer.variables.insert(QName::local(name), Variable::Scope(ScopeVariable::placeholder(donor_key.clone())));
        }
        consumer.variable_order = vec![QName::local("x"), QName::local("d")];

        inject_scope_variables(&mut consumer, &ctx);
        assert_eq!(consumer.variable_order, vec![QName::local("d")]);
        let Some(Variable::Scope(scope)) = consumer.variables.get(&QName::local("d")) else { panic!("missing scope variable") };
        let bindings = scope.bindings.as_ref().unwrap();
        assert_eq!(bindings[0].output, Value::Boolean(true));
        assert_eq!(bindings[0].donor_bindings[&QName::local("x")], Value::Integer(3));

        let evaluator = ScriptedEvaluator::new().on("$x eq 3", |b| Ok(Value::Boolean(b.require(&QName::local("x"))? == &Value::Integer(3))));
        let env = EvaluationEnv { instances: &ctx.instances, evaluator: &evaluator };
        assert!(consumer.evaluate(&env).unwrap());
        assert_eq!(consumer.passed_count(), 1);
    }

    #[test]
    fn test_run_threads_accumulator_and_continues_after_failure() {
        let mut ctx = EvaluationContext::new(EngineConfig::default(), BTreeMap::new());
        let formula = |label: &str, value: &str| {
            VariableSet::new(
                VariableSetKey::new("role", label),
                format!("f.xml#{}", label),
                VariableSetKind::Formula(FormulaRules { value: value.into(), ..Default::default() }),
                standard_output_instance(),
            )
        };
        for set in [formula("f1", "1"), assertion("a2", "fail()"), formula("f3", "2")] {
            ctx.order.push(set.key.clone());
            ctx.variable_sets.insert(set.key.clone(), set);
        }

        let evaluator = ScriptedEvaluator::new();
        let outcomes = Scheduler::new(&evaluator).run(&mut ctx);

        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes[1].status, SetStatus::Failed(ErrorCode::EvaluationFailure));
        // No source fact, so both formulas fail on the concept rule but the accumulator survives
        assert_eq!(outcomes[0].status, SetStatus::Failed(ErrorCode::MissingConceptRule));
        assert!(ctx.generated.is_some());
    }
}
