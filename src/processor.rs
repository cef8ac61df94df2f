//! The end-to-end pipeline: discovery, resolution, ordering, evaluation and consistency.

use crate::computation::{EvaluationContext, ExpressionEvaluator, Scheduler, SetOutcome, SetStatus};
use crate::config::EngineConfig;
use crate::consistency::{ConsistencyChecker, ConsistencyVerdict};
use crate::diagnostics::{Diagnostic, ErrorCode};
use crate::display::trace::format_hierarchy;
use crate::resolve::{global_order, order_variables, ParameterResolver, ScopeResolver, VariableResolver};
use crate::store::{arcroles, kinds, ArcProvider, ArcQuery, Instance, QName};
use crate::variables::{ResourceFactory, VariableSetKey, VariableSetKind};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub passed: usize,
    pub failed: usize,
    pub generated: usize,
    pub errors: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub output: Instance,
    pub outcomes: Vec<SetOutcome>,
    pub verdicts: Vec<ConsistencyVerdict>,
    pub summary: RunSummary,
    pub diagnostics: Vec<Diagnostic>,
    pub dependency_trace: String,
}

impl RunReport {
    pub fn outcome(&self, label: &str) -> Option<&SetOutcome> { self.outcomes.iter().find(|o| o.key.label == label) }

    pub fn to_json(&self) -> serde_json::Result<String> { serde_json::to_string_pretty(self) }
}

pub struct FormulaProcessor<'a> {
    config: EngineConfig,
    provider: &'a dyn ArcProvider,
    evaluator: &'a dyn ExpressionEvaluator,
    factory: ResourceFactory,
}

impl<'a> FormulaProcessor<'a> {
    pub fn new(config: EngineConfig, provider: &'a dyn ArcProvider, evaluator: &'a dyn ExpressionEvaluator) -> Self {
        Self { config, provider, evaluator, factory: ResourceFactory::new() }
    }

    /// Uses a factory with extra constructors registered.
    pub fn with_factory(mut self, factory: ResourceFactory) -> Self {
        self.factory = factory;
        self
    }

    /// Resolves every variable set and computes the global order. Nothing is evaluated.
    ///
    /// A set that fails resolution is rejected with its diagnostic; the
    /// others carry on.
    pub fn prepare(&self, instances: BTreeMap<QName, Instance>) -> EvaluationContext {
        let mut ctx = EvaluationContext::new(self.config.clone(), instances);
        let defaults = self.config.factory_defaults();

        // 1. Parameters
        let external = self.config.external_parameters();
        let input = ctx.instances.get(&defaults.input_instance);
        ctx.parameters = ParameterResolver::new(self.provider, self.evaluator, &external, input).resolve(&mut ctx.diagnostics);

        // 2. Variable sets with their variables and filters
        let resolver = VariableResolver::new(self.provider, self.evaluator, &self.factory, &defaults);
        for resource in self.provider.generic_resources(kinds::VARIABLE_SET, None) {
            let key = VariableSetKey::new(resource.link_role.clone(), resource.label.clone());
            let built = self.factory.create_variable_set(resource, &defaults).and_then(|mut set| {
                resolver.resolve(&mut set, resource, &ctx.parameters, &mut ctx.diagnostics).map(|_| set)
            });
            match built {
                Ok(set) => {
                    ctx.variable_sets.insert(key, set);
                }
                Err(diagnostic) => {
                    ctx.rejected.insert(key.clone(), diagnostic.code);
                    ctx.diagnostics.report(diagnostic.with("variableSet", key.label));
                }
            }
        }

        // 3. Consistency assertion targets
        self.bind_consistency_targets(&mut ctx);

        // 4. Scope links
        ScopeResolver::new(self.provider, self.evaluator).resolve(&mut ctx);

        // 5. Variable order within each set
        let keys: Vec<VariableSetKey> = ctx.variable_sets.keys().cloned().collect();
        for key in keys {
            let ordered = match ctx.variable_sets.get_mut(&key) {
                Some(set) => order_variables(set, self.evaluator),
                None => continue,
            };
            if let Err(diagnostic) = ordered {
                let code = diagnostic.code;
                ctx.diagnostics.report(diagnostic);
                ctx.reject(&key, code);
            }
        }

        // 6. Global order
        match global_order(&ctx.variable_sets) {
            Ok(graph) => {
                ctx.order = graph.flatten();
                let sets = &ctx.variable_sets;
                ctx.dependency_trace = format_hierarchy(&graph, "SCOPE DEPENDENCIES", |k: &VariableSetKey| {
                    sets.get(k).map(|s| s.kind.name().to_string())
                });
            }
            Err(diagnostic) => {
                ctx.diagnostics.report(diagnostic);
                let scoped: Vec<VariableSetKey> = ctx
                    .variable_sets
                    .iter()
                    .filter(|(_, s)| !s.scope_dependencies.is_empty())
                    .map(|(k, _)| k.clone())
                    .collect();
                for key in &scoped {
                    ctx.reject(key, ErrorCode::CyclicDependencies);
                }
                ctx.order = ctx.variable_sets.keys().cloned().collect();
            }
        }

        info!(
            variable_sets = ctx.variable_sets.len(),
            rejected = ctx.rejected.len(),
            parameters = ctx.parameters.len(),
            "resolution complete"
        );
        ctx
    }

    /// Runs a full pass and collects everything it produced.
    pub fn run(&self, instances: BTreeMap<QName, Instance>) -> RunReport {
        let mut ctx = self.prepare(instances);
        let mut outcomes = Scheduler::new(self.evaluator).run(&mut ctx);

        let verdicts = ConsistencyChecker::new(self.evaluator, self.config.parallel_consistency, self.config.strict_consistency)
            .check(&mut ctx);

        // Consistency assertions only receive results from the checker.
        for outcome in &mut outcomes {
            if let (Some(set), SetStatus::Evaluated { passed, failed, .. }) =
                (ctx.variable_sets.get(&outcome.key), &mut outcome.status)
            {
                *passed = set.passed_count();
                *failed = set.failed_count();
            }
        }

        let output = match &ctx.generated {
            Some(generated) => generated.to_instance(self.config.output_instance()),
            None => Instance::new(self.config.output_instance()),
        };

        let mut summary = RunSummary { generated: output.fact_count(), ..Default::default() };
        for set in ctx.variable_sets.values() {
            summary.passed += set.passed_count();
            summary.failed += set.failed_count();
        }
        summary.errors = ctx.diagnostics.error_count();
        info!(passed = summary.passed, failed = summary.failed, generated = summary.generated, errors = summary.errors, "run complete");

        RunReport {
            output,
            outcomes,
            verdicts,
            summary,
            diagnostics: ctx.diagnostics.into_entries(),
            dependency_trace: ctx.dependency_trace,
        }
    }

    /// Consistency-assertion-formula arcs name the formulas an assertion checks.
    /// An assertion left with no formula to check is rejected.
    fn bind_consistency_targets(&self, ctx: &mut EvaluationContext) {
        let assertions: Vec<VariableSetKey> = ctx
            .variable_sets
            .iter()
            .filter(|(_, s)| matches!(s.kind, VariableSetKind::ConsistencyAssertion(_)))
            .map(|(k, _)| k.clone())
            .collect();

        for key in assertions {
            let Some(path) = ctx.variable_sets.get(&key).map(|s| s.path.clone()) else { continue };
            let query = ArcQuery {
                from_label: Some(&key.label),
                from_path: Some(&path),
                ..ArcQuery::new(arcroles::CONSISTENCY_ASSERTION_FORMULA)
            };

            let mut targets = Vec::new();
            for arc in self.provider.generic_arcs(&query) {
                let target = self
                    .provider
                    .resource(&arc.to_path)
                    .map(|r| VariableSetKey::new(r.link_role.clone(), r.label.clone()))
                    .filter(|k| ctx.variable_sets.get(k).is_some_and(|s| s.is_formula()));
                match target {
                    Some(target) => targets.push(target),
                    None => ctx.diagnostics.report(
                        Diagnostic::new(
                            ErrorCode::MissingTargetFormula,
                            format!("Consistency assertion '{}' targets '{}', which is not a formula", key, arc.to),
                        )
                        .with("assertion", key.label.clone()),
                    ),
                }
            }

            if targets.is_empty() {
                warn!(assertion = %key, "consistency assertion has no target formula");
                ctx.diagnostics.report(
                    Diagnostic::new(ErrorCode::MissingTargetFormula, format!("Consistency assertion '{}' has no target formula", key))
                        .with("assertion", key.label.clone()),
                );
                ctx.reject(&key, ErrorCode::MissingTargetFormula);
            } else if let Some(set) = ctx.variable_sets.get_mut(&key) {
                debug!(assertion = %key, targets = targets.len(), "consistency targets bound");
                set.targets = targets;
            }
        }
    }
}
