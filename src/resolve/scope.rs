//! scope.rs
//! Follows variables-scope arcs backward from each consumer and orders variable sets globally.

use crate::computation::{EvaluationContext, ExpressionEvaluator};
use crate::diagnostics::{Diagnostic, ErrorCode};
use crate::graph::{DependencyGraph, DependencyKind, GraphError};
use crate::store::{arcroles, ArcProvider, ArcQuery, QName};
use crate::validation::Validator;
use crate::variables::{ScopeVariable, Variable, VariableSet, VariableSetKey};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// One scope arc reached while walking back from a consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ScopeLink {
    name: QName,
    donor: VariableSetKey,
    /// The arc ends at the consumer itself.
    direct: bool,
}

pub struct ScopeResolver<'a> {
    provider: &'a dyn ArcProvider,
    evaluator: &'a dyn ExpressionEvaluator,
}

impl<'a> ScopeResolver<'a> {
    pub fn new(provider: &'a dyn ArcProvider, evaluator: &'a dyn ExpressionEvaluator) -> Self {
        Self { provider, evaluator }
    }

    /// Builds scope dependencies and shadow declarations for every variable set in `ctx`.
    ///
    /// A consumer on a scope cycle is rejected. Compatibility problems between
    /// the two ends of a direct link are reported but the link is kept.
    pub fn resolve(&self, ctx: &mut EvaluationContext) {
        let validator = Validator::new(self.evaluator);
        let keys: Vec<VariableSetKey> = ctx.variable_sets.keys().cloned().collect();

        for key in keys {
            let Some(path) = ctx.variable_sets.get(&key).map(|s| s.path.clone()) else { continue };
            let links = match self.walk(&path) {
                Ok(links) => links,
                Err(diagnostic) => {
                    let code = diagnostic.code;
                    ctx.diagnostics.report(diagnostic.with("variableSet", key.label.clone()));
                    ctx.reject(&key, code);
                    continue;
                }
            };
            if links.is_empty() {
                continue;
            }

            let Some(mut consumer) = ctx.variable_sets.remove(&key) else { continue };
            for link in &links {
                let donor = ctx.variable_sets.get(&link.donor);
                if link.direct {
                    consumer.scope_dependencies.insert(link.name.clone(), link.donor.clone());
                    match donor {
                        Some(donor) => ctx.diagnostics.extend(validator.validate_scope_link(&consumer, donor)),
                        None => warn!(variable_set = %key, donor = %link.donor, "scope donor is not a resolved variable set"),
                    }
                }
                shadow_declare(&mut consumer, &link.name, &link.donor);
                if let Some(donor) = donor {
                    for (name, variable) in &donor.variables {
                        if !variable.is_placeholder() {
                            shadow_declare(&mut consumer, name, &link.donor);
                        }
                    }
                }
            }
            debug!(variable_set = %key, direct = consumer.scope_dependencies.len(), reached = links.len(), "scope resolved");
            ctx.variable_sets.insert(key, consumer);
        }
    }

    /// Collects every scope arc that ends at `path`, directly or through other donors.
    fn walk(&self, path: &str) -> Result<Vec<ScopeLink>, Diagnostic> {
        let mut links = Vec::new();
        let mut on_path = vec![path.to_string()];
        let mut walked = BTreeSet::new();
        self.walk_from(path, &mut on_path, &mut walked, &mut links)?;
        Ok(links)
    }

    fn walk_from(
        &self,
        path: &str,
        on_path: &mut Vec<String>,
        walked: &mut BTreeSet<String>,
        links: &mut Vec<ScopeLink>,
    ) -> Result<(), Diagnostic> {
        let query = ArcQuery { to_path: Some(path), ..ArcQuery::new(arcroles::VARIABLES_SCOPE) };
        for arc in self.provider.generic_arcs(&query) {
            if on_path.contains(&arc.from_path) {
                let mut chain: Vec<&str> = on_path.iter().map(String::as_str).collect();
                chain.push(&arc.from_path);
                return Err(Diagnostic::new(
                    ErrorCode::DirectedCycleError,
                    format!("Variables-scope arcs form a cycle: {}", chain.join(" <- ")),
                )
                .with("donor", arc.from.clone()));
            }

            let donor = self.provider.resource(&arc.from_path).ok_or_else(|| {
                Diagnostic::new(ErrorCode::UnresolvedDependency, format!("Scope arc from missing resource '{}'", arc.from_path))
                    .with("donor", arc.from.clone())
            })?;
            links.push(ScopeLink {
                name: arc.name.clone().unwrap_or_else(|| QName::local(arc.from.clone())),
                donor: VariableSetKey::new(donor.link_role.clone(), donor.label.clone()),
                direct: on_path.len() == 1,
            });

            // A donor shared by two branches is walked once.
            if walked.insert(arc.from_path.clone()) {
                on_path.push(arc.from_path.clone());
                self.walk_from(&arc.from_path, on_path, walked, links)?;
                on_path.pop();
            }
        }
        Ok(())
    }
}

fn shadow_declare(consumer: &mut VariableSet, name: &QName, donor: &VariableSetKey) {
    if consumer.declares(name) {
        return;
    }
    consumer.variables.insert(name.clone(), Variable::Scope(ScopeVariable::placeholder(donor.clone())));
}

/// Orders variable sets so that each follows every set it takes scope from.
pub fn global_order(sets: &BTreeMap<VariableSetKey, VariableSet>) -> Result<DependencyGraph<VariableSetKey>, Diagnostic> {
    let references: BTreeMap<VariableSetKey, BTreeSet<VariableSetKey>> = sets
        .iter()
        .map(|(key, set)| (key.clone(), set.scope_dependencies.values().cloned().collect()))
        .collect();

    DependencyGraph::build(DependencyKind::ScopeDependency, &references).map_err(|e| {
        let GraphError::CyclicDependencies { chain, .. } = &e;
        Diagnostic::new(ErrorCode::CyclicDependencies, e.to_string()).with("chain", chain.clone())
    })
}
