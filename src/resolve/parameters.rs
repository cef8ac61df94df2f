//! parameters.rs
//! Resolves parameters to typed values before any variable is evaluated.

use crate::analysis::topology;
use crate::computation::{Bindings, ExpressionEvaluator, Value, XsType};
use crate::diagnostics::{Diagnostic, DiagnosticSink, ErrorCode};
use crate::store::{kinds, ArcProvider, Instance, QName, Resource};
use crate::variables::Parameter;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

pub struct ParameterResolver<'a> {
    provider: &'a dyn ArcProvider,
    evaluator: &'a dyn ExpressionEvaluator,
    external: &'a BTreeMap<QName, String>,
    /// Instance whose element vocabulary may already define a parameter's value.
    instance: Option<&'a Instance>,
}

impl<'a> ParameterResolver<'a> {
    pub fn new(
        provider: &'a dyn ArcProvider,
        evaluator: &'a dyn ExpressionEvaluator,
        external: &'a BTreeMap<QName, String>,
        instance: Option<&'a Instance>,
    ) -> Self {
        Self { provider, evaluator, external, instance }
    }

    /// Produces every declared parameter with its `result` filled where possible.
    ///
    /// Failures are reported per parameter and leave that parameter (and any
    /// parameter computed from it) unresolved: cycles, references to unknown
    /// parameters, missing values and values that fail to evaluate or
    /// type-check. Every other parameter still resolves.
    pub fn resolve(&self, sink: &mut DiagnosticSink) -> BTreeMap<QName, Parameter> {
        let mut parameters = BTreeMap::new();
        for resource in self.provider.generic_resources(kinds::PARAMETER, None) {
            match parameter_from_resource(resource) {
                Ok(parameter) => {
                    parameters.insert(parameter.name.clone(), parameter);
                }
                Err(diagnostic) => sink.report(diagnostic),
            }
        }

        let mut failed = BTreeSet::new();
        let references = self.references(&parameters, sink, &mut failed);
        let order = self.order(&references, sink, &mut failed);

        for parameter in parameters.values_mut() {
            if failed.contains(&parameter.name) {
                continue;
            }
            if let Err(diagnostic) = self.seed(parameter) {
                failed.insert(parameter.name.clone());
                sink.report(diagnostic);
            }
        }

        for name in order {
            let Some(parameter) = parameters.get(&name) else { continue };
            if parameter.is_resolved() || failed.contains(&name) {
                continue;
            }
            let Some(select) = parameter.select.clone() else { continue };

            let deps = references.get(&name).into_iter().flatten();
            let mut bindings = Bindings::new();
            let mut missing = None;
            for dep in deps {
                match parameters.get(dep).and_then(|p| p.result.clone()) {
                    Some(value) => bindings.bind(dep.clone(), value),
                    None => {
                        missing = Some(dep.clone());
                        break;
                    }
                }
            }
            if let Some(dep) = missing {
                failed.insert(name.clone());
                sink.report(
                    Diagnostic::new(
                        ErrorCode::UnresolvedDependency,
                        format!("Parameter '{}' depends on unresolved parameter '{}'", name, dep),
                    )
                    .with("parameter", name.to_string()),
                );
                continue;
            }

            let evaluated = self
                .evaluator
                .evaluate(&select, &bindings)
                .map_err(|e| e.to_string())
                .and_then(|v| check_type(parameter.as_type, &v));
            match evaluated {
                Ok(value) => {
                    debug!(parameter = %name, value = %value, "parameter resolved");
                    if let Some(p) = parameters.get_mut(&name) {
                        p.result = Some(value);
                    }
                }
                Err(message) => {
                    failed.insert(name.clone());
                    sink.report(
                        Diagnostic::new(ErrorCode::ParameterTypeMismatch, format!("Parameter '{}': {}", name, message))
                            .with("parameter", name.to_string()),
                    );
                }
            }
        }

        parameters
    }

    /// Parameters referencing an unknown name are reported and marked failed.
    fn references(
        &self,
        parameters: &BTreeMap<QName, Parameter>,
        sink: &mut DiagnosticSink,
        failed: &mut BTreeSet<QName>,
    ) -> BTreeMap<QName, BTreeSet<QName>> {
        let mut references = BTreeMap::new();
        for (name, parameter) in parameters {
            let refs: BTreeSet<QName> =
                parameter.select.as_deref().map(|s| self.evaluator.references(s)).unwrap_or_default().into_iter().collect();
            if let Some(unknown) = refs.iter().find(|r| !parameters.contains_key(*r)) {
                failed.insert(name.clone());
                sink.report(
                    Diagnostic::new(
                        ErrorCode::UnresolvedDependency,
                        format!("Parameter '{}' references unknown parameter '{}'", name, unknown),
                    )
                    .with("parameter", name.to_string()),
                );
            }
            references.insert(name.clone(), refs);
        }
        references
    }

    /// Consumer-last evaluation order. Each cycle is reported and its members
    /// are taken out of the order, so the rest can still be ordered.
    fn order(
        &self,
        references: &BTreeMap<QName, BTreeSet<QName>>,
        sink: &mut DiagnosticSink,
        failed: &mut BTreeSet<QName>,
    ) -> Vec<QName> {
        let mut remaining = references.clone();
        loop {
            match topology::dependency_order(&remaining) {
                Ok(order) => return order,
                Err(cycle) => {
                    let chain: Vec<String> = cycle.iter().map(QName::to_string).collect();
                    sink.report(
                        Diagnostic::new(
                            ErrorCode::ParameterCyclicDependencies,
                            format!("Cyclic parameter dependencies: {}", chain.join(" -> ")),
                        )
                        .with("parameter", chain.first().cloned().unwrap_or_default()),
                    );
                    for name in cycle {
                        remaining.remove(&name);
                        failed.insert(name);
                    }
                }
            }
        }
    }

    /// Takes the value from the instance or the external context when either supplies one.
    ///
    /// An external value of the wrong type is rejected outright; the
    /// parameter's `select` is not used in its place.
    fn seed(&self, parameter: &mut Parameter) -> Result<(), Diagnostic> {
        if let Some(fact) = self.instance.and_then(|i| i.get_element(&parameter.name).into_iter().next()) {
            parameter.result = Some(Value::fact(fact));
            return Ok(());
        }

        if let Some(raw) = self.external.get(&parameter.name) {
            let value = parameter.as_type.map_or(Ok(Value::String(raw.clone())), |t| t.coerce(raw)).map_err(|message| {
                Diagnostic::new(
                    ErrorCode::ParameterTypeMismatch,
                    format!("Parameter '{}': supplied value '{}' rejected, parameter left unresolved: {}", parameter.name, raw, message),
                )
                .with("parameter", parameter.name.to_string())
            })?;
            parameter.result = Some(value);
            return Ok(());
        }

        if parameter.required || parameter.select.is_none() {
            return Err(Diagnostic::new(
                ErrorCode::MissingParameterValue,
                format!("No value supplied for parameter '{}'", parameter.name),
            )
            .with("parameter", parameter.name.to_string()));
        }
        Ok(())
    }
}

fn check_type(as_type: Option<XsType>, value: &Value) -> Result<Value, String> {
    match as_type {
        Some(t) => t.check(value),
        None => Ok(value.clone()),
    }
}

/// The parameter's name comes from its `name` attribute, falling back to the label.
pub fn parameter_from_resource(resource: &Resource) -> Result<Parameter, Diagnostic> {
    let name = match resource.get("name") {
        Some(raw) => QName::parse_clark(raw).ok_or_else(|| {
            Diagnostic::new(ErrorCode::UnknownResourceType, format!("Parameter name '{}' is not a valid name", raw))
                .with("resource", resource.path.clone())
        })?,
        None => QName::local(resource.label.clone()),
    };
    Ok(Parameter {
        name,
        label: resource.label.clone(),
        select: resource.get("select").map(str::to_string),
        required: resource.flag("required", false),
        as_type: resource.get("as").and_then(XsType::parse),
        result: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ResourceRegistry, standard_input_instance, Fact};
    use crate::testing::ScriptedEvaluator;
    use rust_decimal::Decimal;

    const ROLE: &str = "http://www.xbrl.org/2003/role/link";

    fn param(label: &str) -> Resource { Resource::new(kinds::PARAMETER, "parameter", ROLE, label).attr("name", label) }

    fn doubling() -> ScriptedEvaluator {
        ScriptedEvaluator::new().on("$base * 2", |b| {
            let base = b.require(&QName::local("base"))?.as_decimal().unwrap_or_default();
            Ok(Value::Decimal(base * Decimal::from(2)))
        })
    }

    #[test]
    fn test_derived_parameter_uses_external_value() {
        let mut reg = ResourceRegistry::new();
        reg.add_resource(param("base").attr("as", "xs:decimal"));
        reg.add_resource(param("double").attr("select", "$base * 2").attr("as", "xs:decimal"));
        let external = BTreeMap::from([(QName::local("base"), "21".to_string())]);
        let evaluator = doubling();
        let mut sink = DiagnosticSink::new();

        let resolver = ParameterResolver::new(&reg, &evaluator, &external, None);
        let first = resolver.resolve(&mut sink);
        assert_eq!(first[&QName::local("double")].result, Some(Value::Decimal(Decimal::from(42))));

        let second = resolver.resolve(&mut sink);
        assert_eq!(first, second);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_cycle_is_rejected() {
        let mut reg = ResourceRegistry::new();
        reg.add_resource(param("a").attr("select", "$b"));
        reg.add_resource(param("b").attr("select", "$a"));
        reg.add_resource(param("c").attr("select", "$a"));
        reg.add_resource(param("d").attr("select", "4"));
        let external = BTreeMap::new();
        let evaluator = ScriptedEvaluator::new();
        let mut sink = DiagnosticSink::new();

        let params = ParameterResolver::new(&reg, &evaluator, &external, None).resolve(&mut sink);
        let cycle = sink.with_code(ErrorCode::ParameterCyclicDependencies).next().unwrap();
        assert!(cycle.message.contains("a -> b -> a"));
        assert!(!params[&QName::local("a")].is_resolved());
        assert!(!params[&QName::local("c")].is_resolved());
        assert!(sink.contains(ErrorCode::UnresolvedDependency));
        assert_eq!(params[&QName::local("d")].result, Some(Value::Integer(4)));
    }

    #[test]
    fn test_unknown_reference_and_missing_value_stay_local() {
        let external = BTreeMap::new();
        let evaluator = ScriptedEvaluator::new();
        let mut reg = ResourceRegistry::new();
        reg.add_resource(param("a").attr("select", "$nowhere"));
        reg.add_resource(param("r").attr("select", "1").attr("required", "true"));
        reg.add_resource(param("ok").attr("select", "3"));
        let mut sink = DiagnosticSink::new();

        let params = ParameterResolver::new(&reg, &evaluator, &external, None).resolve(&mut sink);
        assert!(sink.contains(ErrorCode::UnresolvedDependency));
        assert!(sink.contains(ErrorCode::MissingParameterValue));
        assert!(!params[&QName::local("a")].is_resolved());
        assert!(!params[&QName::local("r")].is_resolved());
        assert_eq!(params[&QName::local("ok")].result, Some(Value::Integer(3)));
    }

    #[test]
    fn test_rejected_external_value_does_not_fall_back_to_select() {
        let mut reg = ResourceRegistry::new();
        reg.add_resource(param("limit").attr("select", "10").attr("as", "xs:integer"));
        let external = BTreeMap::from([(QName::local("limit"), "lots".to_string())]);
        let evaluator = ScriptedEvaluator::new();
        let mut sink = DiagnosticSink::new();

        let params = ParameterResolver::new(&reg, &evaluator, &external, None).resolve(&mut sink);
        assert!(!params[&QName::local("limit")].is_resolved());
        let warning = sink.with_code(ErrorCode::ParameterTypeMismatch).next().unwrap();
        assert!(warning.message.contains("'lots' rejected"));
    }

    #[test]
    fn test_type_mismatch_is_not_fatal() {
        let mut reg = ResourceRegistry::new();
        reg.add_resource(param("flag").attr("as", "xs:boolean"));
        reg.add_resource(param("count").attr("select", "'many'").attr("as", "xs:integer"));
        reg.add_resource(param("ok").attr("select", "3"));
        let external = BTreeMap::from([(QName::local("flag"), "maybe".to_string())]);
        let evaluator = ScriptedEvaluator::new();
        let mut sink = DiagnosticSink::new();

        let params = ParameterResolver::new(&reg, &evaluator, &external, None).resolve(&mut sink);
        assert_eq!(sink.with_code(ErrorCode::ParameterTypeMismatch).count(), 2);
        assert!(!params[&QName::local("flag")].is_resolved());
        assert!(!params[&QName::local("count")].is_resolved());
        assert_eq!(params[&QName::local("ok")].result, Some(Value::Integer(3)));
    }

    #[test]
    fn test_instance_value_takes_precedence() {
        let mut reg = ResourceRegistry::new();
        reg.add_resource(param("base").attr("required", "true"));
        let mut inst = Instance::new(standard_input_instance());
        inst.add_fact(Fact::new(QName::local("base"), "c1", "5"));
        let external = BTreeMap::from([(QName::local("base"), "9".to_string())]);
        let evaluator = ScriptedEvaluator::new();

        let params = ParameterResolver::new(&reg, &evaluator, &external, Some(&inst)).resolve(&mut DiagnosticSink::new());
        assert_eq!(params[&QName::local("base")].result.as_ref().map(Value::lexical), Some("5".to_string()));
    }
}
