//! variables.rs
//! Attaches variables, filters, group filters and preconditions to a variable set,
//! then orders its variables by reference.

use super::parameters::parameter_from_resource;
use crate::computation::ExpressionEvaluator;
use crate::diagnostics::{Diagnostic, DiagnosticSink, ErrorCode};
use crate::graph::{DependencyGraph, DependencyKind, GraphError};
use crate::store::{arcroles, kinds, ArcProvider, ArcQuery, QName, Relationship, Resource};
use crate::validation::Validator;
use crate::variables::{
    FactoryDefaults, Filter, FilterKind, Parameter, Precondition, ResourceFactory, Variable, VariableSet,
    VariableSetKind,
};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

pub struct VariableResolver<'a> {
    provider: &'a dyn ArcProvider,
    evaluator: &'a dyn ExpressionEvaluator,
    factory: &'a ResourceFactory,
    defaults: &'a FactoryDefaults,
}

impl<'a> VariableResolver<'a> {
    pub fn new(
        provider: &'a dyn ArcProvider,
        evaluator: &'a dyn ExpressionEvaluator,
        factory: &'a ResourceFactory,
        defaults: &'a FactoryDefaults,
    ) -> Self {
        Self { provider, evaluator, factory, defaults }
    }

    /// Fills `set` from the arcs leaving `resource`.
    ///
    /// Structural problems (unknown types, dangling arcs, aliases of unknown
    /// parameters) are returned and reject the set. Rule violations are
    /// reported to `sink` and the offending filter or fallback is dropped.
    pub fn resolve(
        &self,
        set: &mut VariableSet,
        resource: &Resource,
        parameters: &BTreeMap<QName, Parameter>,
        sink: &mut DiagnosticSink,
    ) -> Result<(), Diagnostic> {
        let validator = Validator::new(self.evaluator);
        set.parameters = parameters.clone();

        for arc in self.provider.generic_arcs(&ArcQuery::new(arcroles::VARIABLE_SET).from(resource)) {
            let target = self.target(arc)?;
            let name = arc.name.clone().unwrap_or_else(|| QName::local(arc.to.clone()));

            match target.kind.as_str() {
                kinds::PARAMETER => {
                    let declared = parameter_from_resource(target)?;
                    let resolved = parameters.get(&declared.name).ok_or_else(|| {
                        Diagnostic::new(
                            ErrorCode::UnresolvedDependency,
                            format!("'{}' refers to undeclared parameter '{}'", name, declared.name),
                        )
                        .with("variableSet", set.label())
                    })?;
                    if !resolved.is_resolved() {
                        return Err(unresolved_parameter(set, &name.to_string(), &declared.name));
                    }
                    debug!(variable_set = %set.key, alias = %name, parameter = %declared.name, "parameter alias");
                    set.parameters.insert(name, resolved.clone());
                }
                kinds::VARIABLE => {
                    let mut variable = self.factory.create_variable(target, self.defaults)?;
                    if let Variable::Fact(fv) = &mut variable {
                        if let Some(instance) = self.variable_instance(target)? {
                            fv.instance = instance;
                        }
                        for filter_arc in self.provider.generic_arcs(&ArcQuery::new(arcroles::VARIABLE_FILTER).from(target)) {
                            let filter = self.filter(filter_arc, true)?;
                            match validator.validate_filter(set, &fv.label, &filter) {
                                Some(d) => sink.report(d),
                                None => fv.filters.push(filter),
                            }
                        }
                    }
                    set.variables.insert(name, variable);
                }
                _ => {
                    return Err(Diagnostic::new(
                        ErrorCode::UnknownResourceType,
                        format!("Variable arc from '{}' targets a {} resource", set.label(), target.kind),
                    )
                    .with("resource", target.path.clone()))
                }
            }
        }

        self.drop_invalid_fallbacks(set, &validator, sink);

        // Group filters are checked once every variable is known.
        for arc in self.provider.generic_arcs(&ArcQuery::new(arcroles::VARIABLE_SET_FILTER).from(resource)) {
            let filter = self.filter(arc, false)?;
            let problems = validator.validate_group_filter(set, &filter);
            if problems.is_empty() {
                set.group_filters.push(filter);
            } else {
                warn!(variable_set = %set.key, filter = %filter.label, "ignoring group filter");
                sink.extend(problems);
            }
        }

        for arc in self.provider.generic_arcs(&ArcQuery::new(arcroles::VARIABLE_SET_PRECONDITION).from(resource)) {
            let target = self.target(arc)?;
            let test = target.get("test").ok_or_else(|| {
                Diagnostic::new(ErrorCode::UnknownResourceType, format!("Precondition '{}' has no test", target.label))
                    .with("resource", target.path.clone())
            })?;
            set.preconditions.push(Precondition { label: target.label.clone(), test: test.to_string() });
        }

        if let VariableSetKind::Formula(_) = set.kind {
            for arc in self.provider.generic_arcs(&ArcQuery::new(arcroles::FORMULA_INSTANCE).from(resource)) {
                set.instance = instance_name(self.target(arc)?)?;
            }
        }

        Ok(())
    }

    fn target(&self, arc: &Relationship) -> Result<&'a Resource, Diagnostic> {
        self.provider.resource(&arc.to_path).ok_or_else(|| {
            Diagnostic::new(ErrorCode::UnresolvedDependency, format!("Arc from '{}' points at missing resource '{}'", arc.from, arc.to_path))
                .with("arcrole", arc.arcrole.clone())
        })
    }

    /// The instance-variable arc runs from the instance resource to the variable.
    fn variable_instance(&self, variable: &Resource) -> Result<Option<QName>, Diagnostic> {
        let Some(arc) = self.provider.generic_arcs(&ArcQuery::new(arcroles::INSTANCE_VARIABLE).to(variable)).into_iter().next()
        else {
            return Ok(None);
        };
        let source = self.provider.resource(&arc.from_path).ok_or_else(|| {
            Diagnostic::new(ErrorCode::UnresolvedDependency, format!("Variable '{}' names a missing instance", variable.label))
                .with("resource", variable.path.clone())
        })?;
        instance_name(source).map(Some)
    }

    /// Builds the filter an arc points at. Boolean filters pull in their sub-filters.
    fn filter(&self, arc: &Relationship, default_cover: bool) -> Result<Filter, Diagnostic> {
        let target = self.target(arc)?;
        let mut filter =
            self.factory.create_filter(target, arc.flag("complement", false), arc.flag("cover", default_cover))?;
        if let FilterKind::And(children) | FilterKind::Or(children) = &mut filter.kind {
            for child in self.provider.generic_arcs(&ArcQuery::new(arcroles::BOOLEAN_FILTER).from(target)) {
                children.push(self.filter(child, true)?);
            }
        }
        Ok(filter)
    }

    fn drop_invalid_fallbacks(&self, set: &mut VariableSet, validator: &Validator<'_>, sink: &mut DiagnosticSink) {
        let offending: Vec<(QName, Diagnostic)> = set
            .variables
            .iter()
            .filter_map(|(name, v)| match v {
                Variable::Fact(fv) => validator.validate_fallback(set, name, fv).map(|d| (name.clone(), d)),
                _ => None,
            })
            .collect();

        for (name, diagnostic) in offending {
            sink.report(diagnostic);
            if let Some(Variable::Fact(fv)) = set.variables.get_mut(&name) {
                fv.fallback = None;
            }
        }
    }
}

fn instance_name(resource: &Resource) -> Result<QName, Diagnostic> {
    match resource.get("name") {
        Some(raw) => QName::parse_clark(raw),
        None => QName::parse_clark(&resource.label),
    }
    .ok_or_else(|| {
        Diagnostic::new(ErrorCode::UnknownResourceType, format!("Instance resource '{}' has no valid name", resource.label))
            .with("resource", resource.path.clone())
    })
}

/// A reference to a parameter that was declared but could not be given a value.
fn unresolved_parameter(set: &VariableSet, owner: &str, parameter: &QName) -> Diagnostic {
    Diagnostic::new(
        ErrorCode::MissingParameterValue,
        format!("'{}' refers to parameter '{}', which has no value", owner, parameter),
    )
    .with("variableSet", set.label())
    .with("parameter", parameter.to_string())
}

/// Computes `set.variable_order` so that every variable follows the variables it references.
///
/// References to parameters are satisfied up front and never order anything.
/// Any other unknown name, in a variable or in the set's own expressions, is
/// an unresolved dependency.
pub fn order_variables(set: &mut VariableSet, evaluator: &dyn ExpressionEvaluator) -> Result<(), Diagnostic> {
    let unresolved = |owner: &str, name: &QName| {
        Diagnostic::new(ErrorCode::UnresolvedDependency, format!("'{}' references undeclared variable '{}'", owner, name))
            .with("variableSet", set.label())
            .with("variable", name.to_string())
    };

    let mut references: BTreeMap<QName, BTreeSet<QName>> = BTreeMap::new();
    for (name, variable) in &set.variables {
        let mut refs = BTreeSet::new();
        for referenced in variable.references(evaluator) {
            if set.variables.contains_key(&referenced) {
                refs.insert(referenced);
            } else {
                match set.parameters.get(&referenced) {
                    Some(p) if p.is_resolved() => {}
                    Some(_) => return Err(unresolved_parameter(set, &name.to_string(), &referenced)),
                    None => return Err(unresolved(&name.to_string(), &referenced)),
                }
            }
        }
        references.insert(name.clone(), refs);
    }

    let mut body: Vec<&str> = set.kind.expressions();
    body.extend(set.preconditions.iter().map(|p| p.test.as_str()));
    body.extend(set.group_filters.iter().flat_map(Filter::expressions));
    for expr in body {
        for name in evaluator.references(expr) {
            if !set.declares(&name) {
                return Err(unresolved(set.label(), &name));
            }
            if set.parameters.get(&name).is_some_and(|p| !p.is_resolved()) {
                return Err(unresolved_parameter(set, set.label(), &name));
            }
        }
    }

    let graph = DependencyGraph::build(DependencyKind::VariableReference, &references).map_err(|e| {
        let GraphError::CyclicDependencies { chain, .. } = &e;
        Diagnostic::new(ErrorCode::CyclicDependencies, e.to_string())
            .with("variableSet", set.label())
            .with("chain", chain.clone())
    })?;
    set.variable_order = graph.flatten();
    debug!(variable_set = %set.key, order = ?set.variable_order, "variables ordered");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{standard_input_instance, standard_output_instance, ResourceRegistry};
    use crate::testing::ScriptedEvaluator;
    use crate::variables::VariableSetKey;

    const ROLE: &str = "http://www.xbrl.org/2003/role/link";

    fn resource(kind: &str, subtype: &str, label: &str) -> Resource { Resource::new(kind, subtype, ROLE, label) }

    fn set_for(res: &Resource) -> VariableSet {
        ResourceFactory::new().create_variable_set(res, &FactoryDefaults::default()).unwrap()
    }

    fn resolve(reg: &ResourceRegistry, res: &Resource, params: &BTreeMap<QName, Parameter>) -> (Result<VariableSet, Diagnostic>, DiagnosticSink) {
        let evaluator = ScriptedEvaluator::new();
        let factory = ResourceFactory::new();
        let defaults = FactoryDefaults::default();
        let mut sink = DiagnosticSink::new();
        let mut set = set_for(res);
        let result = VariableResolver::new(reg, &evaluator, &factory, &defaults)
            .resolve(&mut set, res, params, &mut sink)
            .map(|_| set);
        (result, sink)
    }

    #[test]
    fn test_variables_filters_and_preconditions_attach() {
        let mut reg = ResourceRegistry::new();
        let assertion = reg.add_resource(resource(kinds::VARIABLE_SET, "valueAssertion", "va").attr("test", "$a gt 0")).clone();
        let a = reg.add_resource(resource(kinds::VARIABLE, "factVariable", "a")).clone();
        let concept = reg.add_resource(resource(kinds::FILTER, "conceptName", "cn").attr("concepts", "Assets")).clone();
        let or = reg.add_resource(resource(kinds::FILTER, "orFilter", "or")).clone();
        let period = reg.add_resource(resource(kinds::FILTER, "period", "p").attr("test", "true()")).clone();
        let pre = reg.add_resource(resource(kinds::PRECONDITION, "precondition", "pre").attr("test", "true()")).clone();
        let inst = reg.add_resource(resource(kinds::INSTANCE, "instance", "prior").attr("name", "{http://example.com}prior")).clone();

        reg.add_arc(Relationship::between(arcroles::VARIABLE_SET, &assertion, &a).named(QName::local("a")));
        reg.add_arc(Relationship::between(arcroles::VARIABLE_FILTER, &a, &concept).attr("complement", "true"));
        reg.add_arc(Relationship::between(arcroles::VARIABLE_FILTER, &a, &or));
        reg.add_arc(Relationship::between(arcroles::BOOLEAN_FILTER, &or, &period));
        reg.add_arc(Relationship::between(arcroles::VARIABLE_SET_PRECONDITION, &assertion, &pre));
        reg.add_arc(Relationship::between(arcroles::INSTANCE_VARIABLE, &inst, &a));

        let (set, sink) = resolve(&reg, &assertion, &BTreeMap::new());
        let set = set.unwrap();
        assert!(sink.is_empty());
        let Some(Variable::Fact(fv)) = set.variables.get(&QName::local("a")) else { panic!("fact variable missing") };
        assert_eq!(fv.instance, QName::new("http://example.com", "prior"));
        assert_eq!(fv.filters.len(), 2);
        assert!(fv.filters[0].complement);
        assert!(matches!(&fv.filters[1].kind, FilterKind::Or(children) if children.len() == 1));
        assert_eq!(set.preconditions[0].test, "true()");
        assert_eq!(set.instance, standard_input_instance());
    }

    #[test]
    fn test_group_filter_with_variable_reference_is_ignored() {
        let mut reg = ResourceRegistry::new();
        let assertion = reg.add_resource(resource(kinds::VARIABLE_SET, "existenceAssertion", "ea")).clone();
        let a = reg.add_resource(resource(kinds::VARIABLE, "factVariable", "a")).clone();
        let general = reg.add_resource(resource(kinds::FILTER, "general", "g").attr("test", "$a gt 1")).clone();
        reg.add_arc(Relationship::between(arcroles::VARIABLE_SET, &assertion, &a).named(QName::local("a")));
        reg.add_arc(Relationship::between(arcroles::VARIABLE_SET_FILTER, &assertion, &general));

        let (set, sink) = resolve(&reg, &assertion, &BTreeMap::new());
        assert!(set.unwrap().group_filters.is_empty());
        assert!(sink.contains(ErrorCode::FactVariableReferenceNotAllowed));
        assert!(!sink.contains(ErrorCode::VariableSetFilterCovered));
    }

    #[test]
    fn test_parameter_alias_and_formula_instance() {
        let mut reg = ResourceRegistry::new();
        let formula = reg.add_resource(resource(kinds::VARIABLE_SET, "formula", "f").attr("value", "$rate")).clone();
        let param = reg.add_resource(resource(kinds::PARAMETER, "parameter", "rate").attr("name", "rate")).clone();
        let out = reg.add_resource(resource(kinds::INSTANCE, "instance", "out").attr("name", "{http://example.com}out")).clone();
        reg.add_arc(Relationship::between(arcroles::VARIABLE_SET, &formula, &param).named(QName::local("r")));
        reg.add_arc(Relationship::between(arcroles::FORMULA_INSTANCE, &formula, &out));

        let mut resolved = Parameter::new(QName::local("rate"), "rate");
        resolved.result = Some(crate::computation::Value::Integer(7));
        let params = BTreeMap::from([(QName::local("rate"), resolved)]);

        let (set, _) = resolve(&reg, &formula, &params);
        let set = set.unwrap();
        assert!(set.parameters.contains_key(&QName::local("r")));
        assert!(set.parameters.contains_key(&QName::local("rate")));
        assert_eq!(set.instance, QName::new("http://example.com", "out"));
        assert_ne!(set.instance, standard_output_instance());

        let (err, _) = resolve(&reg, &formula, &BTreeMap::new());
        assert_eq!(err.unwrap_err().code, ErrorCode::UnresolvedDependency);
    }

    #[test]
    fn test_unknown_variable_type_is_structural() {
        let mut reg = ResourceRegistry::new();
        let assertion = reg.add_resource(resource(kinds::VARIABLE_SET, "existenceAssertion", "ea")).clone();
        let odd = reg.add_resource(resource(kinds::VARIABLE, "tupleVariable", "t")).clone();
        reg.add_arc(Relationship::between(arcroles::VARIABLE_SET, &assertion, &odd));
        let (set, _) = resolve(&reg, &assertion, &BTreeMap::new());
        assert_eq!(set.unwrap_err().code, ErrorCode::UnknownResourceType);
    }

    fn general(select: &str) -> Variable {
        Variable::General(crate::variables::GeneralVariable { label: select.into(), select: select.into(), bind_as_sequence: false })
    }

    fn bare_set(test: &str) -> VariableSet {
        VariableSet::new(
            VariableSetKey::new(ROLE, "va"),
            "formula.xml#va",
            VariableSetKind::ValueAssertion { test: test.into() },
            standard_input_instance(),
        )
    }

    #[test]
    fn test_order_follows_references() {
        let mut set = bare_set("$c");
        set.variables.insert(QName::local("c"), general("$b + $p"));
        set.variables.insert(QName::local("b"), general("$a"));
        set.variables.insert(QName::local("a"), general("1"));
        let mut p = Parameter::new(QName::local("p"), "p");
        p.result = Some(crate::computation::Value::Integer(1));
        set.parameters.insert(QName::local("p"), p);

        order_variables(&mut set, &ScriptedEvaluator::new()).unwrap();
        let pos = |n: &str| set.variable_order.iter().position(|v| v == &QName::local(n)).unwrap();
        assert!(pos("a") < pos("b"));
        assert!(pos("b") < pos("c"));
        assert_eq!(set.variable_order.len(), 3);
    }

    #[test]
    fn test_mutual_reference_is_cyclic() {
        let mut set = bare_set("true()");
        set.variables.insert(QName::local("a"), general("$b"));
        set.variables.insert(QName::local("b"), general("$a"));
        let err = order_variables(&mut set, &ScriptedEvaluator::new()).unwrap_err();
        assert_eq!(err.code, ErrorCode::CyclicDependencies);
        assert!(set.variable_order.is_empty());
    }

    #[test]
    fn test_undeclared_reference_in_body() {
        let mut set = bare_set("$missing eq 1");
        set.variables.insert(QName::local("a"), general("1"));
        let err = order_variables(&mut set, &ScriptedEvaluator::new()).unwrap_err();
        assert_eq!(err.code, ErrorCode::UnresolvedDependency);
        assert_eq!(err.details.get("variable").map(String::as_str), Some("missing"));
    }

    #[test]
    fn test_reference_to_unresolved_parameter() {
        let mut set = bare_set("$a gt 0");
        set.variables.insert(QName::local("a"), general("$needed"));
        set.parameters.insert(QName::local("needed"), Parameter::new(QName::local("needed"), "needed"));
        let err = order_variables(&mut set, &ScriptedEvaluator::new()).unwrap_err();
        assert_eq!(err.code, ErrorCode::MissingParameterValue);
        assert_eq!(err.details.get("parameter").map(String::as_str), Some("needed"));
    }
}
