//! factory.rs
//! Builds domain objects from taxonomy resources by their type tag.

use super::filter::{AspectModel, Filter, FilterKind};
use super::variable::{FactVariable, GeneralVariable, Variable};
use super::variable_set::{ConsistencyRules, FormulaRules, VariableSet, VariableSetKey, VariableSetKind};
use crate::diagnostics::{Diagnostic, ErrorCode};
use crate::store::{QName, Resource};
use std::collections::HashMap;

/// Values used where a resource leaves an attribute unset.
#[derive(Debug, Clone, PartialEq)]
pub struct FactoryDefaults {
    pub implicit_filtering: bool,
    pub input_instance: QName,
    pub output_instance: QName,
}

impl Default for FactoryDefaults {
    fn default() -> Self {
        Self {
            implicit_filtering: true,
            input_instance: crate::store::standard_input_instance(),
            output_instance: crate::store::standard_output_instance(),
        }
    }
}

type VariableSetCtor = fn(&Resource) -> Result<VariableSetKind, Diagnostic>;
type VariableCtor = fn(&Resource, &FactoryDefaults) -> Result<Variable, Diagnostic>;
type FilterCtor = fn(&Resource) -> Result<FilterKind, Diagnostic>;

/// Registry of constructors keyed by resource subtype.
pub struct ResourceFactory {
    variable_sets: HashMap<&'static str, VariableSetCtor>,
    variables: HashMap<&'static str, VariableCtor>,
    filters: HashMap<&'static str, FilterCtor>,
}

impl Default for ResourceFactory {
    fn default() -> Self {
        let mut factory = Self { variable_sets: HashMap::new(), variables: HashMap::new(), filters: HashMap::new() };

        factory.variable_sets.insert("formula", formula);
        factory.variable_sets.insert("valueAssertion", value_assertion);
        factory.variable_sets.insert("existenceAssertion", |_| Ok(VariableSetKind::ExistenceAssertion));
        factory.variable_sets.insert("consistencyAssertion", consistency_assertion);

        factory.variables.insert("factVariable", fact_variable);
        factory.variables.insert("generalVariable", general_variable);

        factory.filters.insert("conceptName", concept_name);
        factory.filters.insert("explicitDimension", explicit_dimension);
        factory.filters.insert("typedDimension", typed_dimension);
        factory.filters.insert("period", |r| Ok(FilterKind::Period { test: required(r, "test")?.to_string() }));
        factory.filters.insert("unit", |r| Ok(FilterKind::Unit { measure: required(r, "measure")?.to_string() }));
        factory.filters.insert("segment", |r| Ok(FilterKind::Segment { test: r.get("test").map(str::to_string) }));
        factory.filters.insert("scenario", |r| Ok(FilterKind::Scenario { test: r.get("test").map(str::to_string) }));
        factory.filters.insert("general", |r| Ok(FilterKind::General { test: required(r, "test")?.to_string() }));
        factory.filters.insert("andFilter", |_| Ok(FilterKind::And(Vec::new())));
        factory.filters.insert("orFilter", |_| Ok(FilterKind::Or(Vec::new())));

        factory
    }
}

impl ResourceFactory {
    pub fn new() -> Self { Self::default() }

    pub fn register_filter(&mut self, tag: &'static str, ctor: FilterCtor) { self.filters.insert(tag, ctor); }

    pub fn create_variable_set(&self, resource: &Resource, defaults: &FactoryDefaults) -> Result<VariableSet, Diagnostic> {
        let ctor = self.variable_sets.get(resource.subtype.as_str()).ok_or_else(|| unknown(resource))?;
        let kind = ctor(resource)?;

        // Assertions read the input; formulas write to the output instance unless a formula-instance arc says otherwise.
        let instance = if kind.is_formula() { defaults.output_instance.clone() } else { defaults.input_instance.clone() };
        let key = VariableSetKey::new(resource.link_role.clone(), resource.label.clone());
        let mut set = VariableSet::new(key, resource.path.clone(), kind, instance);
        set.implicit_filtering = resource.flag("implicitFiltering", defaults.implicit_filtering);
        if let Some(model) = resource.get("aspectModel") {
            set.aspect_model = AspectModel::parse(model).ok_or_else(|| {
                Diagnostic::new(ErrorCode::UnknownResourceType, format!("Unknown aspect model '{}' on {}", model, resource.label))
                    .with("variableSet", resource.label.clone())
            })?;
        }
        Ok(set)
    }

    pub fn create_variable(&self, resource: &Resource, defaults: &FactoryDefaults) -> Result<Variable, Diagnostic> {
        let ctor = self.variables.get(resource.subtype.as_str()).ok_or_else(|| unknown(resource))?;
        ctor(resource, defaults)
    }

    /// `complement` and `cover` come from the arc that attaches the filter.
    pub fn create_filter(&self, resource: &Resource, complement: bool, cover: bool) -> Result<Filter, Diagnostic> {
        let ctor = self.filters.get(resource.subtype.as_str()).ok_or_else(|| unknown(resource))?;
        Ok(Filter { label: resource.label.clone(), kind: ctor(resource)?, complement, cover })
    }
}

fn unknown(resource: &Resource) -> Diagnostic {
    Diagnostic::new(
        ErrorCode::UnknownResourceType,
        format!("No constructor for {} type '{}' ({})", resource.kind, resource.subtype, resource.label),
    )
    .with("resource", resource.path.clone())
}

fn required<'r>(resource: &'r Resource, key: &str) -> Result<&'r str, Diagnostic> {
    resource.get(key).ok_or_else(|| {
        Diagnostic::new(
            ErrorCode::UnknownResourceType,
            format!("{} '{}' lacks required attribute '{}'", resource.subtype, resource.label, key),
        )
        .with("resource", resource.path.clone())
    })
}

fn qname_attr(resource: &Resource, key: &str) -> Result<Option<QName>, Diagnostic> {
    match resource.get(key) {
        None => Ok(None),
        Some(raw) => QName::parse_clark(raw).map(Some).ok_or_else(|| {
            Diagnostic::new(ErrorCode::UnknownResourceType, format!("'{}' is not a valid name for {}", raw, key))
                .with("resource", resource.path.clone())
        }),
    }
}

fn dimension_attr(resource: &Resource) -> Result<QName, Diagnostic> {
    required(resource, "dimension")?;
    qname_attr(resource, "dimension")?.ok_or_else(|| unknown(resource))
}

fn qname_list(resource: &Resource, key: &str) -> Vec<QName> {
    resource.get(key).map(|s| s.split_whitespace().filter_map(QName::parse_clark).collect()).unwrap_or_default()
}

fn formula(r: &Resource) -> Result<VariableSetKind, Diagnostic> {
    Ok(VariableSetKind::Formula(FormulaRules {
        value: required(r, "value")?.to_string(),
        concept: qname_attr(r, "concept")?,
        source: qname_attr(r, "source")?,
        unit: r.get("unit").map(str::to_string),
        decimals: r.get("decimals").map(str::to_string),
        precision: r.get("precision").map(str::to_string),
    }))
}

fn value_assertion(r: &Resource) -> Result<VariableSetKind, Diagnostic> {
    Ok(VariableSetKind::ValueAssertion { test: required(r, "test")?.to_string() })
}

fn consistency_assertion(r: &Resource) -> Result<VariableSetKind, Diagnostic> {
    Ok(VariableSetKind::ConsistencyAssertion(ConsistencyRules {
        strict: r.flag("strict", false),
        absolute_radius: r.get("absoluteAcceptanceRadius").map(str::to_string),
        proportional_radius: r.get("proportionalAcceptanceRadius").map(str::to_string),
    }))
}

fn fact_variable(r: &Resource, defaults: &FactoryDefaults) -> Result<Variable, Diagnostic> {
    Ok(Variable::Fact(FactVariable {
        label: r.label.clone(),
        filters: Vec::new(),
        instance: defaults.input_instance.clone(),
        bind_as_sequence: r.flag("bindAsSequence", false),
        fallback: r.get("fallbackValue").map(str::to_string),
        nils: r.flag("nils", false),
    }))
}

fn general_variable(r: &Resource, _: &FactoryDefaults) -> Result<Variable, Diagnostic> {
    Ok(Variable::General(GeneralVariable {
        label: r.label.clone(),
        select: required(r, "select")?.to_string(),
        bind_as_sequence: r.flag("bindAsSequence", false),
    }))
}

fn concept_name(r: &Resource) -> Result<FilterKind, Diagnostic> {
    Ok(FilterKind::ConceptName { concepts: qname_list(r, "concepts") })
}

fn explicit_dimension(r: &Resource) -> Result<FilterKind, Diagnostic> {
    let dimension = dimension_attr(r)?;
    Ok(FilterKind::ExplicitDimension { dimension, members: qname_list(r, "members") })
}

fn typed_dimension(r: &Resource) -> Result<FilterKind, Diagnostic> {
    let dimension = dimension_attr(r)?;
    Ok(FilterKind::TypedDimension { dimension, test: r.get("test").map(str::to_string) })
}
