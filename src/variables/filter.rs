//! Filters restrict the facts a fact variable may bind to.

use crate::analysis::MeasureSet;
use crate::computation::evaluator::{Bindings, EvaluationError, ExpressionEvaluator};
use crate::computation::value::Value;
use crate::store::{Context, DimensionValue, Fact, Instance, QName, XbrlUnit};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// A component of a fact's identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Aspect {
    Concept,
    EntityIdentifier,
    Period,
    Unit,
    /// Whole segment content; only an aspect under the non-dimensional model.
    Segment,
    Scenario,
    Dimension(QName),
}

impl fmt::Display for Aspect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Aspect::Concept => f.write_str("concept"),
            Aspect::EntityIdentifier => f.write_str("entity-identifier"),
            Aspect::Period => f.write_str("period"),
            Aspect::Unit => f.write_str("unit"),
            Aspect::Segment => f.write_str("segment"),
            Aspect::Scenario => f.write_str("scenario"),
            Aspect::Dimension(d) => write!(f, "dimension {}", d),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum AspectModel {
    #[default]
    Dimensional,
    NonDimensional,
}

impl AspectModel {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "dimensional" => Some(AspectModel::Dimensional),
            "non-dimensional" => Some(AspectModel::NonDimensional),
            _ => None,
        }
    }
}

impl fmt::Display for AspectModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AspectModel::Dimensional => f.write_str("dimensional"),
            AspectModel::NonDimensional => f.write_str("non-dimensional"),
        }
    }
}

/// A fact together with the context and unit it points at.
#[derive(Debug, Clone, Copy)]
pub struct FactView<'a> {
    pub fact: &'a Fact,
    pub context: Option<&'a Context>,
    pub unit: Option<&'a XbrlUnit>,
}

impl<'a> FactView<'a> {
    pub fn in_instance(fact: &'a Fact, instance: &'a Instance) -> Self {
        Self {
            fact,
            context: instance.context(&fact.context_ref),
            unit: fact.unit_ref.as_deref().and_then(|u| instance.unit(u)),
        }
    }
}

/// The value of every aspect the fact has under `model`, in comparable text form.
pub fn aspect_values(view: &FactView<'_>, model: AspectModel) -> BTreeMap<Aspect, String> {
    let mut values = BTreeMap::new();
    values.insert(Aspect::Concept, view.fact.concept.clark());
    if let Some(unit) = view.unit {
        values.insert(Aspect::Unit, MeasureSet::from_unit(unit).to_string());
    }
    let Some(ctx) = view.context else { return values };

    values.insert(Aspect::EntityIdentifier, format!("{}#{}", ctx.entity.scheme, ctx.entity.identifier));
    values.insert(Aspect::Period, ctx.period.to_string());
    match model {
        AspectModel::Dimensional => {
            for (dim, member) in &ctx.dimensions {
                values.insert(Aspect::Dimension(dim.clone()), member.to_string());
            }
            if let Some(seg) = &ctx.segment {
                values.insert(Aspect::Segment, seg.clone());
            }
            if let Some(scen) = &ctx.scenario {
                values.insert(Aspect::Scenario, scen.clone());
            }
        }
        AspectModel::NonDimensional => {
            // Dimension members are ordinary segment content here.
            let dims: Vec<String> = ctx.dimensions.iter().map(|(d, m)| format!("{}={}", d, m)).collect();
            let mut segment = ctx.segment.clone().unwrap_or_default();
            if !dims.is_empty() {
                segment = format!("{}[{}]", segment, dims.join(","));
            }
            if !segment.is_empty() {
                values.insert(Aspect::Segment, segment);
            }
            if let Some(scen) = &ctx.scenario {
                values.insert(Aspect::Scenario, scen.clone());
            }
        }
    }
    values
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum FilterKind {
    ConceptName { concepts: Vec<QName> },
    /// An empty member list accepts any member of the dimension.
    ExplicitDimension { dimension: QName, members: Vec<QName> },
    TypedDimension { dimension: QName, test: Option<String> },
    Period { test: String },
    /// `measure` is a unit expression such as `{ns}USD/{ns}shares`.
    Unit { measure: String },
    Segment { test: Option<String> },
    Scenario { test: Option<String> },
    General { test: String },
    And(Vec<Filter>),
    Or(Vec<Filter>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Filter {
    pub label: String,
    pub kind: FilterKind,
    pub complement: bool,
    pub cover: bool,
}

impl Filter {
    pub fn new(label: impl Into<String>, kind: FilterKind) -> Self {
        Self { label: label.into(), kind, complement: false, cover: true }
    }

    /// Aspects this filter restricts, whether or not it covers them.
    pub fn aspects(&self) -> BTreeSet<Aspect> {
        match &self.kind {
            FilterKind::ConceptName { .. } => BTreeSet::from([Aspect::Concept]),
            FilterKind::ExplicitDimension { dimension, .. } | FilterKind::TypedDimension { dimension, .. } => {
                BTreeSet::from([Aspect::Dimension(dimension.clone())])
            }
            FilterKind::Period { .. } => BTreeSet::from([Aspect::Period]),
            FilterKind::Unit { .. } => BTreeSet::from([Aspect::Unit]),
            FilterKind::Segment { .. } => BTreeSet::from([Aspect::Segment]),
            FilterKind::Scenario { .. } => BTreeSet::from([Aspect::Scenario]),
            FilterKind::General { .. } => BTreeSet::new(),
            FilterKind::And(children) | FilterKind::Or(children) => children.iter().flat_map(Filter::aspects).collect(),
        }
    }

    pub fn covered_aspects(&self) -> BTreeSet<Aspect> {
        if self.cover { self.aspects() } else { BTreeSet::new() }
    }

    /// Dimension filters, which need the dimensional aspect model.
    pub fn is_dimensional(&self) -> bool {
        match &self.kind {
            FilterKind::ExplicitDimension { .. } | FilterKind::TypedDimension { .. } => true,
            FilterKind::And(children) | FilterKind::Or(children) => children.iter().any(Filter::is_dimensional),
            _ => false,
        }
    }

    /// Segment and scenario filters, which only make sense without dimensions.
    pub fn is_non_dimensional_only(&self) -> bool {
        match &self.kind {
            FilterKind::Segment { .. } | FilterKind::Scenario { .. } => true,
            FilterKind::And(children) | FilterKind::Or(children) => children.iter().any(Filter::is_non_dimensional_only),
            _ => false,
        }
    }

    /// Expression texts, used to discover variable references.
    pub fn expressions(&self) -> Vec<&str> {
        match &self.kind {
            FilterKind::Period { test } | FilterKind::General { test } => vec![test.as_str()],
            FilterKind::TypedDimension { test, .. } | FilterKind::Segment { test } | FilterKind::Scenario { test } => {
                test.as_deref().into_iter().collect()
            }
            FilterKind::And(children) | FilterKind::Or(children) => children.iter().flat_map(Filter::expressions).collect(),
            FilterKind::ConceptName { .. } | FilterKind::ExplicitDimension { .. } | FilterKind::Unit { .. } => Vec::new(),
        }
    }

    /// Tests one candidate fact. Expression tests see the fact as the context item.
    pub fn accepts(
        &self,
        view: &FactView<'_>,
        evaluator: &dyn ExpressionEvaluator,
        bindings: &Bindings,
    ) -> Result<bool, EvaluationError> {
        let matched = self.matches(view, evaluator, bindings)?;
        Ok(matched != self.complement)
    }

    fn matches(
        &self,
        view: &FactView<'_>,
        evaluator: &dyn ExpressionEvaluator,
        bindings: &Bindings,
    ) -> Result<bool, EvaluationError> {
        let test = |expr: &str| -> Result<bool, EvaluationError> {
            let scoped = bindings.with_context_item(Value::fact(view.fact));
            Ok(evaluator.evaluate(expr, &scoped)?.effective_boolean())
        };

        match &self.kind {
            FilterKind::ConceptName { concepts } => Ok(concepts.contains(&view.fact.concept)),
            FilterKind::ExplicitDimension { dimension, members } => {
                let member = view.context.and_then(|c| c.dimensions.get(dimension));
                Ok(match member {
                    Some(DimensionValue::Explicit(m)) => members.is_empty() || members.contains(m),
                    _ => false,
                })
            }
            FilterKind::TypedDimension { dimension, test: expr } => {
                let member = view.context.and_then(|c| c.dimensions.get(dimension));
                match (member, expr) {
                    (Some(DimensionValue::Typed(_)), None) => Ok(true),
                    (Some(DimensionValue::Typed(_)), Some(expr)) => test(expr),
                    _ => Ok(false),
                }
            }
            FilterKind::Period { test: expr } | FilterKind::General { test: expr } => test(expr),
            FilterKind::Unit { measure } => {
                let wanted = MeasureSet::parse(measure)
                    .map_err(|_| EvaluationError::Type(format!("invalid unit measure '{}' in filter {}", measure, self.label)))?;
                Ok(view.unit.map_or(false, |u| MeasureSet::from_unit(u) == wanted))
            }
            FilterKind::Segment { test: expr } => {
                let present = view.context.map_or(false, |c| c.segment.is_some() || !c.dimensions.is_empty());
                match expr {
                    Some(expr) if present => test(expr),
                    _ => Ok(present),
                }
            }
            FilterKind::Scenario { test: expr } => {
                let present = view.context.map_or(false, |c| c.scenario.is_some());
                match expr {
                    Some(expr) if present => test(expr),
                    _ => Ok(present),
                }
            }
            FilterKind::And(children) => {
                for child in children {
                    if !child.accepts(view, evaluator, bindings)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            FilterKind::Or(children) => {
                for child in children {
                    if child.accepts(view, evaluator, bindings)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Entity, Period};
    use crate::testing::ScriptedEvaluator;

    const ISO: &str = "http://www.xbrl.org/2003/iso4217";

    fn instance() -> Instance {
        let mut inst = Instance::new(crate::store::standard_input_instance());
        let entity = Entity { scheme: "http://x".into(), identifier: "E1".into() };
        inst.add_context(Context::new("c1", entity.clone(), Period::Instant("2024-12-31".into())));
        inst.add_context(
            Context::new("c2", entity, Period::Instant("2024-12-31".into()))
                .with_dimension(QName::local("Region"), DimensionValue::Explicit(QName::local("North"))),
        );
        inst.add_unit(XbrlUnit::simple("usd", QName::new(ISO, "USD")));
        inst.add_fact(Fact::new(QName::local("Sales"), "c1", "10").with_unit("usd"));
        inst.add_fact(Fact::new(QName::local("Sales"), "c2", "4").with_unit("usd"));
        inst
    }

    #[test]
    fn test_concept_and_dimension_filters() {
        let inst = instance();
        let eval = ScriptedEvaluator::new();
        let b = Bindings::new();
        let plain = FactView::in_instance(&inst.facts[0], &inst);
        let north = FactView::in_instance(&inst.facts[1], &inst);

        let concept = Filter::new("cf", FilterKind::ConceptName { concepts: vec![QName::local("Sales")] });
        assert!(concept.accepts(&plain, &eval, &b).unwrap());

        let dim = Filter::new("df", FilterKind::ExplicitDimension { dimension: QName::local("Region"), members: vec![] });
        assert!(!dim.accepts(&plain, &eval, &b).unwrap());
        assert!(dim.accepts(&north, &eval, &b).unwrap());

        let mut not_dim = dim.clone();
        not_dim.complement = true;
        assert!(not_dim.accepts(&plain, &eval, &b).unwrap());
    }

    #[test]
    fn test_unit_filter_and_boolean_composition() {
        let inst = instance();
        let eval = ScriptedEvaluator::new();
        let b = Bindings::new();
        let view = FactView::in_instance(&inst.facts[0], &inst);

        let usd = Filter::new("uf", FilterKind::Unit { measure: format!("{{{}}}USD", ISO) });
        let eur = Filter::new("uf2", FilterKind::Unit { measure: format!("{{{}}}EUR", ISO) });
        assert!(usd.accepts(&view, &eval, &b).unwrap());

        let either = Filter::new("or", FilterKind::Or(vec![usd.clone(), eur.clone()]));
        let both = Filter::new("and", FilterKind::And(vec![usd, eur]));
        assert!(either.accepts(&view, &eval, &b).unwrap());
        assert!(!both.accepts(&view, &eval, &b).unwrap());
        assert_eq!(either.aspects(), BTreeSet::from([Aspect::Unit]));
    }

    #[test]
    fn test_aspect_values_follow_model() {
        let inst = instance();
        let view = FactView::in_instance(&inst.facts[1], &inst);
        let dimensional = aspect_values(&view, AspectModel::Dimensional);
        assert_eq!(dimensional.get(&Aspect::Dimension(QName::local("Region"))).map(String::as_str), Some("North"));
        assert!(!dimensional.contains_key(&Aspect::Segment));

        let flat = aspect_values(&view, AspectModel::NonDimensional);
        assert_eq!(flat.get(&Aspect::Segment).map(String::as_str), Some("[Region=North]"));
    }

    #[test]
    fn test_non_covering_filter_covers_nothing() {
        let mut f = Filter::new("p", FilterKind::Period { test: "true()".into() });
        f.cover = false;
        assert!(f.covered_aspects().is_empty());
        assert_eq!(f.expressions(), vec!["true()"]);
        assert!(!f.is_dimensional());
    }
}
