//! ledger.rs
//! Per-variable-set evaluation results and the shared accumulator of formula output.

use super::value::Value;
use crate::analysis::MeasureSet;
use crate::consistency::equality::context_equal;
use crate::store::{Context, Fact, Instance, QName, XbrlUnit};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum EvaluationOutcome {
    /// A formula evaluation; the fact as stored in the accumulator.
    Generated(Fact),
    Passed,
    Failed,
}

/// One evaluation of a variable set: the combination of bound values and what it produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationResult {
    /// Variable values, parameters excluded.
    pub bindings: BTreeMap<QName, Value>,
    /// Facts bound by each fact variable.
    pub bound_facts: BTreeMap<QName, Vec<Fact>>,
    pub outcome: EvaluationOutcome,
}

impl EvaluationResult {
    pub fn generated_fact(&self) -> Option<&Fact> {
        match &self.outcome {
            EvaluationOutcome::Generated(f) => Some(f),
            _ => None,
        }
    }

    pub fn passed(&self) -> bool { matches!(self.outcome, EvaluationOutcome::Passed) }
}

/// Restore point taken before a variable set writes to the accumulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint {
    facts: usize,
    contexts: usize,
    units: usize,
}

/// Facts, contexts and units produced by formulas during one pass.
///
/// Contexts and units are deduplicated by value, so two formulas writing into
/// the same period and entity share one context.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GeneratedFacts {
    facts: Vec<Fact>,
    contexts: Vec<Context>,
    units: Vec<XbrlUnit>,
}

impl GeneratedFacts {
    pub fn new() -> Self { Self::default() }

    /// Stores `fact`, pointing it at the stored copy of `context` and `unit`,
    /// and returns the stored fact.
    pub fn add_fact(&mut self, mut fact: Fact, context: &Context, unit: Option<&XbrlUnit>) -> Fact {
        fact.context_ref = self.intern_context(context);
        fact.unit_ref = unit.map(|u| self.intern_unit(u));
        fact.id = Some(format!("f{}", self.facts.len() + 1));
        self.facts.push(fact.clone());
        fact
    }

    fn intern_context(&mut self, context: &Context) -> String {
        if let Some(existing) = self.contexts.iter().find(|c| context_equal(c, context)) {
            return existing.id.clone();
        }
        let mut stored = context.clone();
        stored.id = format!("c{}", self.contexts.len() + 1);
        let id = stored.id.clone();
        self.contexts.push(stored);
        id
    }

    fn intern_unit(&mut self, unit: &XbrlUnit) -> String {
        let measures = MeasureSet::from_unit(unit);
        if let Some(existing) = self.units.iter().find(|u| MeasureSet::from_unit(u) == measures) {
            return existing.id.clone();
        }
        let stored = measures.to_unit(format!("u{}", self.units.len() + 1));
        let id = stored.id.clone();
        self.units.push(stored);
        id
    }

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint { facts: self.facts.len(), contexts: self.contexts.len(), units: self.units.len() }
    }

    /// Drops everything written after `checkpoint`.
    pub fn rollback(&mut self, checkpoint: Checkpoint) {
        self.facts.truncate(checkpoint.facts);
        self.contexts.truncate(checkpoint.contexts);
        self.units.truncate(checkpoint.units);
    }

    pub fn facts(&self) -> &[Fact] { &self.facts }
    pub fn contexts(&self) -> &[Context] { &self.contexts }
    pub fn units(&self) -> &[XbrlUnit] { &self.units }
    pub fn len(&self) -> usize { self.facts.len() }
    pub fn is_empty(&self) -> bool { self.facts.is_empty() }

    pub fn context(&self, id: &str) -> Option<&Context> { self.contexts.iter().find(|c| c.id == id) }
    pub fn unit(&self, id: &str) -> Option<&XbrlUnit> { self.units.iter().find(|u| u.id == id) }

    /// Materializes the output instance handed to the XML serializer.
    pub fn to_instance(&self, name: QName) -> Instance {
        let mut instance = Instance::new(name);
        for c in &self.contexts {
            instance.add_context(c.clone());
        }
        for u in &self.units {
            instance.add_unit(u.clone());
        }
        for f in &self.facts {
            instance.add_fact(f.clone());
        }
        instance
    }

    pub fn to_json(&self) -> serde_json::Result<String> { serde_json::to_string_pretty(self) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Entity, Period};

    fn ctx(id: &str, at: &str) -> Context {
        Context::new(id, Entity { scheme: "http://www.sec.gov/CIK".into(), identifier: "0001".into() }, Period::Instant(at.into()))
    }

    #[test]
    fn test_contexts_and_units_are_deduplicated() {
        let usd = XbrlUnit::simple("USD", QName::new("http://www.xbrl.org/2003/iso4217", "USD"));
        let usd_again = XbrlUnit::simple("dollars", QName::new("http://www.xbrl.org/2003/iso4217", "USD"));
        let mut gen = GeneratedFacts::new();

        let a = gen.add_fact(Fact::new(QName::local("A"), "x", "1"), &ctx("i1", "2024-12-31"), Some(&usd));
        let b = gen.add_fact(Fact::new(QName::local("B"), "y", "2"), &ctx("i2", "2024-12-31"), Some(&usd_again));
        let c = gen.add_fact(Fact::new(QName::local("C"), "z", "3"), &ctx("i3", "2023-12-31"), None);

        assert_eq!(gen.len(), 3);
        assert_eq!(a.context_ref, "c1");
        assert_eq!(b.context_ref, "c1");
        assert_eq!(c.context_ref, "c2");
        assert_eq!(a.unit_ref.as_deref(), Some("u1"));
        assert_eq!(b.unit_ref.as_deref(), Some("u1"));
        assert_eq!(gen.units().len(), 1);
        assert_eq!(c.id.as_deref(), Some("f3"));
    }

    #[test]
    fn test_rollback_discards_partial_writes() {
        let mut gen = GeneratedFacts::new();
        gen.add_fact(Fact::new(QName::local("A"), "x", "1"), &ctx("i1", "2024-12-31"), None);
        let cp = gen.checkpoint();
        gen.add_fact(Fact::new(QName::local("B"), "x", "2"), &ctx("i2", "2022-12-31"), None);
        gen.rollback(cp);

        assert_eq!(gen.len(), 1);
        assert_eq!(gen.contexts().len(), 1);
    }

    #[test]
    fn test_to_instance_and_json() {
        let mut gen = GeneratedFacts::new();
        gen.add_fact(Fact::new(QName::local("A"), "x", "1"), &ctx("i1", "2024-12-31"), None);
        let inst = gen.to_instance(crate::store::standard_output_instance());
        assert_eq!(inst.fact_count(), 1);
        assert!(inst.context("c1").is_some());
        assert!(gen.to_json().unwrap().contains("\"context_ref\": \"c1\""));
    }
}
