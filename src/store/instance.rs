//! In-memory instance document: facts plus the contexts and units they refer to.

use super::types::{Context, Fact, QName, XbrlUnit};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const INSTANCE_NS: &str = "http://xbrl.org/2010/variable/instance";

/// Name of the instance that fact variables bind to when no instance-variable arc says otherwise.
pub fn standard_input_instance() -> QName { QName::new(INSTANCE_NS, "standard-input-instance") }

pub fn standard_output_instance() -> QName { QName::new(INSTANCE_NS, "standard-output-instance") }

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Instance {
    pub name: QName,
    pub facts: Vec<Fact>,
    pub contexts: BTreeMap<String, Context>,
    pub units: BTreeMap<String, XbrlUnit>,
}

impl Instance {
    pub fn new(name: QName) -> Self { Self { name, ..Default::default() } }

    pub fn add_context(&mut self, context: Context) {
        self.contexts.insert(context.id.clone(), context);
    }

    pub fn add_unit(&mut self, unit: XbrlUnit) {
        self.units.insert(unit.id.clone(), unit);
    }

    pub fn add_fact(&mut self, fact: Fact) { self.facts.push(fact); }

    /// All facts reporting the given concept, in document order.
    pub fn get_element(&self, name: &QName) -> Vec<&Fact> {
        self.facts.iter().filter(|f| &f.concept == name).collect()
    }

    pub fn declares(&self, name: &QName) -> bool { self.facts.iter().any(|f| &f.concept == name) }

    pub fn context(&self, id: &str) -> Option<&Context> { self.contexts.get(id) }

    pub fn unit(&self, id: &str) -> Option<&XbrlUnit> { self.units.get(id) }

    pub fn fact_count(&self) -> usize { self.facts.len() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::types::{Entity, Period};

    #[test]
    fn test_get_element_filters_by_concept() {
        let mut inst = Instance::new(standard_input_instance());
        inst.add_context(Context::new("c1", Entity::default(), Period::Instant("2024-12-31".into())));
        inst.add_fact(Fact::new(QName::local("Assets"), "c1", "10"));
        inst.add_fact(Fact::new(QName::local("Liabilities"), "c1", "4"));
        inst.add_fact(Fact::new(QName::local("Assets"), "c1", "11"));

        let assets = inst.get_element(&QName::local("Assets"));
        assert_eq!(assets.len(), 2);
        assert_eq!(assets[1].value, "11");
        assert!(inst.declares(&QName::local("Liabilities")));
        assert!(!inst.declares(&QName::local("Equity")));
        assert!(inst.context("c1").is_some());
    }
}
