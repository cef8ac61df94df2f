//! Resource and arc discovery over an already-parsed taxonomy.
//!
//! The linkbase parser lives outside this crate. It hands over flat lists of
//! resources and arcs; `ArcProvider` is the query surface the resolvers use, and
//! `ResourceRegistry` is the in-memory implementation.

use super::types::QName;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

pub mod arcroles {
    pub const VARIABLE_SET: &str = "http://xbrl.org/arcrole/2008/variable-set";
    pub const VARIABLE_FILTER: &str = "http://xbrl.org/arcrole/2008/variable-filter";
    pub const VARIABLE_SET_FILTER: &str = "http://xbrl.org/arcrole/2008/variable-set-filter";
    pub const VARIABLE_SET_PRECONDITION: &str = "http://xbrl.org/arcrole/2008/variable-set-precondition";
    pub const BOOLEAN_FILTER: &str = "http://xbrl.org/arcrole/2008/boolean-filter";
    pub const CONSISTENCY_ASSERTION_FORMULA: &str = "http://xbrl.org/arcrole/2008/consistency-assertion-formula";
    pub const INSTANCE_VARIABLE: &str = "http://xbrl.org/arcrole/2010/instance-variable";
    pub const FORMULA_INSTANCE: &str = "http://xbrl.org/arcrole/2010/formula-instance";
    pub const VARIABLES_SCOPE: &str = "http://xbrl.org/arcrole/2010/variables-scope";
}

/// Resource kinds understood by the factory.
pub mod kinds {
    pub const VARIABLE_SET: &str = "variableSet";
    pub const VARIABLE: &str = "variable";
    pub const FILTER: &str = "filter";
    pub const PARAMETER: &str = "parameter";
    pub const PRECONDITION: &str = "precondition";
    pub const INSTANCE: &str = "instance";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub label: String,
    /// Document-unique locator, `linkbase.xml#fragment`.
    pub path: String,
    pub link_role: String,
    pub kind: String,
    /// Type tag used by the factory, e.g. `factVariable` or `conceptName`.
    pub subtype: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl Resource {
    pub fn new(kind: &str, subtype: &str, link_role: &str, label: &str) -> Self {
        Self {
            label: label.to_string(),
            path: format!("formula.xml#{}", label),
            link_role: link_role.to_string(),
            kind: kind.to_string(),
            subtype: subtype.to_string(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn at(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn attr(mut self, key: &str, value: impl Into<String>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> { self.attributes.get(key).map(String::as_str) }

    /// Boolean attribute with XML Schema lexical forms; absent means `default`.
    pub fn flag(&self, key: &str, default: bool) -> bool {
        match self.get(key).map(str::trim) {
            Some("true") | Some("1") => true,
            Some("false") | Some("0") => false,
            _ => default,
        }
    }

    pub fn linkbase(&self) -> &str { linkbase_of(&self.path) }
}

/// An arc between two resources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub arcrole: String,
    pub link_role: String,
    pub from: String,
    pub to: String,
    pub from_path: String,
    pub to_path: String,
    pub to_role_uri: Option<String>,
    /// The `name` attribute of variable-set and variables-scope arcs.
    pub name: Option<QName>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl Relationship {
    pub fn between(arcrole: &str, from: &Resource, to: &Resource) -> Self {
        Self {
            arcrole: arcrole.to_string(),
            link_role: from.link_role.clone(),
            from: from.label.clone(),
            to: to.label.clone(),
            from_path: from.path.clone(),
            to_path: to.path.clone(),
            to_role_uri: None,
            name: None,
            attributes: BTreeMap::new(),
        }
    }

    pub fn named(mut self, name: QName) -> Self {
        self.name = Some(name);
        self
    }

    pub fn attr(mut self, key: &str, value: impl Into<String>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }

    pub fn flag(&self, key: &str, default: bool) -> bool {
        match self.attributes.get(key).map(|s| s.trim()) {
            Some("true") | Some("1") => true,
            Some("false") | Some("0") => false,
            _ => default,
        }
    }

    pub fn from_linkbase(&self) -> &str { linkbase_of(&self.from_path) }
    pub fn to_linkbase(&self) -> &str { linkbase_of(&self.to_path) }
}

fn linkbase_of(path: &str) -> &str { path.split('#').next().unwrap_or(path) }

/// Selection criteria for `ArcProvider::generic_arcs`. Unset fields match anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArcQuery<'a> {
    pub arcrole: &'a str,
    pub link_role: Option<&'a str>,
    pub from_label: Option<&'a str>,
    pub from_path: Option<&'a str>,
    pub to_label: Option<&'a str>,
    pub to_path: Option<&'a str>,
}

impl<'a> ArcQuery<'a> {
    pub fn new(arcrole: &'a str) -> Self { Self { arcrole, ..Default::default() } }

    pub fn link_role(mut self, role: &'a str) -> Self {
        self.link_role = Some(role);
        self
    }

    pub fn from(mut self, resource: &'a Resource) -> Self {
        self.from_label = Some(&resource.label);
        self.from_path = Some(&resource.path);
        self
    }

    pub fn to(mut self, resource: &'a Resource) -> Self {
        self.to_label = Some(&resource.label);
        self.to_path = Some(&resource.path);
        self
    }

    fn matches(&self, arc: &Relationship) -> bool {
        arc.arcrole == self.arcrole
            && self.link_role.map_or(true, |r| r == arc.link_role)
            && self.from_label.map_or(true, |l| l == arc.from)
            && self.from_path.map_or(true, |p| p == arc.from_path)
            && self.to_label.map_or(true, |l| l == arc.to)
            && self.to_path.map_or(true, |p| p == arc.to_path)
    }
}

/// The taxonomy graph as seen by the resolvers.
pub trait ArcProvider {
    fn generic_resources(&self, kind: &str, subtype: Option<&str>) -> Vec<&Resource>;
    fn generic_arcs(&self, query: &ArcQuery<'_>) -> Vec<&Relationship>;
    fn resource(&self, path: &str) -> Option<&Resource>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceRegistry {
    resources: Vec<Resource>,
    arcs: Vec<Relationship>,

    // Rebuilt on insert, not serialized
    #[serde(skip)]
    by_path: HashMap<String, usize>,
}

impl ResourceRegistry {
    pub fn new() -> Self { Self::default() }

    /// Rebuilds the path index after deserialization.
    pub fn rebuild_index(&mut self) {
        self.by_path = self.resources.iter().enumerate().map(|(i, r)| (r.path.clone(), i)).collect();
    }

    /// Registers a resource. A later resource with the same path replaces the earlier one.
    pub fn add_resource(&mut self, resource: Resource) -> &Resource {
        let idx = match self.by_path.get(&resource.path) {
            Some(&idx) => {
                self.resources[idx] = resource;
                idx
            }
            None => {
                self.by_path.insert(resource.path.clone(), self.resources.len());
                self.resources.push(resource);
                self.resources.len() - 1
            }
        };
        &self.resources[idx]
    }

    pub fn add_arc(&mut self, arc: Relationship) { self.arcs.push(arc); }

    pub fn resource_count(&self) -> usize { self.resources.len() }
    pub fn arc_count(&self) -> usize { self.arcs.len() }
}

impl ArcProvider for ResourceRegistry {
    fn generic_resources(&self, kind: &str, subtype: Option<&str>) -> Vec<&Resource> {
        self.resources
            .iter()
            .filter(|r| r.kind == kind && subtype.map_or(true, |s| s == r.subtype))
            .collect()
    }

    fn generic_arcs(&self, query: &ArcQuery<'_>) -> Vec<&Relationship> {
        let mut arcs: Vec<&Relationship> = self.arcs.iter().filter(|a| query.matches(a)).collect();
        // `order` attribute, then document order
        arcs.sort_by(|a, b| arc_order(a).total_cmp(&arc_order(b)));
        arcs
    }

    fn resource(&self, path: &str) -> Option<&Resource> {
        self.by_path.get(path).map(|&i| &self.resources[i])
    }
}

fn arc_order(arc: &Relationship) -> f64 {
    arc.attributes.get("order").and_then(|o| o.trim().parse::<f64>().ok()).unwrap_or(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROLE: &str = "http://www.xbrl.org/2003/role/link";

    #[test]
    fn test_arc_query_filters_and_orders() {
        let mut reg = ResourceRegistry::new();
        let formula = reg.add_resource(Resource::new(kinds::VARIABLE_SET, "formula", ROLE, "f1")).clone();
        let a = reg.add_resource(Resource::new(kinds::VARIABLE, "factVariable", ROLE, "va")).clone();
        let b = reg.add_resource(Resource::new(kinds::VARIABLE, "factVariable", ROLE, "vb")).clone();

        reg.add_arc(Relationship::between(arcroles::VARIABLE_SET, &formula, &a).named(QName::local("a")).attr("order", "2"));
        reg.add_arc(Relationship::between(arcroles::VARIABLE_SET, &formula, &b).named(QName::local("b")).attr("order", "1"));
        reg.add_arc(Relationship::between(arcroles::VARIABLE_FILTER, &a, &b));

        let arcs = reg.generic_arcs(&ArcQuery::new(arcroles::VARIABLE_SET).link_role(ROLE).from(&formula));
        let names: Vec<_> = arcs.iter().map(|a| a.name.clone().unwrap().local_name).collect();
        assert_eq!(names, vec!["b", "a"]);

        assert_eq!(reg.generic_resources(kinds::VARIABLE, Some("factVariable")).len(), 2);
        assert_eq!(reg.resource("formula.xml#va").map(|r| r.label.as_str()), Some("va"));
        assert_eq!(arcs[0].to_linkbase(), "formula.xml");
    }

    #[test]
    fn test_resource_flags() {
        let r = Resource::new(kinds::PARAMETER, "parameter", ROLE, "p").attr("required", "true");
        assert!(r.flag("required", false));
        assert!(!r.flag("bindAsSequence", false));
    }
}
