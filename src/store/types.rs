//! Core XBRL data model shared by every stage of the engine.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A namespace-qualified name. Used as the key of every variable, parameter
/// and concept map, and printed in Clark notation (`{namespace}localName`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct QName {
    pub namespace: String,
    pub local_name: String,
}

impl QName {
    pub fn new(namespace: impl Into<String>, local_name: impl Into<String>) -> Self {
        Self { namespace: namespace.into(), local_name: local_name.into() }
    }

    /// A name in no namespace.
    pub fn local(local_name: impl Into<String>) -> Self { Self::new("", local_name) }

    /// Parses `{ns}local` or a bare `local`. Returns `None` for malformed braces or an empty local part.
    pub fn parse_clark(s: &str) -> Option<Self> {
        let s = s.trim();
        let qname = match s.strip_prefix('{') {
            Some(rest) => {
                let (ns, local) = rest.split_once('}')?;
                Self::new(ns, local)
            }
            None if s.contains('}') => return None,
            None => Self::local(s),
        };
        if qname.local_name.is_empty() { None } else { Some(qname) }
    }

    pub fn clark(&self) -> String {
        if self.namespace.is_empty() {
            self.local_name.clone()
        } else {
            format!("{{{}}}{}", self.namespace, self.local_name)
        }
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.clark()) }
}

/// The `decimals` or `precision` attribute of a numeric fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Precision {
    Finite(i32),
    Infinite,
}

impl Precision {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "INF" => Some(Precision::Infinite),
            other => other.parse::<i32>().ok().map(Precision::Finite),
        }
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Precision::Finite(n) => write!(f, "{}", n),
            Precision::Infinite => f.write_str("INF"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Fact {
    pub id: Option<String>,
    pub concept: QName,
    pub context_ref: String,
    pub unit_ref: Option<String>,
    pub decimals: Option<Precision>,
    pub precision: Option<Precision>,
    pub value: String,
    #[serde(default)]
    pub nil: bool,
}

impl Fact {
    pub fn new(concept: QName, context_ref: impl Into<String>, value: impl Into<String>) -> Self {
        Self { concept, context_ref: context_ref.into(), value: value.into(), ..Default::default() }
    }

    pub fn with_unit(mut self, unit_ref: impl Into<String>) -> Self {
        self.unit_ref = Some(unit_ref.into());
        self
    }

    pub fn with_decimals(mut self, decimals: Precision) -> Self {
        self.decimals = Some(decimals);
        self
    }

    pub fn with_precision(mut self, precision: Precision) -> Self {
        self.precision = Some(precision);
        self
    }

    pub fn is_numeric(&self) -> bool { self.unit_ref.is_some() }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Period {
    Instant(String),
    Duration { start: String, end: String },
    Forever,
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Period::Instant(at) => write!(f, "{}", at),
            Period::Duration { start, end } => write!(f, "{}/{}", start, end),
            Period::Forever => f.write_str("forever"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Entity {
    pub scheme: String,
    pub identifier: String,
}

/// Member of a dimension in a context's segment or scenario.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DimensionValue {
    Explicit(QName),
    Typed(String),
}

impl fmt::Display for DimensionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DimensionValue::Explicit(member) => write!(f, "{}", member),
            DimensionValue::Typed(content) => f.write_str(content),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    pub id: String,
    pub entity: Entity,
    pub period: Period,
    #[serde(default)]
    pub dimensions: BTreeMap<QName, DimensionValue>,
    /// Non-dimensional segment content, kept as normalized text.
    #[serde(default)]
    pub segment: Option<String>,
    #[serde(default)]
    pub scenario: Option<String>,
}

impl Context {
    pub fn new(id: impl Into<String>, entity: Entity, period: Period) -> Self {
        Self { id: id.into(), entity, period, dimensions: BTreeMap::new(), segment: None, scenario: None }
    }

    pub fn with_dimension(mut self, dimension: QName, value: DimensionValue) -> Self {
        self.dimensions.insert(dimension, value);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct XbrlUnit {
    pub id: String,
    pub numerator: Vec<QName>,
    #[serde(default)]
    pub denominator: Vec<QName>,
}

impl XbrlUnit {
    pub fn simple(id: impl Into<String>, measure: QName) -> Self {
        Self { id: id.into(), numerator: vec![measure], denominator: Vec::new() }
    }
}
