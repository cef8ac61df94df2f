//! The seam to the external expression language.
//!
//! This crate never parses or runs expressions itself. It discovers which
//! names an expression refers to, binds values to those names, and hands the
//! text plus bindings to an `ExpressionEvaluator`.

use super::value::Value;
use crate::store::QName;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvaluationError {
    #[error("Expression '{expression}' failed: {message}")]
    Expression { expression: String, message: String },
    #[error("Variable '{0}' is not bound")]
    UnboundVariable(QName),
    #[error("Instance '{0}' is not loaded")]
    UnknownInstance(QName),
    #[error("Formula '{0}' has neither a concept rule nor a source fact")]
    MissingConcept(String),
    #[error("Formula '{0}' has no source fact for its context")]
    MissingSource(String),
    #[error("Type error: {0}")]
    Type(String),
}

impl EvaluationError {
    pub fn expression(expression: &str, message: impl Into<String>) -> Self {
        Self::Expression { expression: expression.to_string(), message: message.into() }
    }
}

/// Named values visible to one expression evaluation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bindings {
    pub variables: BTreeMap<QName, Value>,
    /// The `.` item, set while a filter tests a candidate fact.
    pub context_item: Option<Value>,
}

impl Bindings {
    pub fn new() -> Self { Self::default() }

    pub fn bind(&mut self, name: QName, value: Value) { self.variables.insert(name, value); }

    pub fn get(&self, name: &QName) -> Option<&Value> { self.variables.get(name) }

    pub fn require(&self, name: &QName) -> Result<&Value, EvaluationError> {
        self.get(name).ok_or_else(|| EvaluationError::UnboundVariable(name.clone()))
    }

    pub fn with_context_item(&self, item: Value) -> Self {
        Self { variables: self.variables.clone(), context_item: Some(item) }
    }
}

pub trait ExpressionEvaluator {
    /// Evaluates an expression against the given bindings.
    fn evaluate(&self, expression: &str, bindings: &Bindings) -> Result<Value, EvaluationError>;

    /// Variable and parameter names the expression refers to.
    fn references(&self, expression: &str) -> Vec<QName> { scan_variable_references(expression, &BTreeMap::new()) }
}

/// Extracts `$name` references from expression text, in first-use order and
/// without repeats. String literals are skipped. `$prefix:local` is resolved
/// through `namespaces`; an unknown prefix is kept as the namespace so the
/// reference still fails to resolve loudly later. `${ns}local` is accepted.
pub fn scan_variable_references(expression: &str, namespaces: &BTreeMap<String, String>) -> Vec<QName> {
    static LITERAL_RE: OnceLock<Regex> = OnceLock::new();
    static VAR_RE: OnceLock<Regex> = OnceLock::new();
    // Safety: these regex literals are guaranteed to compile
    let literal = LITERAL_RE.get_or_init(|| Regex::new(r#""[^"]*"|'[^']*'"#).unwrap());
    let var = VAR_RE.get_or_init(|| {
        Regex::new(r"\$(?:\{([^}]*)\}([A-Za-z_][\w.\-]*)|([A-Za-z_][\w.\-]*)(?::([A-Za-z_][\w.\-]*))?)").unwrap()
    });

    let stripped = literal.replace_all(expression, " ");
    let mut names: Vec<QName> = Vec::new();
    for cap in var.captures_iter(&stripped) {
        let qname = match (cap.get(1), cap.get(2), cap.get(3), cap.get(4)) {
            (Some(ns), Some(local), _, _) => QName::new(ns.as_str(), local.as_str()),
            (_, _, Some(prefix), Some(local)) => {
                let ns = namespaces.get(prefix.as_str()).cloned().unwrap_or_else(|| prefix.as_str().to_string());
                QName::new(ns, local.as_str())
            }
            (_, _, Some(local), None) => QName::local(local.as_str()),
            _ => continue,
        };
        if !names.contains(&qname) {
            names.push(qname);
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_plain_and_prefixed_references() {
        let mut ns = BTreeMap::new();
        ns.insert("eg".to_string(), "http://example.com".to_string());

        let refs = scan_variable_references("$gross - $eg:tax + $gross * 2", &ns);
        assert_eq!(refs, vec![QName::local("gross"), QName::new("http://example.com", "tax")]);
    }

    #[test]
    fn test_scan_skips_string_literals_and_accepts_clark() {
        let refs = scan_variable_references("concat('$notVar', ${urn:x}rate)", &BTreeMap::new());
        assert_eq!(refs, vec![QName::new("urn:x", "rate")]);
    }

    #[test]
    fn test_scan_no_references() {
        assert!(scan_variable_references("1 + 2", &BTreeMap::new()).is_empty());
    }
}
