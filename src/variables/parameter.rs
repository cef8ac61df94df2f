use crate::computation::value::{Value, XsType};
use crate::store::QName;
use serde::Serialize;

/// A named scalar input. Parameters may reference other parameters, never variables.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Parameter {
    pub name: QName,
    pub label: String,
    pub select: Option<String>,
    pub required: bool,
    pub as_type: Option<XsType>,
    /// Filled in by the parameter resolver.
    pub result: Option<Value>,
}

impl Parameter {
    pub fn new(name: QName, label: impl Into<String>) -> Self {
        Self { name, label: label.into(), select: None, required: false, as_type: None, result: None }
    }

    pub fn with_select(mut self, select: impl Into<String>) -> Self {
        self.select = Some(select.into());
        self
    }

    pub fn is_resolved(&self) -> bool { self.result.is_some() }
}
