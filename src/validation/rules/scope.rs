//! Compatibility rules for the two ends of a variables-scope link.

use crate::diagnostics::{Diagnostic, ErrorCode};
use crate::variables::VariableSet;
use std::mem::discriminant;

fn report(code: ErrorCode, consumer: &VariableSet, donor: &VariableSet, detail: String) -> Diagnostic {
    Diagnostic::new(code, format!("Scope link from '{}' to '{}': {}", donor.label(), consumer.label(), detail))
        .with("variableSet", consumer.label())
        .with("donor", donor.label())
}

pub(crate) fn validate_kind(consumer: &VariableSet, donor: &VariableSet) -> Option<Diagnostic> {
    if discriminant(&consumer.kind) == discriminant(&donor.kind) {
        return None;
    }
    let detail = format!("{} cannot depend on {}", consumer.kind.name(), donor.kind.name());
    Some(report(ErrorCode::DifferentVariableSetTypes, consumer, donor, detail))
}

pub(crate) fn validate_aspect_model(consumer: &VariableSet, donor: &VariableSet) -> Option<Diagnostic> {
    if consumer.aspect_model == donor.aspect_model {
        return None;
    }
    let detail = format!("aspect models differ ({} vs {})", consumer.aspect_model, donor.aspect_model);
    Some(report(ErrorCode::DifferentAspectModels, consumer, donor, detail))
}

pub(crate) fn validate_instance(consumer: &VariableSet, donor: &VariableSet) -> Option<Diagnostic> {
    if consumer.instance == donor.instance {
        return None;
    }
    let detail = format!("target instances differ ({} vs {})", consumer.instance, donor.instance);
    Some(report(ErrorCode::DifferentInstances, consumer, donor, detail))
}
