//! equality.rs
//! Context, unit and value equality with numeric tolerance.

use crate::analysis::MeasureSet;
use crate::computation::value::parse_decimal;
use crate::store::{Context, Fact, Precision, XbrlUnit};
use rust_decimal::Decimal;

/// Structural context equality; the `id` is not compared.
pub fn context_equal(a: &Context, b: &Context) -> bool {
    a.entity == b.entity
        && a.period == b.period
        && a.dimensions == b.dimensions
        && a.segment == b.segment
        && a.scenario == b.scenario
}

/// Units are equal when they reduce to the same measures. Two missing units are equal.
pub fn unit_equal(a: Option<&XbrlUnit>, b: Option<&XbrlUnit>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => MeasureSet::from_unit(a) == MeasureSet::from_unit(b),
        _ => false,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tolerance {
    Exact,
    /// Half a unit in the last significant place: `10^-d / 2`.
    Decimals(i32),
    Absolute(Decimal),
    /// Fraction of the magnitude of the derived value.
    Proportional(Decimal),
}

impl Tolerance {
    /// `None` means the values must match exactly.
    pub fn radius(&self, derived: Decimal) -> Option<Decimal> {
        match self {
            Tolerance::Exact => None,
            Tolerance::Decimals(d) => half_unit(*d),
            Tolerance::Absolute(r) => Some(r.abs()),
            // A radius beyond the representable range accepts any difference.
            Tolerance::Proportional(p) => Some(p.checked_mul(derived).map_or(Decimal::MAX, |r| r.abs())),
        }
    }
}

/// `10^-d / 2`, written as `5 * 10^-(d+1)`. Past the last representable
/// place the comparison is exact.
fn half_unit(decimals: i32) -> Option<Decimal> {
    let exp = decimals.checked_add(1)?;
    if exp >= 0 {
        Some(Decimal::new(5, exp.min(28) as u32))
    } else {
        let mut r = Decimal::from(5);
        for _ in 0..exp.unsigned_abs().min(28) {
            r = r.checked_mul(Decimal::TEN)?;
        }
        Some(r)
    }
}

/// Decimals implied by a precision attribute for the given value.
///
/// `precision` counts significant digits, so the decimals are `p - (m + 1)`
/// where `m` is the power of ten of the leading digit. Zero carries no
/// magnitude and compares exactly.
pub fn precision_to_decimals(precision: Precision, value: &str) -> Precision {
    let Precision::Finite(p) = precision else { return Precision::Infinite };
    let Some(v) = parse_decimal(value) else { return Precision::Infinite };
    if v.is_zero() {
        return Precision::Infinite;
    }
    let v = v.abs();
    let mut magnitude = 0i32;
    let mut probe = v;
    while probe >= Decimal::TEN {
        probe /= Decimal::TEN;
        magnitude += 1;
    }
    while probe < Decimal::ONE {
        probe *= Decimal::TEN;
        magnitude -= 1;
    }
    Precision::Finite(p.saturating_sub(magnitude + 1))
}

fn effective_decimals(fact: &Fact) -> Option<Precision> {
    match (fact.decimals, fact.precision) {
        (Some(d), _) => Some(d),
        (None, Some(p)) => Some(precision_to_decimals(p, &fact.value)),
        (None, None) => None,
    }
}

/// Tolerance from the lesser of the two facts' accuracies. `INF` on both
/// sides, or no accuracy at all, compares exactly.
pub fn tolerance_for(a: &Fact, b: &Fact) -> Tolerance {
    let lesser = match (effective_decimals(a), effective_decimals(b)) {
        (Some(Precision::Finite(x)), Some(Precision::Finite(y))) => Some(x.min(y)),
        (Some(Precision::Finite(x)), _) | (_, Some(Precision::Finite(x))) => Some(x),
        _ => None,
    };
    lesser.map_or(Tolerance::Exact, Tolerance::Decimals)
}

/// Numeric comparison within `tolerance` when both sides are numbers,
/// otherwise whitespace-trimmed lexical equality.
pub fn value_equal(derived: &str, existing: &str, tolerance: Tolerance) -> bool {
    match (parse_decimal(derived), parse_decimal(existing)) {
        (Some(a), Some(b)) => match tolerance.radius(a) {
            None => a == b,
            // A difference that overflows is never within tolerance.
            Some(r) => a.checked_sub(b).is_some_and(|d| d.abs() <= r),
        },
        _ => derived.trim() == existing.trim(),
    }
}
