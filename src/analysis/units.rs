// src/analysis/units.rs

use crate::store::{QName, XbrlUnit};
use std::collections::BTreeMap;
use std::fmt;

/// Largest exponent a unit rule may give one measure.
const MAX_EXPONENT: i32 = 64;

/// A unit reduced to measure exponents, e.g. `USD/shares` -> { USD: 1, shares: -1 }.
///
/// Two units are equal when their reduced forms are equal, so `USD*shares/shares`
/// equals `USD` and measure order does not matter.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MeasureSet {
    terms: BTreeMap<QName, i32>,
}

impl MeasureSet {
    pub fn from_unit(unit: &XbrlUnit) -> Self {
        let mut terms = BTreeMap::new();
        for m in &unit.numerator { *terms.entry(m.clone()).or_insert(0) += 1; }
        for m in &unit.denominator { *terms.entry(m.clone()).or_insert(0) -= 1; }
        Self { terms }.reduced()
    }

    // Cancelled measures must not survive as zero exponents, or equality breaks.
    fn reduced(mut self) -> Self {
        self.terms.retain(|_, v| *v != 0);
        self
    }

    /// Parses a unit rule such as `{ns}USD*{ns}EUR/{ns}shares`. Clark
    /// namespaces may contain `/` and `*`, so splitting ignores braced text.
    pub fn parse(s: &str) -> Result<Self, ()> {
        if s.trim().is_empty() { return Err(()); }

        let mut terms = BTreeMap::new();
        let parts = split_outside_braces(s, '/');
        if parts.len() > 2 { return Err(()); } // Multiple slashes

        Self::parse_product(parts[0], 1, &mut terms)?;
        if let Some(den) = parts.get(1) { Self::parse_product(den, -1, &mut terms)?; }

        Ok(Self { terms }.reduced())
    }

    fn parse_product(s: &str, sign: i32, terms: &mut BTreeMap<QName, i32>) -> Result<(), ()> {
        if s.trim().is_empty() || s.trim() == "1" { return Ok(()); }
        for factor in split_outside_braces(s, '*') {
            let (base, exp) = match factor.rfind('^') {
                Some(i) if i > factor.rfind('}').unwrap_or(0) => {
                    (&factor[..i], factor[i + 1..].trim().parse::<i32>().map_err(|_| ())?)
                }
                _ => (factor, 1),
            };
            let measure = QName::parse_clark(base).ok_or(())?;
            let term = terms.entry(measure).or_insert(0);
            *term = exp.checked_mul(sign).and_then(|e| term.checked_add(e)).ok_or(())?;
            if term.unsigned_abs() > MAX_EXPONENT as u32 { return Err(()); }
        }
        Ok(())
    }

    pub fn numerator(&self) -> Vec<QName> { self.expand(|v| v > 0) }
    pub fn denominator(&self) -> Vec<QName> { self.expand(|v| v < 0) }

    fn expand(&self, side: impl Fn(i32) -> bool) -> Vec<QName> {
        self.terms
            .iter()
            .filter(|&(_, &v)| side(v))
            .flat_map(|(k, &v)| std::iter::repeat(k.clone()).take(v.unsigned_abs() as usize))
            .collect()
    }

    pub fn to_unit(&self, id: impl Into<String>) -> XbrlUnit {
        XbrlUnit { id: id.into(), numerator: self.numerator(), denominator: self.denominator() }
    }
}

impl fmt::Display for MeasureSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (num, den): (Vec<_>, Vec<_>) = self.terms.iter().filter(|&(_, &v)| v != 0).partition(|&(_, &v)| v > 0);

        let fmt_side = |terms: Vec<(&QName, &i32)>| -> String {
            if terms.is_empty() { return "1".to_string(); }
            terms.into_iter().map(|(k, v)| if v.abs() == 1 { k.clark() } else { format!("{}^{}", k.clark(), v.abs()) }).collect::<Vec<_>>().join("*")
        };

        let n_str = fmt_side(num);
        let d_str = fmt_side(den);
        if d_str == "1" { f.write_str(&n_str) } else { write!(f, "{}/{}", n_str, d_str) }
    }
}

fn split_outside_braces(s: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            c if c == sep && depth == 0 => {
                parts.push(s[start..i].trim());
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(s[start..].trim());
    parts
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const ISO: &str = "http://www.xbrl.org/2003/iso4217";
    const XBRLI: &str = "http://www.xbrl.org/2003/instance";

    #[rstest]
    #[case("{http://www.xbrl.org/2003/iso4217}USD", "{http://www.xbrl.org/2003/iso4217}USD")]
    #[case("{http://www.xbrl.org/2003/iso4217}USD/{http://www.xbrl.org/2003/instance}shares", "{http://www.xbrl.org/2003/iso4217}USD/{http://www.xbrl.org/2003/instance}shares")]
    #[case("m*m", "m^2")]
    #[case("m^2/m", "m")]
    #[case("1/s", "1/s")]
    fn test_parse_and_canonicalize(#[case] input: &str, #[case] expected: &str) {
        let parsed = MeasureSet::parse(input).expect("Failed to parse");
        assert_eq!(parsed.to_string(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("a/b/c")]
    #[case("m^x")]
    #[case("{unterminated")]
    #[case("{x}USD/{x}shares^-2147483648")]
    #[case("{x}USD^2000000000")]
    #[case("m^2147483647*m")]
    #[case("m^40*m^40")]
    fn test_parse_invalid(#[case] input: &str) {
        assert!(MeasureSet::parse(input).is_err(), "Should fail: '{}'", input);
    }

    #[test]
    fn test_unit_equality_ignores_order_and_cancels() {
        let usd = QName::new(ISO, "USD");
        let shares = QName::new(XBRLI, "shares");
        let a = XbrlUnit { id: "u1".into(), numerator: vec![usd.clone(), shares.clone()], denominator: vec![shares.clone()] };
        let b = XbrlUnit::simple("u2", usd.clone());
        assert_eq!(MeasureSet::from_unit(&a), MeasureSet::from_unit(&b));

        let per_share = MeasureSet::parse(&format!("{}/{}", usd.clark(), shares.clark())).unwrap();
        let unit = per_share.to_unit("u4");
        assert_eq!(unit.numerator, vec![usd]);
        assert_eq!(unit.denominator, vec![shares]);
    }
}
