//! value.rs
//! Atomic values exchanged with the expression evaluator.

use crate::store::{Fact, QName};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const XS_NS: &str = "http://www.w3.org/2001/XMLSchema";

/// A value bound to a variable or parameter, or returned by an expression.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Value {
    Empty,
    Boolean(bool),
    Integer(i64),
    Decimal(Decimal),
    Double(f64),
    String(String),
    QName(QName),
    /// A fact bound by a fact variable; its value is the fact's content.
    Fact(Box<Fact>),
    Sequence(Vec<Value>),
}

impl Value {
    pub fn fact(fact: &Fact) -> Self { Value::Fact(Box::new(fact.clone())) }

    /// XPath effective boolean value.
    pub fn effective_boolean(&self) -> bool {
        match self {
            Value::Empty => false,
            Value::Boolean(b) => *b,
            Value::Integer(i) => *i != 0,
            Value::Decimal(d) => !d.is_zero(),
            Value::Double(d) => *d != 0.0 && !d.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::QName(_) | Value::Fact(_) => true,
            Value::Sequence(items) => match items.as_slice() {
                [] => false,
                [single] => single.effective_boolean(),
                _ => true,
            },
        }
    }

    pub fn is_numeric(&self) -> bool {
        match self {
            Value::Integer(_) | Value::Decimal(_) | Value::Double(_) => true,
            Value::Fact(f) => f.is_numeric(),
            Value::Sequence(items) if items.len() == 1 => items[0].is_numeric(),
            _ => false,
        }
    }

    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Value::Integer(i) => Some(Decimal::from(*i)),
            Value::Decimal(d) => Some(*d),
            Value::Double(d) => Decimal::try_from(*d).ok(),
            Value::String(s) => parse_decimal(s),
            Value::Fact(f) => parse_decimal(&f.value),
            Value::Sequence(items) if items.len() == 1 => items[0].as_decimal(),
            _ => None,
        }
    }

    pub fn as_fact(&self) -> Option<&Fact> {
        match self {
            Value::Fact(f) => Some(f),
            _ => None,
        }
    }

    /// Items of a sequence, or the value itself as a single item. `Empty` has none.
    pub fn into_items(self) -> Vec<Value> {
        match self {
            Value::Empty => Vec::new(),
            Value::Sequence(items) => items,
            other => vec![other],
        }
    }

    /// Lexical form used when the value becomes fact content.
    pub fn lexical(&self) -> String {
        match self {
            Value::Empty => String::new(),
            Value::Boolean(b) => b.to_string(),
            Value::Integer(i) => i.to_string(),
            Value::Decimal(d) => d.normalize().to_string(),
            Value::Double(d) => d.to_string(),
            Value::String(s) => s.clone(),
            Value::QName(q) => q.clark(),
            Value::Fact(f) => f.value.clone(),
            Value::Sequence(items) => items.iter().map(Value::lexical).collect::<Vec<_>>().join(" "),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.lexical()) }
}

pub fn parse_decimal(s: &str) -> Option<Decimal> {
    let s = s.trim();
    Decimal::from_str(s).ok().or_else(|| Decimal::from_scientific(s).ok())
}

/// The declared (`as`) type of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum XsType {
    String,
    Boolean,
    Integer,
    Decimal,
    Double,
    QName,
    Date,
    AnyUri,
}

impl XsType {
    /// Accepts `xs:decimal`, `{http://www.w3.org/2001/XMLSchema}decimal` or `decimal`.
    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim();
        let local = if let Some(rest) = name.strip_prefix(&format!("{{{}}}", XS_NS)) {
            rest
        } else if let Some((_, local)) = name.split_once(':') {
            local
        } else {
            name
        };
        match local {
            "string" | "normalizedString" | "token" => Some(XsType::String),
            "boolean" => Some(XsType::Boolean),
            "integer" | "int" | "long" | "short" | "nonNegativeInteger" | "positiveInteger" => Some(XsType::Integer),
            "decimal" => Some(XsType::Decimal),
            "double" | "float" => Some(XsType::Double),
            "QName" => Some(XsType::QName),
            "date" => Some(XsType::Date),
            "anyURI" => Some(XsType::AnyUri),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            XsType::String => "xs:string",
            XsType::Boolean => "xs:boolean",
            XsType::Integer => "xs:integer",
            XsType::Decimal => "xs:decimal",
            XsType::Double => "xs:double",
            XsType::QName => "xs:QName",
            XsType::Date => "xs:date",
            XsType::AnyUri => "xs:anyURI",
        }
    }

    /// Casts a lexical value to this type.
    pub fn coerce(&self, lexical: &str) -> Result<Value, String> {
        let s = lexical.trim();
        let fail = || format!("'{}' is not a valid {}", lexical, self.name());
        match self {
            XsType::String | XsType::AnyUri => Ok(Value::String(lexical.to_string())),
            XsType::Boolean => match s {
                "true" | "1" => Ok(Value::Boolean(true)),
                "false" | "0" => Ok(Value::Boolean(false)),
                _ => Err(fail()),
            },
            XsType::Integer => s.parse::<i64>().map(Value::Integer).map_err(|_| fail()),
            XsType::Decimal => Decimal::from_str(s).map(Value::Decimal).map_err(|_| fail()),
            XsType::Double => match s {
                "INF" => Ok(Value::Double(f64::INFINITY)),
                "-INF" => Ok(Value::Double(f64::NEG_INFINITY)),
                "NaN" => Ok(Value::Double(f64::NAN)),
                _ => s.parse::<f64>().map(Value::Double).map_err(|_| fail()),
            },
            XsType::QName => QName::parse_clark(s).map(Value::QName).ok_or_else(fail),
            XsType::Date => {
                if is_date(s) { Ok(Value::String(s.to_string())) } else { Err(fail()) }
            }
        }
    }

    /// Checks an evaluated value against this type, casting where XPath would promote.
    pub fn check(&self, value: &Value) -> Result<Value, String> {
        match (self, value) {
            (XsType::Boolean, Value::Boolean(_))
            | (XsType::Integer, Value::Integer(_))
            | (XsType::Decimal, Value::Decimal(_))
            | (XsType::Double, Value::Double(_))
            | (XsType::QName, Value::QName(_)) => Ok(value.clone()),
            (XsType::Decimal, Value::Integer(i)) => Ok(Value::Decimal(Decimal::from(*i))),
            (XsType::Double, Value::Integer(i)) => Ok(Value::Double(*i as f64)),
            (XsType::Double, Value::Decimal(d)) => d.to_string().parse::<f64>().map(Value::Double).map_err(|e| e.to_string()),
            (XsType::Integer, Value::Decimal(d)) if d.fract().is_zero() => {
                d.trunc().to_string().parse::<i64>().map(Value::Integer).map_err(|e| e.to_string())
            }
            (_, Value::String(s)) => self.coerce(s),
            (_, Value::Fact(f)) => self.coerce(&f.value),
            (_, Value::Sequence(items)) if items.len() == 1 => self.check(&items[0]),
            _ => Err(format!("value '{}' is not a {}", value, self.name())),
        }
    }
}

fn is_date(s: &str) -> bool {
    let body = s.strip_prefix('-').unwrap_or(s);
    let date = body.get(..10).unwrap_or("");
    let parts: Vec<&str> = date.split('-').collect();
    parts.len() == 3
        && parts[0].len() == 4
        && parts[1].len() == 2
        && parts[2].len() == 2
        && parts.iter().all(|p| p.chars().all(|c| c.is_ascii_digit()))
        && matches!(parts[1].parse::<u32>(), Ok(1..=12))
        && matches!(parts[2].parse::<u32>(), Ok(1..=31))
}
