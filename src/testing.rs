//! A stand-in expression evaluator for unit tests.

use crate::computation::value::parse_decimal;
use crate::computation::{Bindings, EvaluationError, ExpressionEvaluator, Value};
use crate::store::QName;
use std::collections::HashMap;

type Script = Box<dyn Fn(&Bindings) -> Result<Value, EvaluationError>>;

/// Answers expressions registered with `on`, and otherwise understands
/// `true()`, `false()`, `fail()`, number and quoted string literals, and a
/// lone `$name` reference. Anything else is an evaluation error.
#[derive(Default)]
pub struct ScriptedEvaluator {
    scripts: HashMap<String, Script>,
}

impl ScriptedEvaluator {
    pub fn new() -> Self { Self::default() }

    pub fn on(mut self, expression: &str, script: impl Fn(&Bindings) -> Result<Value, EvaluationError> + 'static) -> Self {
        self.scripts.insert(expression.to_string(), Box::new(script));
        self
    }
}

impl ExpressionEvaluator for ScriptedEvaluator {
    fn evaluate(&self, expression: &str, bindings: &Bindings) -> Result<Value, EvaluationError> {
        if let Some(script) = self.scripts.get(expression) {
            return script(bindings);
        }

        let expr = expression.trim();
        match expr {
            "true()" => return Ok(Value::Boolean(true)),
            "false()" => return Ok(Value::Boolean(false)),
            "fail()" => return Err(EvaluationError::expression(expr, "scripted failure")),
            _ => {}
        }
        if let Ok(i) = expr.parse::<i64>() {
            return Ok(Value::Integer(i));
        }
        if let Some(d) = parse_decimal(expr) {
            return Ok(Value::Decimal(d));
        }
        for quote in ['\'', '"'] {
            if let Some(s) = expr.strip_prefix(quote).and_then(|s| s.strip_suffix(quote)) {
                return Ok(Value::String(s.to_string()));
            }
        }
        if let Some(name) = expr.strip_prefix('$').and_then(QName::parse_clark) {
            return bindings.require(&name).cloned();
        }
        Err(EvaluationError::expression(expr, "no script for expression"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_forms() {
        let eval = ScriptedEvaluator::new().on("$a + 1", |_| Ok(Value::Integer(2)));
        let mut b = Bindings::new();
        b.bind(QName::local("a"), Value::Integer(1));

        assert_eq!(eval.evaluate("$a + 1", &b).unwrap(), Value::Integer(2));
        assert_eq!(eval.evaluate("$a", &b).unwrap(), Value::Integer(1));
        assert_eq!(eval.evaluate("'x'", &b).unwrap(), Value::String("x".into()));
        assert!(eval.evaluate("fail()", &b).is_err());
        assert!(eval.evaluate("$missing", &b).is_err());
        assert!(eval.evaluate("1 +", &b).is_err());
    }
}
