//! binding.rs
//! Enumerates binding combinations for a variable set and evaluates its body for each.
//!
//! Variables are bound in `variable_order`. Each variable yields zero or more
//! alternatives given the values bound so far; the body runs once per complete
//! combination that passes every precondition.

use super::context::EvaluationEnv;
use super::evaluator::{Bindings, EvaluationError};
use super::ledger::{EvaluationOutcome, EvaluationResult, GeneratedFacts};
use super::value::Value;
use crate::analysis::MeasureSet;
use crate::store::{Context, Fact, Precision, QName, XbrlUnit};
use crate::variables::{
    aspect_values, Aspect, FactVariable, FactView, Filter, FormulaRules, GeneralVariable, ScopeVariable, Variable,
    VariableSet, VariableSetKind,
};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, trace};

#[derive(Debug, Clone)]
struct BoundFact {
    fact: Fact,
    context: Option<Context>,
    unit: Option<XbrlUnit>,
}

impl BoundFact {
    fn from_view(view: &FactView<'_>) -> Self {
        Self { fact: view.fact.clone(), context: view.context.cloned(), unit: view.unit.cloned() }
    }

    fn view(&self) -> FactView<'_> {
        FactView { fact: &self.fact, context: self.context.as_ref(), unit: self.unit.as_ref() }
    }
}

/// What one variable contributes to one combination.
#[derive(Debug, Clone, Default)]
struct Alternative {
    values: Vec<(QName, Value)>,
    /// Facts bound by a fact variable; these take part in implicit filtering.
    facts: Vec<BoundFact>,
    /// Facts received through a scope variable; usable as a formula source only.
    scope_facts: Vec<BoundFact>,
}

#[derive(Debug, Clone, Default)]
struct Frame {
    bindings: Bindings,
    facts: BTreeMap<QName, Vec<BoundFact>>,
    scope_facts: BTreeMap<QName, Vec<BoundFact>>,
}

impl Frame {
    fn apply(&self, name: &QName, alternative: Alternative) -> Frame {
        let mut next = self.clone();
        for (n, v) in alternative.values {
            next.bindings.bind(n, v);
        }
        if !alternative.facts.is_empty() {
            next.facts.insert(name.clone(), alternative.facts);
        }
        if !alternative.scope_facts.is_empty() {
            next.scope_facts.insert(name.clone(), alternative.scope_facts);
        }
        next
    }
}

struct Binder<'s, 'e> {
    set: &'s VariableSet,
    env: &'e EvaluationEnv<'e>,
    generated: &'s mut Option<GeneratedFacts>,
    results: Vec<EvaluationResult>,
    evaluations: usize,
}

impl VariableSet {
    /// Evaluates every binding combination and stores the results.
    ///
    /// Returns `Ok(false)` when an assertion failed for some combination. On
    /// error the set keeps no results and anything it wrote to the attached
    /// accumulator is rolled back.
    pub fn evaluate(&mut self, env: &EvaluationEnv<'_>) -> Result<bool, EvaluationError> {
        self.results.clear();
        if matches!(self.kind, VariableSetKind::ConsistencyAssertion(_)) {
            // Checked against the target formulas' output after the pass.
            return Ok(true);
        }

        let mut generated = self.generated_facts.take();
        let checkpoint = generated.as_ref().map(GeneratedFacts::checkpoint);

        let outcome = {
            let mut binder = Binder { set: &*self, env, generated: &mut generated, results: Vec::new(), evaluations: 0 };
            binder.run().map(|_| binder.results)
        };

        match outcome {
            Ok(results) => {
                self.generated_facts = generated;
                self.results = results;
                debug!(variable_set = %self.key, results = self.results.len(), "variable set evaluated");
                Ok(self.failed_count() == 0)
            }
            Err(e) => {
                if let (Some(gen), Some(cp)) = (generated.as_mut(), checkpoint) {
                    gen.rollback(cp);
                }
                self.generated_facts = generated;
                Err(e)
            }
        }
    }
}

impl<'s, 'e> Binder<'s, 'e> {
    fn run(&mut self) -> Result<(), EvaluationError> {
        let mut frame = Frame::default();
        for (name, parameter) in &self.set.parameters {
            if let Some(value) = &parameter.result {
                frame.bindings.bind(name.clone(), value.clone());
            }
        }

        self.bind(0, &frame)?;

        if matches!(self.set.kind, VariableSetKind::ExistenceAssertion) {
            let outcome = if self.evaluations > 0 { EvaluationOutcome::Passed } else { EvaluationOutcome::Failed };
            self.results.push(EvaluationResult { bindings: BTreeMap::new(), bound_facts: BTreeMap::new(), outcome });
        }
        Ok(())
    }

    fn bind(&mut self, depth: usize, frame: &Frame) -> Result<(), EvaluationError> {
        let set = self.set;
        let Some(name) = set.variable_order.get(depth) else {
            return self.leaf(frame);
        };
        let Some(variable) = set.variables.get(name) else {
            return self.bind(depth + 1, frame);
        };

        let alternatives = match variable {
            Variable::Fact(v) => self.fact_alternatives(name, v, frame)?,
            Variable::General(v) => self.general_alternatives(name, v, frame)?,
            Variable::Scope(v) => scope_alternatives(name, v),
        };
        trace!(variable = %name, alternatives = alternatives.len(), "bound variable");

        for alternative in alternatives {
            let next = frame.apply(name, alternative);
            self.bind(depth + 1, &next)?;
        }
        Ok(())
    }

    fn fact_alternatives(&self, name: &QName, var: &FactVariable, frame: &Frame) -> Result<Vec<Alternative>, EvaluationError> {
        let instance = self
            .env
            .instances
            .get(&var.instance)
            .ok_or_else(|| EvaluationError::UnknownInstance(var.instance.clone()))?;
        let model = self.set.aspect_model;
        let covered: BTreeSet<Aspect> = var.filters.iter().flat_map(Filter::covered_aspects).collect();
        let prior: Vec<BTreeMap<Aspect, String>> = if self.set.implicit_filtering {
            frame.facts.values().flatten().map(|b| aspect_values(&b.view(), model)).collect()
        } else {
            Vec::new()
        };

        let mut matched = Vec::new();
        'facts: for fact in &instance.facts {
            if fact.nil && !var.nils {
                continue;
            }
            let view = FactView::in_instance(fact, instance);
            for filter in var.filters.iter().chain(&self.set.group_filters) {
                if !filter.accepts(&view, self.env.evaluator, &frame.bindings)? {
                    continue 'facts;
                }
            }
            if !prior.is_empty() {
                let own = aspect_values(&view, model);
                if !prior.iter().all(|p| uncovered_aspects_match(&own, p, &covered)) {
                    continue;
                }
            }
            matched.push(BoundFact::from_view(&view));
        }

        if matched.is_empty() {
            return self.fallback(name, var, frame);
        }
        if var.bind_as_sequence {
            let value = Value::Sequence(matched.iter().map(|b| Value::fact(&b.fact)).collect());
            return Ok(vec![Alternative { values: vec![(name.clone(), value)], facts: matched, ..Default::default() }]);
        }
        Ok(matched
            .into_iter()
            .map(|b| Alternative { values: vec![(name.clone(), Value::fact(&b.fact))], facts: vec![b], ..Default::default() })
            .collect())
    }

    /// With no fallback value, an unmatched variable yields no combinations.
    fn fallback(&self, name: &QName, var: &FactVariable, frame: &Frame) -> Result<Vec<Alternative>, EvaluationError> {
        match &var.fallback {
            None => Ok(Vec::new()),
            Some(expr) => {
                let value = self.env.evaluator.evaluate(expr, &frame.bindings)?;
                Ok(vec![Alternative { values: vec![(name.clone(), value)], ..Default::default() }])
            }
        }
    }

    fn general_alternatives(&self, name: &QName, var: &GeneralVariable, frame: &Frame) -> Result<Vec<Alternative>, EvaluationError> {
        let value = self.env.evaluator.evaluate(&var.select, &frame.bindings)?;
        if var.bind_as_sequence {
            return Ok(vec![Alternative { values: vec![(name.clone(), value)], ..Default::default() }]);
        }
        Ok(value
            .into_items()
            .into_iter()
            .map(|item| Alternative { values: vec![(name.clone(), item)], ..Default::default() })
            .collect())
    }

    fn leaf(&mut self, frame: &Frame) -> Result<(), EvaluationError> {
        let set = self.set;
        for precondition in &set.preconditions {
            if !self.env.evaluator.evaluate(&precondition.test, &frame.bindings)?.effective_boolean() {
                trace!(precondition = %precondition.label, "precondition not met");
                return Ok(());
            }
        }
        self.evaluations += 1;

        let outcome = match &set.kind {
            VariableSetKind::Formula(rules) => EvaluationOutcome::Generated(self.produce(rules, frame)?),
            VariableSetKind::ValueAssertion { test } => {
                if self.env.evaluator.evaluate(test, &frame.bindings)?.effective_boolean() {
                    EvaluationOutcome::Passed
                } else {
                    EvaluationOutcome::Failed
                }
            }
            VariableSetKind::ExistenceAssertion | VariableSetKind::ConsistencyAssertion(_) => return Ok(()),
        };

        let bindings = frame
            .bindings
            .variables
            .iter()
            .filter(|(n, _)| !set.parameters.contains_key(*n))
            .map(|(n, v)| (n.clone(), v.clone()))
            .collect();
        let bound_facts = frame
            .facts
            .iter()
            .map(|(n, facts)| (n.clone(), facts.iter().map(|b| b.fact.clone()).collect()))
            .collect();
        self.results.push(EvaluationResult { bindings, bound_facts, outcome });
        Ok(())
    }

    /// Builds the output fact from the aspect rules and the source fact.
    fn produce(&mut self, rules: &FormulaRules, frame: &Frame) -> Result<Fact, EvaluationError> {
        let label = self.set.label().to_string();
        let value = self.env.evaluator.evaluate(&rules.value, &frame.bindings)?;
        let source = self.source_fact(rules, frame);

        let concept = rules
            .concept
            .clone()
            .or_else(|| source.map(|s| s.fact.concept.clone()))
            .ok_or_else(|| EvaluationError::MissingConcept(label.clone()))?;
        let source = source.ok_or_else(|| EvaluationError::MissingSource(label.clone()))?;
        let context = source.context.clone().ok_or_else(|| EvaluationError::MissingSource(label.clone()))?;

        let unit = match &rules.unit {
            Some(expr) => {
                let measures = MeasureSet::parse(expr)
                    .map_err(|_| EvaluationError::Type(format!("invalid unit rule '{}' in formula {}", expr, label)))?;
                Some(measures.to_unit("u"))
            }
            None => source.unit.clone(),
        };

        let mut fact = Fact::new(concept, context.id.clone(), value.lexical());
        fact.nil = matches!(value, Value::Empty);
        if unit.is_some() && !fact.nil {
            fact.decimals = self.accuracy(rules.decimals.as_deref(), frame)?;
            fact.precision = self.accuracy(rules.precision.as_deref(), frame)?;
        }

        let generated = self.generated.get_or_insert_with(GeneratedFacts::new);
        Ok(generated.add_fact(fact, &context, unit.as_ref()))
    }

    /// The explicit source variable's fact, otherwise the first fact bound in variable order.
    fn source_fact<'f>(&self, rules: &FormulaRules, frame: &'f Frame) -> Option<&'f BoundFact> {
        let lookup = |name: &QName| {
            frame.facts.get(name).and_then(|f| f.first()).or_else(|| frame.scope_facts.get(name).and_then(|f| f.first()))
        };
        match &rules.source {
            Some(name) => lookup(name),
            None => self.set.variable_order.iter().find_map(lookup),
        }
    }

    fn accuracy(&self, expr: Option<&str>, frame: &Frame) -> Result<Option<Precision>, EvaluationError> {
        let Some(expr) = expr else { return Ok(None) };
        let value = self.env.evaluator.evaluate(expr, &frame.bindings)?;
        if let Some(p) = Precision::parse(&value.lexical()) {
            return Ok(Some(p));
        }
        value
            .as_decimal()
            .and_then(|d| d.trunc().to_string().parse::<i32>().ok())
            .map(|d| Some(Precision::Finite(d)))
            .ok_or_else(|| EvaluationError::expression(expr, format!("'{}' is not a valid accuracy", value)))
    }
}

fn scope_alternatives(name: &QName, var: &ScopeVariable) -> Vec<Alternative> {
    let Some(bindings) = &var.bindings else {
        // Unreplaced placeholder: contributes nothing but does not block evaluation.
        return vec![Alternative::default()];
    };
    bindings
        .iter()
        .map(|b| {
            let mut values: Vec<(QName, Value)> = b.donor_bindings.iter().map(|(n, v)| (n.clone(), v.clone())).collect();
            values.push((name.clone(), b.output.clone()));
            let scope_facts = match &b.output {
                Value::Fact(f) => vec![BoundFact { fact: (**f).clone(), context: b.context.clone(), unit: b.unit.clone() }],
                _ => Vec::new(),
            };
            Alternative { values, facts: Vec::new(), scope_facts }
        })
        .collect()
}

/// Implicit filtering: every aspect the candidate's variable does not cover
/// must have the same value on the candidate and on an already bound fact.
fn uncovered_aspects_match(candidate: &BTreeMap<Aspect, String>, bound: &BTreeMap<Aspect, String>, covered: &BTreeSet<Aspect>) -> bool {
    candidate
        .keys()
        .chain(bound.keys())
        .filter(|a| !covered.contains(*a))
        .all(|a| candidate.get(a) == bound.get(a))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{standard_input_instance, Entity, Instance, Period};
    use crate::testing::ScriptedEvaluator;
    use crate::variables::{FilterKind, Precondition, VariableSetKey};
    use rust_decimal::Decimal;

    fn input() -> BTreeMap<QName, Instance> {
        let mut inst = Instance::new(standard_input_instance());
        let entity = Entity { scheme: "http://x".into(), identifier: "E1".into() };
        inst.add_context(Context::new("y24", entity.clone(), Period::Instant("2024-12-31".into())));
        inst.add_context(Context::new("y23", entity, Period::Instant("2023-12-31".into())));
        inst.add_unit(XbrlUnit::simple("usd", QName::local("USD")));
        for (concept, ctx, v) in [("Gross", "y24", "100"), ("Tax", "y24", "30"), ("Gross", "y23", "80"), ("Tax", "y23", "20")] {
            inst.add_fact(Fact::new(QName::local(concept), ctx, v).with_unit("usd").with_decimals(Precision::Finite(0)));
        }
        BTreeMap::from([(inst.name.clone(), inst)])
    }

    fn concept_var(label: &str, concept: &str) -> Variable {
        Variable::Fact(FactVariable {
            label: label.into(),
            filters: vec![Filter::new(format!("{}-filter", label), FilterKind::ConceptName { concepts: vec![QName::local(concept)] })],
            instance: standard_input_instance(),
            bind_as_sequence: false,
            fallback: None,
            nils: false,
        })
    }

    fn net_formula() -> VariableSet {
        let rules = FormulaRules { value: "$gross - $tax".into(), source: Some(QName::local("gross")), ..Default::default() };
        let mut set = VariableSet::new(
            VariableSetKey::new("role", "net"),
            "f.xml#net",
            VariableSetKind::Formula(rules),
            crate::store::standard_output_instance(),
        );
        set.variables.insert(QName::local("gross"), concept_var("gross", "Gross"));
        set.variables.insert(QName::local("tax"), concept_var("tax", "Tax"));
        set.variable_order = vec![QName::local("gross"), QName::local("tax")];
        set
    }

    fn subtract() -> ScriptedEvaluator {
        ScriptedEvaluator::new().on("$gross - $tax", |b| {
            let g = b.require(&QName::local("gross"))?.as_decimal().unwrap_or_default();
            let t = b.require(&QName::local("tax"))?.as_decimal().unwrap_or_default();
            Ok(Value::Decimal(g - t))
        })
    }

    #[test]
    fn test_implicit_filtering_pairs_facts_by_period() {
        let instances = input();
        let evaluator = subtract();
        let env = EvaluationEnv { instances: &instances, evaluator: &evaluator };
        let mut set = net_formula();

        assert!(set.evaluate(&env).unwrap());
        assert_eq!(set.results.len(), 2);
        let gen = set.generated_facts.as_ref().unwrap();
        let values: Vec<&str> = gen.facts().iter().map(|f| f.value.as_str()).collect();
        assert_eq!(values, vec!["70", "60"]);
        assert_eq!(gen.facts()[0].concept, QName::local("Gross"));
        assert_eq!(gen.units().len(), 1);
    }

    #[test]
    fn test_without_implicit_filtering_every_pair_binds() {
        let instances = input();
        let evaluator = subtract();
        let env = EvaluationEnv { instances: &instances, evaluator: &evaluator };
        let mut set = net_formula();
        set.implicit_filtering = false;

        set.evaluate(&env).unwrap();
        assert_eq!(set.results.len(), 4);
    }

    #[test]
    fn test_precondition_and_value_assertion() {
        let instances = input();
        let evaluator = ScriptedEvaluator::new()
            .on("$gross gt 90", |b| Ok(Value::Boolean(b.require(&QName::local("gross"))?.as_decimal() > Some(Decimal::from(90)))))
            .on("$gross gt 85", |b| Ok(Value::Boolean(b.require(&QName::local("gross"))?.as_decimal() > Some(Decimal::from(85)))));
        let env = EvaluationEnv { instances: &instances, evaluator: &evaluator };

        let mut set = VariableSet::new(
            VariableSetKey::new("role", "va"),
            "a.xml#va",
            VariableSetKind::ValueAssertion { test: "$gross gt 90".into() },
            standard_input_instance(),
        );
        set.variables.insert(QName::local("gross"), concept_var("gross", "Gross"));
        set.variable_order = vec![QName::local("gross")];

        assert!(!set.evaluate(&env).unwrap());
        assert_eq!((set.passed_count(), set.failed_count()), (1, 1));

        set.preconditions.push(Precondition { label: "pc".into(), test: "$gross gt 85".into() });
        assert!(set.evaluate(&env).unwrap());
        assert_eq!(set.results.len(), 1);
    }

    #[test]
    fn test_existence_assertion_and_fallback() {
        let instances = input();
        let evaluator = ScriptedEvaluator::new();
        let env = EvaluationEnv { instances: &instances, evaluator: &evaluator };

        let mut set = VariableSet::new(
            VariableSetKey::new("role", "ea"),
            "a.xml#ea",
            VariableSetKind::ExistenceAssertion,
            standard_input_instance(),
        );
        set.variables.insert(QName::local("eq"), concept_var("eq", "Equity"));
        set.variable_order = vec![QName::local("eq")];
        assert!(!set.evaluate(&env).unwrap());

        if let Some(Variable::Fact(v)) = set.variables.get_mut(&QName::local("eq")) {
            v.fallback = Some("0".into());
        }
        assert!(set.evaluate(&env).unwrap());
        assert_eq!(set.passed_count(), 1);
    }

    #[test]
    fn test_missing_concept_rolls_back_accumulator() {
        let instances = input();
        let evaluator = ScriptedEvaluator::new();
        let env = EvaluationEnv { instances: &instances, evaluator: &evaluator };

        let mut set = VariableSet::new(
            VariableSetKey::new("role", "orphan"),
            "f.xml#orphan",
            VariableSetKind::Formula(FormulaRules { value: "1".into(), ..Default::default() }),
            crate::store::standard_output_instance(),
        );
        set.generated_facts = Some(GeneratedFacts::new());
        let err = set.evaluate(&env).unwrap_err();
        assert_eq!(err, EvaluationError::MissingConcept("orphan".into()));
        assert!(set.results.is_empty());
        assert!(set.generated_facts.as_ref().unwrap().is_empty());
    }

    #[test]
    fn test_bind_as_sequence_yields_one_combination() {
        let instances = input();
        let evaluator = ScriptedEvaluator::new();
        let env = EvaluationEnv { instances: &instances, evaluator: &evaluator };

        let mut set = VariableSet::new(
            VariableSetKey::new("role", "all"),
            "a.xml#all",
            VariableSetKind::ValueAssertion { test: "true()".into() },
            standard_input_instance(),
        );
        let mut var = concept_var("g", "Gross");
        if let Variable::Fact(v) = &mut var {
            v.bind_as_sequence = true;
        }
        set.variables.insert(QName::local("g"), var);
        set.variable_order = vec![QName::local("g")];

        set.evaluate(&env).unwrap();
        assert_eq!(set.results.len(), 1);
        assert_eq!(set.results[0].bound_facts[&QName::local("g")].len(), 2);
    }
}
