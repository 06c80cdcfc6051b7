//! Reference evaluator for combination rules.
//!
//! The extraction engine executes lookups; this module reproduces what it
//! does with their results. Given one patient's raw lookup values it resolves
//! every aggregate, category and population rule of a [`VariableSet`] in
//! declaration order.

use std::cmp::Ordering;

use cohort_types::{Row, Rule, Value, ValueKind};

use crate::builder::VariableSet;
use crate::error::{StudyError, StudyResult};

/// Resolves one rule against the values computed so far.
///
/// Lookups read their raw value from `row` under `variable`.
///
/// # Errors
/// Fails with [`StudyError::TypeMismatch`] when aggregate inputs mix value
/// kinds or are categories.
pub fn evaluate_rule(variable: &str, rule: &Rule, row: &Row) -> StudyResult<Value> {
    match rule {
        Rule::Lookup(_) => Ok(row.get(variable).clone()),
        Rule::MinimumOf(inputs) => aggregate(variable, inputs, row, Ordering::Less),
        Rule::MaximumOf(inputs) => aggregate(variable, inputs, row, Ordering::Greater),
        Rule::CategorisedAs(dictionary) => Ok(Value::Category(dictionary.resolve(row).to_string())),
        Rule::Satisfying(condition) => Ok(Value::Bool(condition.evaluate(row))),
    }
}

/// Resolves every variable of `set` from raw lookup values.
///
/// The result holds every variable, hidden ones included, in declaration
/// order. Lookups absent from `raw` are missing.
pub fn evaluate_set(set: &VariableSet, raw: &Row) -> StudyResult<Row> {
    let mut row = Row::new();
    for (name, spec) in set.iter() {
        let value = match &spec.rule {
            Rule::Lookup(_) => raw.get(name).clone(),
            rule => evaluate_rule(name, rule, &row)?,
        };
        row.set(name, value);
    }
    Ok(row)
}

/// Like [`evaluate_set`] but drops hidden variables.
pub fn evaluate_output(set: &VariableSet, raw: &Row) -> StudyResult<Row> {
    let mut row = evaluate_set(set, raw)?;
    for (name, spec) in set.iter() {
        if spec.hidden {
            row.remove(name);
        }
    }
    Ok(row)
}

/// Picks the extreme non-missing input. `keep` is the ordering a candidate
/// must have against the current best to replace it.
fn aggregate(variable: &str, inputs: &[String], row: &Row, keep: Ordering) -> StudyResult<Value> {
    let mut best: Option<&Value> = None;
    for input in inputs {
        let value = row.get(input);
        if value.is_missing() {
            continue;
        }
        if value.kind() == ValueKind::Category {
            return Err(mismatch(variable, ValueKind::Number, value.kind()));
        }
        match best {
            None => best = Some(value),
            Some(current) => {
                let ordering = compare(current, value)
                    .ok_or_else(|| mismatch(variable, current.kind(), value.kind()))?;
                if ordering.reverse() == keep {
                    best = Some(value);
                }
            }
        }
    }
    Ok(best.cloned().unwrap_or(Value::Missing))
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
        _ => a.as_number()?.partial_cmp(&b.as_number()?),
    }
}

fn mismatch(variable: &str, expected: ValueKind, found: ValueKind) -> StudyError {
    StudyError::TypeMismatch {
        variable: variable.to_string(),
        expected,
        found,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use cohort_types::{CategoryDictionary, CategoryRule, Condition};
    use proptest::prelude::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn min_of(names: &[&str]) -> Rule {
        Rule::MinimumOf(names.iter().map(|s| s.to_string()).collect())
    }

    fn max_of(names: &[&str]) -> Rule {
        Rule::MaximumOf(names.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_minimum_of_dates() {
        let row = Row::new().with("d1", date(2021, 3, 1)).with("d2", Value::Missing);
        assert_eq!(
            evaluate_rule("death_date", &min_of(&["d1", "d2"]), &row).unwrap(),
            Value::Date(date(2021, 3, 1))
        );

        let row = Row::new().with("d1", date(2021, 3, 1)).with("d2", date(2020, 12, 25));
        assert_eq!(
            evaluate_rule("death_date", &min_of(&["d1", "d2"]), &row).unwrap(),
            Value::Date(date(2020, 12, 25))
        );

        let empty = Row::new();
        assert_eq!(
            evaluate_rule("death_date", &min_of(&["d1", "d2"]), &empty).unwrap(),
            Value::Missing
        );
    }

    #[test]
    fn test_maximum_of_flags() {
        let row = Row::new().with("f1", false).with("f2", true);
        assert_eq!(
            evaluate_rule("any", &max_of(&["f1", "f2"]), &row).unwrap(),
            Value::Bool(true)
        );
        let row = Row::new().with("f1", false).with("f2", false);
        assert_eq!(
            evaluate_rule("any", &max_of(&["f1", "f2"]), &row).unwrap(),
            Value::Bool(false)
        );
    }

    #[test]
    fn test_maximum_of_numbers_mixed_int_float() {
        let row = Row::new().with("a", 3i64).with("b", 4.5);
        assert_eq!(evaluate_rule("m", &max_of(&["a", "b"]), &row).unwrap(), Value::Float(4.5));
        assert_eq!(evaluate_rule("m", &min_of(&["a", "b"]), &row).unwrap(), Value::Int(3));
    }

    #[test]
    fn test_type_mismatch() {
        let row = Row::new().with("f", true).with("d", date(2021, 1, 1));
        let err = evaluate_rule("bad", &max_of(&["f", "d"]), &row).unwrap_err();
        assert!(matches!(
            err,
            StudyError::TypeMismatch { expected: ValueKind::Bool, found: ValueKind::Date, .. }
        ));

        let row = Row::new().with("c", "S");
        assert!(evaluate_rule("bad", &min_of(&["c"]), &row).is_err());
    }

    #[test]
    fn test_categorised_as_order_sensitive() {
        let dict = CategoryDictionary::from_rules(vec![
            CategoryRule::when("Yes", Condition::flag("cond_a")),
            CategoryRule::when("Yes", Condition::flag("cond_b")),
            CategoryRule::otherwise("No"),
        ])
        .unwrap();
        let rule = Rule::CategorisedAs(dict);

        let only_b = Row::new().with("cond_a", false).with("cond_b", true);
        assert_eq!(evaluate_rule("c", &rule, &only_b).unwrap(), Value::from("Yes"));
        let neither = Row::new().with("cond_a", false).with("cond_b", false);
        assert_eq!(evaluate_rule("c", &rule, &neither).unwrap(), Value::from("No"));
    }

    #[test]
    fn test_satisfying() {
        let rule = Rule::Satisfying(Condition::and([
            Condition::not(Condition::flag("has_died")),
            Condition::flag("registered"),
        ]));
        let row = Row::new().with("has_died", false).with("registered", true);
        assert_eq!(evaluate_rule("population", &rule, &row).unwrap(), Value::Bool(true));
    }

    proptest! {
        #[test]
        fn prop_minimum_of_is_earliest_present(
            days in proptest::collection::vec(proptest::option::of(0i64..20000), 1..6)
        ) {
            let base = date(1970, 1, 1);
            let names: Vec<String> = (0..days.len()).map(|i| format!("d{}", i)).collect();
            let mut row = Row::new();
            for (name, day) in names.iter().zip(&days) {
                let value = day.map(|d| base + chrono::Duration::days(d));
                row.set(name.as_str(), Value::from(value));
            }

            let rule = Rule::MinimumOf(names.clone());
            let expected = days.iter().flatten().min().map(|d| base + chrono::Duration::days(*d));
            prop_assert_eq!(evaluate_rule("m", &rule, &row).unwrap(), Value::from(expected));
        }
    }
}
