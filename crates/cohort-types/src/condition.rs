//! Typed boolean conditions over named variables.
//!
//! Conditions are what category rules and population rules test. They are
//! evaluated against a [`Row`] and render to the extraction engine's textual
//! expression syntax.
//!
//! # Examples
//!
//! ```
//! use cohort_types::{Condition, Row};
//!
//! let ex_smoker = Condition::or([
//!     Condition::eq("most_recent_smoking_code", "E"),
//!     Condition::and([
//!         Condition::eq("most_recent_smoking_code", "N"),
//!         Condition::flag("ever_smoked"),
//!     ]),
//! ]);
//!
//! assert_eq!(
//!     ex_smoker.to_string(),
//!     "most_recent_smoking_code = 'E' OR (most_recent_smoking_code = 'N' AND ever_smoked)"
//! );
//!
//! let row = Row::new()
//!     .with("most_recent_smoking_code", "N")
//!     .with("ever_smoked", true);
//! assert!(ex_smoker.evaluate(&row));
//! ```

use std::fmt;

use crate::{Row, Value};

/// A literal compared against a variable for equality.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum Literal {
    /// Boolean literal.
    Bool(bool),
    /// Numeric literal.
    Number(f64),
    /// Text literal (category label).
    Text(String),
}

impl Literal {
    fn matches(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Missing) => false,
            (Self::Bool(b), Value::Bool(v)) => b == v,
            (Self::Text(t), Value::Category(s)) => t == s,
            (Self::Text(t), v) => match (t.trim().parse::<f64>(), v.as_number()) {
                (Ok(t), Some(v)) => t == v,
                _ => false,
            },
            (Self::Number(n), Value::Category(s)) => s.trim().parse::<f64>() == Ok(*n),
            (Self::Number(n), v) => v.as_number() == Some(*n),
            (Self::Bool(_), _) => false,
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", u8::from(*b)),
            Self::Number(n) => write!(f, "{}", n),
            Self::Text(t) => write!(f, "'{}'", t.replace('\'', "''")),
        }
    }
}

impl From<&str> for Literal {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Literal {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<f64> for Literal {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<bool> for Literal {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

/// Ordering comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum CmpOp {
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

impl CmpOp {
    /// Returns the operator symbol.
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }

    fn apply(self, lhs: f64, rhs: f64) -> bool {
        match self {
            Self::Lt => lhs < rhs,
            Self::Le => lhs <= rhs,
            Self::Gt => lhs > rhs,
            Self::Ge => lhs >= rhs,
        }
    }
}

/// A boolean expression over named variables.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Condition {
    /// The variable is truthy.
    Flag(String),
    /// The variable equals a literal.
    Equals {
        /// Variable name.
        variable: String,
        /// Expected value.
        value: Literal,
    },
    /// The variable compares against a numeric threshold.
    Compare {
        /// Variable name.
        variable: String,
        /// Comparison operator.
        op: CmpOp,
        /// Threshold.
        value: f64,
    },
    /// Every operand holds. An empty conjunction is true.
    And(Vec<Condition>),
    /// At least one operand holds. An empty disjunction is false.
    Or(Vec<Condition>),
    /// The operand does not hold.
    Not(Box<Condition>),
}

impl Condition {
    /// `variable` is truthy.
    pub fn flag(variable: impl Into<String>) -> Self {
        Self::Flag(variable.into())
    }

    /// `variable = value`.
    pub fn eq(variable: impl Into<String>, value: impl Into<Literal>) -> Self {
        Self::Equals {
            variable: variable.into(),
            value: value.into(),
        }
    }

    /// `variable <op> value`.
    pub fn compare(variable: impl Into<String>, op: CmpOp, value: f64) -> Self {
        Self::Compare {
            variable: variable.into(),
            op,
            value,
        }
    }

    /// `variable >= value`.
    pub fn ge(variable: impl Into<String>, value: f64) -> Self {
        Self::compare(variable, CmpOp::Ge, value)
    }

    /// `variable < value`.
    pub fn lt(variable: impl Into<String>, value: f64) -> Self {
        Self::compare(variable, CmpOp::Lt, value)
    }

    /// Conjunction of `operands`.
    pub fn and(operands: impl IntoIterator<Item = Condition>) -> Self {
        Self::And(operands.into_iter().collect())
    }

    /// Disjunction of `operands`.
    pub fn or(operands: impl IntoIterator<Item = Condition>) -> Self {
        Self::Or(operands.into_iter().collect())
    }

    /// Negation of `operand`.
    pub fn not(operand: Condition) -> Self {
        Self::Not(Box::new(operand))
    }

    /// Returns the variable names this condition reads, in first-use order.
    pub fn references(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_references(&mut names);
        names
    }

    fn collect_references<'a>(&'a self, names: &mut Vec<&'a str>) {
        match self {
            Self::Flag(variable)
            | Self::Equals { variable, .. }
            | Self::Compare { variable, .. } => {
                if !names.contains(&variable.as_str()) {
                    names.push(variable);
                }
            }
            Self::And(operands) | Self::Or(operands) => {
                for operand in operands {
                    operand.collect_references(names);
                }
            }
            Self::Not(operand) => operand.collect_references(names),
        }
    }

    /// Evaluates the condition against one patient's values.
    ///
    /// Absent variables read as [`Value::Missing`], which fails every test
    /// except negation.
    pub fn evaluate(&self, row: &Row) -> bool {
        match self {
            Self::Flag(variable) => row.get(variable).is_truthy(),
            Self::Equals { variable, value } => value.matches(row.get(variable)),
            Self::Compare {
                variable,
                op,
                value,
            } => {
                let lhs = match row.get(variable) {
                    Value::Category(s) => s.trim().parse::<f64>().ok(),
                    other => other.as_number(),
                };
                lhs.is_some_and(|lhs| op.apply(lhs, *value))
            }
            Self::And(operands) => operands.iter().all(|c| c.evaluate(row)),
            Self::Or(operands) => operands.iter().any(|c| c.evaluate(row)),
            Self::Not(operand) => !operand.evaluate(row),
        }
    }

    fn is_compound(&self) -> bool {
        matches!(self, Self::And(ops) | Self::Or(ops) if ops.len() > 1)
    }

    fn fmt_operand(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_compound() {
            write!(f, "({})", self)
        } else {
            write!(f, "{}", self)
        }
    }

    fn fmt_joined(f: &mut fmt::Formatter<'_>, operands: &[Condition], sep: &str) -> fmt::Result {
        for (i, operand) in operands.iter().enumerate() {
            if i > 0 {
                f.write_str(sep)?;
            }
            operand.fmt_operand(f)?;
        }
        Ok(())
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flag(variable) => f.write_str(variable),
            Self::Equals { variable, value } => write!(f, "{} = {}", variable, value),
            Self::Compare {
                variable,
                op,
                value,
            } => write!(f, "{} {} {}", variable, op.symbol(), value),
            Self::And(operands) if operands.is_empty() => f.write_str("1"),
            Self::Or(operands) if operands.is_empty() => f.write_str("0"),
            Self::And(operands) => Self::fmt_joined(f, operands, " AND "),
            Self::Or(operands) => Self::fmt_joined(f, operands, " OR "),
            Self::Not(operand) => {
                f.write_str("NOT ")?;
                operand.fmt_operand(f)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_population() {
        let population = Condition::and([
            Condition::not(Condition::flag("has_died")),
            Condition::flag("registered"),
            Condition::flag("has_follow_up_previous_6months"),
        ]);
        assert_eq!(
            population.to_string(),
            "NOT has_died AND registered AND has_follow_up_previous_6months"
        );
    }

    #[test]
    fn test_display_nested_and_quotes() {
        let c = Condition::not(Condition::or([
            Condition::eq("region", "Yorkshire and The Humber"),
            Condition::eq("name", "O'Neil"),
        ]));
        assert_eq!(
            c.to_string(),
            "NOT (region = 'Yorkshire and The Humber' OR name = 'O''Neil')"
        );
    }

    #[test]
    fn test_display_compare() {
        let c = Condition::and([
            Condition::ge("imd", 1.0),
            Condition::lt("imd", 3284.4),
        ]);
        assert_eq!(c.to_string(), "imd >= 1 AND imd < 3284.4");
    }

    #[test]
    fn test_references_dedup_in_order() {
        let c = Condition::or([
            Condition::eq("a", "1"),
            Condition::and([Condition::not(Condition::flag("a")), Condition::eq("b", "1")]),
        ]);
        assert_eq!(c.references(), vec!["a", "b"]);
    }

    #[test]
    fn test_evaluate_equals_across_kinds() {
        let row = Row::new()
            .with("cat", "3")
            .with("num", 3i64)
            .with("flag", true);
        assert!(Condition::eq("cat", "3").evaluate(&row));
        assert!(Condition::eq("num", "3").evaluate(&row));
        assert!(Condition::eq("cat", 3.0).evaluate(&row));
        assert!(Condition::eq("flag", true).evaluate(&row));
        assert!(!Condition::eq("missing", "3").evaluate(&row));
        assert!(!Condition::eq("flag", "1").evaluate(&row));
    }

    #[test]
    fn test_evaluate_missing() {
        let row = Row::new();
        assert!(!Condition::flag("x").evaluate(&row));
        assert!(Condition::not(Condition::flag("x")).evaluate(&row));
        assert!(!Condition::ge("x", 0.0).evaluate(&row));
        assert!(!Condition::lt("x", 0.0).evaluate(&row));
    }

    #[test]
    fn test_evaluate_empty_connectives() {
        let row = Row::new();
        assert!(Condition::and([]).evaluate(&row));
        assert!(!Condition::or([]).evaluate(&row));
    }
}
