//! Per-patient values.
//!
//! The extraction engine returns one row per patient. A [`Row`] holds the
//! values of named variables for one patient, and [`Value`] is a single cell.

use std::fmt;

use chrono::NaiveDate;
use indexmap::IndexMap;

/// A single variable value for one patient.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum Value {
    /// No value recorded.
    Missing,
    /// A binary flag.
    Bool(bool),
    /// A count or integer measurement.
    Int(i64),
    /// A continuous measurement.
    Float(f64),
    /// A calendar date.
    Date(NaiveDate),
    /// A category label.
    Category(String),
}

/// The kind of a [`Value`], used in type mismatch reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// Missing value.
    Missing,
    /// Binary flag.
    Bool,
    /// Integer or float.
    Number,
    /// Calendar date.
    Date,
    /// Category label.
    Category,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Missing => "missing",
            Self::Bool => "bool",
            Self::Number => "number",
            Self::Date => "date",
            Self::Category => "category",
        };
        f.write_str(name)
    }
}

impl Value {
    /// Returns true if no value is recorded.
    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }

    /// Returns the kind of this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Missing => ValueKind::Missing,
            Self::Bool(_) => ValueKind::Bool,
            Self::Int(_) | Self::Float(_) => ValueKind::Number,
            Self::Date(_) => ValueKind::Date,
            Self::Category(_) => ValueKind::Category,
        }
    }

    /// Truthiness as used by condition expressions.
    ///
    /// Numbers are truthy when non-zero, dates always, categories when
    /// non-empty. Missing values are false.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Missing => false,
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Float(x) => *x != 0.0,
            Self::Date(_) => true,
            Self::Category(s) => !s.is_empty(),
        }
    }

    /// Returns the numeric value of integers and floats.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(x) => Some(*x),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => Ok(()),
            Self::Bool(b) => write!(f, "{}", u8::from(*b)),
            Self::Int(i) => write!(f, "{}", i),
            Self::Float(x) => write!(f, "{}", x),
            Self::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Self::Category(s) => f.write_str(s),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<NaiveDate> for Value {
    fn from(d: NaiveDate) -> Self {
        Self::Date(d)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Category(s.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Missing, Into::into)
    }
}

/// One patient's values, keyed by variable name in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Row {
    values: IndexMap<String, Value>,
}

static MISSING: Value = Value::Missing;

impl Row {
    /// Creates an empty row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value of `name`, or [`Value::Missing`] if absent.
    pub fn get(&self, name: &str) -> &Value {
        self.values.get(name).unwrap_or(&MISSING)
    }

    /// Returns true if `name` has an entry (possibly missing).
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Sets the value of `name`, returning the previous value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.values.insert(name.into(), value.into())
    }

    /// Builder-style [`Row::set`].
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// Removes `name` from the row.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.values.shift_remove(name)
    }

    /// Iterates over `(name, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if the row has no entries.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness() {
        assert!(!Value::Missing.is_truthy());
        assert!(Value::Bool(true).is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(Value::Float(0.5).is_truthy());
        assert!(!Value::Category(String::new()).is_truthy());
        assert!(Value::from("3").is_truthy());
        assert!(Value::from(NaiveDate::from_ymd_opt(2021, 3, 1).unwrap()).is_truthy());
    }

    #[test]
    fn test_kind() {
        assert_eq!(Value::Int(3).kind(), ValueKind::Number);
        assert_eq!(Value::Float(3.0).kind(), ValueKind::Number);
        assert_eq!(Value::from(None::<bool>).kind(), ValueKind::Missing);
        assert_eq!(ValueKind::Date.to_string(), "date");
    }

    #[test]
    fn test_row_missing_default() {
        let row = Row::new().with("age", 54i64);
        assert_eq!(row.get("age"), &Value::Int(54));
        assert_eq!(row.get("sex"), &Value::Missing);
        assert!(!row.contains("sex"));
    }

    #[test]
    fn test_row_preserves_order() {
        let row = Row::new()
            .with("b", true)
            .with("a", 1i64)
            .with("c", "S");
        let names: Vec<&str> = row.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_display() {
        let date = NaiveDate::from_ymd_opt(2021, 3, 1).unwrap();
        assert_eq!(Value::Date(date).to_string(), "2021-03-01");
        assert_eq!(Value::Bool(true).to_string(), "1");
        assert_eq!(Value::Missing.to_string(), "");
    }
}
