//! Date bounds and lookup windows.
//!
//! Lookups are restricted to a window with two explicit, named bounds:
//! `on_or_after` and `on_or_before`. Each bound is either a literal date, the
//! study index date, today, another (date-valued) variable, or an offset from
//! one of those.
//!
//! # Examples
//!
//! ```
//! use cohort_types::{DateBound, DateWindow};
//!
//! let follow_up = DateWindow::between(DateBound::IndexDate.minus_months(6), DateBound::IndexDate);
//! assert_eq!(follow_up.to_string(), "between index_date - 6 months and index_date");
//! ```

use std::fmt;

use chrono::{Days, Months, NaiveDate};

/// Unit of a date offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum OffsetUnit {
    /// Calendar days.
    Days,
    /// Calendar months.
    Months,
    /// Calendar years.
    Years,
}

impl OffsetUnit {
    fn name(self) -> &'static str {
        match self {
            Self::Days => "days",
            Self::Months => "months",
            Self::Years => "years",
        }
    }
}

/// One end of a date window.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum DateBound {
    /// A fixed calendar date.
    Date(NaiveDate),
    /// The study index date.
    IndexDate,
    /// The date of extraction.
    Today,
    /// The value of an earlier date variable.
    Variable(String),
    /// A signed offset from another bound.
    Offset {
        /// Bound the offset applies to.
        base: Box<DateBound>,
        /// Signed amount; negative moves earlier.
        amount: i32,
        /// Unit of `amount`.
        unit: OffsetUnit,
    },
}

impl DateBound {
    /// A fixed date. Returns `None` for an invalid calendar date.
    pub fn ymd(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day).map(Self::Date)
    }

    /// The value of an earlier variable.
    pub fn variable(name: impl Into<String>) -> Self {
        Self::Variable(name.into())
    }

    /// Offsets this bound by `amount` units.
    pub fn offset(self, amount: i32, unit: OffsetUnit) -> Self {
        Self::Offset {
            base: Box::new(self),
            amount,
            unit,
        }
    }

    /// This bound moved `months` months earlier.
    pub fn minus_months(self, months: u16) -> Self {
        self.offset(-i32::from(months), OffsetUnit::Months)
    }

    /// This bound moved `days` days later.
    pub fn plus_days(self, days: u16) -> Self {
        self.offset(i32::from(days), OffsetUnit::Days)
    }

    /// Returns the variable name this bound depends on, if any.
    pub fn reference(&self) -> Option<&str> {
        match self {
            Self::Variable(name) => Some(name),
            Self::Offset { base, .. } => base.reference(),
            _ => None,
        }
    }

    /// Resolves a bound built only from literal dates.
    ///
    /// Returns `None` when the bound depends on the index date, today or a
    /// variable, or when the offset leaves the supported calendar range.
    pub fn literal(&self) -> Option<NaiveDate> {
        self.resolve_with(&|bound| match bound {
            Self::Date(date) => Some(*date),
            _ => None,
        })
    }

    /// Resolves the bound given the index date and today's date.
    ///
    /// Variable bounds resolve through `lookup`.
    pub fn resolve(
        &self,
        index_date: NaiveDate,
        today: NaiveDate,
        lookup: &dyn Fn(&str) -> Option<NaiveDate>,
    ) -> Option<NaiveDate> {
        self.resolve_with(&|bound| match bound {
            Self::Date(date) => Some(*date),
            Self::IndexDate => Some(index_date),
            Self::Today => Some(today),
            Self::Variable(name) => lookup(name),
            Self::Offset { .. } => None,
        })
    }

    fn resolve_with(&self, leaf: &dyn Fn(&DateBound) -> Option<NaiveDate>) -> Option<NaiveDate> {
        match self {
            Self::Offset { base, amount, unit } => {
                let base = base.resolve_with(leaf)?;
                apply_offset(base, *amount, *unit)
            }
            other => leaf(other),
        }
    }
}

fn apply_offset(date: NaiveDate, amount: i32, unit: OffsetUnit) -> Option<NaiveDate> {
    let magnitude = amount.unsigned_abs();
    match (unit, amount < 0) {
        (OffsetUnit::Days, false) => date.checked_add_days(Days::new(u64::from(magnitude))),
        (OffsetUnit::Days, true) => date.checked_sub_days(Days::new(u64::from(magnitude))),
        (OffsetUnit::Months, false) => date.checked_add_months(Months::new(magnitude)),
        (OffsetUnit::Months, true) => date.checked_sub_months(Months::new(magnitude)),
        (OffsetUnit::Years, false) => date.checked_add_months(Months::new(magnitude.checked_mul(12)?)),
        (OffsetUnit::Years, true) => date.checked_sub_months(Months::new(magnitude.checked_mul(12)?)),
    }
}

impl From<NaiveDate> for DateBound {
    fn from(date: NaiveDate) -> Self {
        Self::Date(date)
    }
}

impl fmt::Display for DateBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Date(date) => write!(f, "{}", date.format("%Y-%m-%d")),
            Self::IndexDate => f.write_str("index_date"),
            Self::Today => f.write_str("today"),
            Self::Variable(name) => f.write_str(name),
            Self::Offset { base, amount, unit } => {
                let sign = if *amount < 0 { '-' } else { '+' };
                write!(f, "{} {} {} {}", base, sign, amount.unsigned_abs(), unit.name())
            }
        }
    }
}

/// Error type for invalid windows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowError {
    /// Resolved lower bound.
    pub on_or_after: NaiveDate,
    /// Resolved upper bound.
    pub on_or_before: NaiveDate,
}

impl fmt::Display for WindowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "window starts on {} but ends on {}",
            self.on_or_after, self.on_or_before
        )
    }
}

impl std::error::Error for WindowError {}

/// A date window with two explicit, optional bounds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DateWindow {
    /// Earliest date included, if bounded below.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub on_or_after: Option<DateBound>,
    /// Latest date included, if bounded above.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub on_or_before: Option<DateBound>,
}

impl DateWindow {
    /// The whole record history.
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Events on or after `bound`.
    pub fn on_or_after(bound: DateBound) -> Self {
        Self {
            on_or_after: Some(bound),
            on_or_before: None,
        }
    }

    /// Events on or before `bound`.
    pub fn on_or_before(bound: DateBound) -> Self {
        Self {
            on_or_after: None,
            on_or_before: Some(bound),
        }
    }

    /// Events between two bounds, inclusive.
    pub fn between(on_or_after: DateBound, on_or_before: DateBound) -> Self {
        Self {
            on_or_after: Some(on_or_after),
            on_or_before: Some(on_or_before),
        }
    }

    /// Returns the variable names the bounds depend on.
    pub fn references(&self) -> Vec<&str> {
        [&self.on_or_after, &self.on_or_before]
            .into_iter()
            .flatten()
            .filter_map(DateBound::reference)
            .collect()
    }

    /// Checks that literal bounds are ordered.
    ///
    /// Bounds that depend on the index date, today or a variable cannot be
    /// checked here and are accepted.
    pub fn validate(&self) -> Result<(), WindowError> {
        let lower = self.on_or_after.as_ref().and_then(DateBound::literal);
        let upper = self.on_or_before.as_ref().and_then(DateBound::literal);
        match (lower, upper) {
            (Some(on_or_after), Some(on_or_before)) if on_or_after > on_or_before => {
                Err(WindowError {
                    on_or_after,
                    on_or_before,
                })
            }
            _ => Ok(()),
        }
    }

    /// Returns true if `date` lies in the window, resolving bounds with
    /// `resolve`. Unresolvable bounds are treated as open.
    pub fn contains(&self, date: NaiveDate, resolve: &dyn Fn(&DateBound) -> Option<NaiveDate>) -> bool {
        let after = self
            .on_or_after
            .as_ref()
            .and_then(resolve)
            .is_none_or(|lower| date >= lower);
        let before = self
            .on_or_before
            .as_ref()
            .and_then(resolve)
            .is_none_or(|upper| date <= upper);
        after && before
    }
}

impl fmt::Display for DateWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.on_or_after, &self.on_or_before) {
            (Some(after), Some(before)) => write!(f, "between {} and {}", after, before),
            (Some(after), None) => write!(f, "on or after {}", after),
            (None, Some(before)) => write!(f, "on or before {}", before),
            (None, None) => f.write_str("any time"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_offset_display() {
        let bound = DateBound::IndexDate.minus_months(6);
        assert_eq!(bound.to_string(), "index_date - 6 months");
        let later = DateBound::variable("exp_date").plus_days(28);
        assert_eq!(later.to_string(), "exp_date + 28 days");
    }

    #[test]
    fn test_large_offsets_keep_sign() {
        let earlier = DateBound::IndexDate.minus_months(u16::MAX);
        assert!(matches!(earlier, DateBound::Offset { amount: -65535, .. }));
        let later = DateBound::IndexDate.plus_days(u16::MAX);
        assert!(matches!(later, DateBound::Offset { amount: 65535, .. }));
    }

    #[test]
    fn test_literal_resolution() {
        let bound = DateBound::Date(date(2020, 8, 31)).minus_months(6);
        assert_eq!(bound.literal(), Some(date(2020, 2, 29)));
        assert_eq!(DateBound::IndexDate.literal(), None);
        let years = DateBound::Date(date(2020, 1, 1)).offset(-2, OffsetUnit::Years);
        assert_eq!(years.literal(), Some(date(2018, 1, 1)));
    }

    #[test]
    fn test_resolve_with_index() {
        let index = date(2020, 1, 1);
        let today = date(2022, 6, 1);
        let lookup = |name: &str| (name == "exp").then(|| date(2020, 5, 5));

        assert_eq!(
            DateBound::IndexDate.minus_months(6).resolve(index, today, &lookup),
            Some(date(2019, 7, 1))
        );
        assert_eq!(
            DateBound::variable("exp").resolve(index, today, &lookup),
            Some(date(2020, 5, 5))
        );
        assert_eq!(DateBound::variable("other").resolve(index, today, &lookup), None);
        assert_eq!(DateBound::Today.resolve(index, today, &lookup), Some(today));
    }

    #[test]
    fn test_window_references() {
        let window = DateWindow::between(
            DateBound::variable("exp_date_covid19_confirmed"),
            DateBound::Today,
        );
        assert_eq!(window.references(), vec!["exp_date_covid19_confirmed"]);
        assert!(DateWindow::on_or_before(DateBound::IndexDate).references().is_empty());
    }

    #[test]
    fn test_window_validate() {
        let ok = DateWindow::between(
            DateBound::Date(date(2019, 1, 1)),
            DateBound::Date(date(2019, 12, 31)),
        );
        assert!(ok.validate().is_ok());

        let reversed = DateWindow::between(
            DateBound::Date(date(2019, 12, 31)),
            DateBound::Date(date(2019, 1, 1)),
        );
        assert!(reversed.validate().is_err());

        let symbolic = DateWindow::between(DateBound::Today, DateBound::Date(date(1900, 1, 1)));
        assert!(symbolic.validate().is_ok());
    }

    #[test]
    fn test_window_contains() {
        let window = DateWindow::between(
            DateBound::Date(date(2019, 1, 1)),
            DateBound::Date(date(2019, 12, 31)),
        );
        let resolve = |b: &DateBound| b.literal();
        assert!(window.contains(date(2019, 1, 1), &resolve));
        assert!(window.contains(date(2019, 12, 31), &resolve));
        assert!(!window.contains(date(2020, 1, 1), &resolve));
        assert!(DateWindow::unbounded().contains(date(1900, 1, 1), &resolve));
    }

    #[test]
    fn test_window_display() {
        let window = DateWindow::on_or_after(DateBound::IndexDate);
        assert_eq!(window.to_string(), "on or after index_date");
        assert_eq!(DateWindow::unbounded().to_string(), "any time");
    }
}
