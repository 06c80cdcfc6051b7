//! Synthetic-data hints attached to variables.
//!
//! The extraction engine uses these declarations to fabricate plausible
//! values when run without a backend. They are carried here as typed data
//! only; nothing in this workspace samples from them.

use std::fmt;

use crate::{DateBound, RatioTable};

/// How events are spread over the expected date range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Rate {
    /// Every patient has a value.
    Universal,
    /// Dates uniformly distributed.
    #[default]
    Uniform,
    /// Dates increasingly likely towards the end of the range.
    ExponentialIncrease,
}

/// Expected date range for date-valued variables.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DateRange {
    /// Earliest plausible date.
    pub earliest: DateBound,
    /// Latest plausible date.
    pub latest: DateBound,
}

/// Distribution for integer-valued variables.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case", tag = "distribution"))]
pub enum IntDistribution {
    /// Poisson counts.
    Poisson {
        /// Mean count.
        mean: f64,
    },
    /// The England population age pyramid.
    PopulationAges,
}

/// Distribution for float-valued variables.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case", tag = "distribution"))]
pub enum FloatDistribution {
    /// Normally distributed measurements.
    Normal {
        /// Mean.
        mean: f64,
        /// Standard deviation.
        stddev: f64,
    },
}

/// Error type for invalid expectation declarations.
#[derive(Debug, Clone, PartialEq)]
pub enum ExpectationError {
    /// Incidence outside `[0, 1]`.
    Incidence(f64),
    /// Negative or non-finite distribution parameter.
    Parameter {
        /// Parameter name.
        name: &'static str,
        /// The offending value.
        value: f64,
    },
}

impl fmt::Display for ExpectationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Incidence(value) => write!(f, "incidence {} is outside [0, 1]", value),
            Self::Parameter { name, value } => {
                write!(f, "distribution parameter {} = {} is invalid", name, value)
            }
        }
    }
}

impl std::error::Error for ExpectationError {}

/// Expectation declarations for one variable or for a whole study.
///
/// # Examples
///
/// ```
/// use cohort_types::{DateBound, Expectations, Rate};
///
/// let defaults = Expectations::new()
///     .rate(Rate::Uniform)
///     .date_range(DateBound::ymd(1900, 1, 1).unwrap(), DateBound::Today)
///     .incidence(0.5)
///     .unwrap();
/// assert_eq!(defaults.incidence, Some(0.5));
/// assert!(Expectations::new().incidence(1.5).is_err());
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Expectations {
    /// Event rate shape.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub rate: Option<Rate>,
    /// Share of patients with a value.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub incidence: Option<f64>,
    /// Plausible date range.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub date: Option<DateRange>,
    /// Integer distribution.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub int: Option<IntDistribution>,
    /// Float distribution.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub float: Option<FloatDistribution>,
    /// Category ratios.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub category: Option<RatioTable>,
}

impl Expectations {
    /// Empty expectations.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the rate.
    pub fn rate(mut self, rate: Rate) -> Self {
        self.rate = Some(rate);
        self
    }

    /// Sets the incidence.
    ///
    /// # Errors
    /// Fails if `incidence` is not within `[0, 1]`.
    pub fn incidence(mut self, incidence: f64) -> Result<Self, ExpectationError> {
        if !(0.0..=1.0).contains(&incidence) {
            return Err(ExpectationError::Incidence(incidence));
        }
        self.incidence = Some(incidence);
        Ok(self)
    }

    /// Sets the date range.
    pub fn date_range(mut self, earliest: DateBound, latest: DateBound) -> Self {
        self.date = Some(DateRange { earliest, latest });
        self
    }

    /// Poisson-distributed integers with the given mean.
    ///
    /// # Errors
    /// Fails if `mean` is negative or not finite.
    pub fn poisson(mut self, mean: f64) -> Result<Self, ExpectationError> {
        check_parameter("mean", mean)?;
        self.int = Some(IntDistribution::Poisson { mean });
        Ok(self)
    }

    /// Ages following the population pyramid.
    pub fn population_ages(mut self) -> Self {
        self.int = Some(IntDistribution::PopulationAges);
        self
    }

    /// Normally distributed floats.
    ///
    /// # Errors
    /// Fails if `stddev` is negative or either parameter is not finite.
    pub fn normal(mut self, mean: f64, stddev: f64) -> Result<Self, ExpectationError> {
        if !mean.is_finite() {
            return Err(ExpectationError::Parameter { name: "mean", value: mean });
        }
        check_parameter("stddev", stddev)?;
        self.float = Some(FloatDistribution::Normal { mean, stddev });
        Ok(self)
    }

    /// Sets the category ratio table.
    pub fn category(mut self, ratios: RatioTable) -> Self {
        self.category = Some(ratios);
        self
    }

    /// Returns true if nothing is declared.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

fn check_parameter(name: &'static str, value: f64) -> Result<(), ExpectationError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ExpectationError::Parameter { name, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let e = Expectations::new()
            .rate(Rate::Universal)
            .poisson(5.0)
            .unwrap();
        assert_eq!(e.rate, Some(Rate::Universal));
        assert_eq!(e.int, Some(IntDistribution::Poisson { mean: 5.0 }));
        assert!(!e.is_empty());
        assert!(Expectations::new().is_empty());
    }

    #[test]
    fn test_incidence_bounds() {
        assert!(Expectations::new().incidence(0.0).is_ok());
        assert!(Expectations::new().incidence(1.0).is_ok());
        assert_eq!(
            Expectations::new().incidence(-0.1),
            Err(ExpectationError::Incidence(-0.1))
        );
        assert!(Expectations::new().incidence(f64::NAN).is_err());
    }

    #[test]
    fn test_distribution_parameters() {
        let bmi = Expectations::new().normal(28.0, 8.0).unwrap();
        assert_eq!(
            bmi.float,
            Some(FloatDistribution::Normal { mean: 28.0, stddev: 8.0 })
        );
        assert!(Expectations::new().normal(28.0, -1.0).is_err());
        assert!(Expectations::new().poisson(f64::INFINITY).is_err());
    }
}
