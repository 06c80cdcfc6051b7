//! Category ratio tables.
//!
//! A [`RatioTable`] assigns a probability to each category key. The
//! extraction engine uses these tables to draw synthetic categories when no
//! real data is available, so every table must be a proper distribution.

use std::fmt;

use indexmap::IndexMap;

/// Tolerance used when checking that ratios sum to one.
pub const RATIO_TOLERANCE: f64 = 1e-9;

/// Error type for invalid ratio tables.
#[derive(Debug, Clone, PartialEq)]
pub enum RatioError {
    /// The table has no entries.
    Empty,
    /// A ratio is outside `[0, 1]` or not finite.
    OutOfRange {
        /// Category key.
        category: String,
        /// The offending ratio.
        ratio: f64,
    },
    /// The same category key was given twice.
    DuplicateCategory {
        /// Category key.
        category: String,
    },
    /// Ratios do not sum to one.
    BadTotal {
        /// Actual sum.
        total: f64,
    },
}

impl fmt::Display for RatioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "ratio table is empty"),
            Self::OutOfRange { category, ratio } => {
                write!(f, "ratio {} for category '{}' is outside [0, 1]", ratio, category)
            }
            Self::DuplicateCategory { category } => {
                write!(f, "category '{}' appears twice in ratio table", category)
            }
            Self::BadTotal { total } => write!(f, "ratios sum to {} instead of 1", total),
        }
    }
}

impl std::error::Error for RatioError {}

/// An ordered `category -> probability` table summing to one.
///
/// # Examples
///
/// ```
/// use cohort_types::RatioTable;
///
/// let sex = RatioTable::new([("M", 0.49), ("F", 0.51)]).unwrap();
/// assert_eq!(sex.get("F"), Some(0.51));
/// assert!(RatioTable::new([("M", 0.5), ("F", 0.6)]).is_err());
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct RatioTable {
    ratios: IndexMap<String, f64>,
}

impl RatioTable {
    /// Builds a table from `(category, ratio)` pairs.
    ///
    /// # Errors
    /// Fails if the table is empty, a ratio is outside `[0, 1]`, a key is
    /// repeated, or the ratios do not sum to one within [`RATIO_TOLERANCE`].
    pub fn new<I, K>(entries: I) -> Result<Self, RatioError>
    where
        I: IntoIterator<Item = (K, f64)>,
        K: Into<String>,
    {
        let mut ratios = IndexMap::new();
        for (category, ratio) in entries {
            let category = category.into();
            if !ratio.is_finite() || !(0.0..=1.0).contains(&ratio) {
                return Err(RatioError::OutOfRange { category, ratio });
            }
            if ratios.contains_key(&category) {
                return Err(RatioError::DuplicateCategory { category });
            }
            ratios.insert(category, ratio);
        }

        if ratios.is_empty() {
            return Err(RatioError::Empty);
        }

        let total: f64 = ratios.values().sum();
        if (total - 1.0).abs() > RATIO_TOLERANCE {
            return Err(RatioError::BadTotal { total });
        }

        Ok(Self { ratios })
    }

    /// Builds a table giving each category an equal share.
    ///
    /// The last category absorbs rounding so the sum is as close to one as
    /// floating point allows.
    ///
    /// # Errors
    /// Fails with [`RatioError::Empty`] when no categories are given.
    pub fn uniform<I, K>(categories: I) -> Result<Self, RatioError>
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let categories: Vec<String> = categories.into_iter().map(Into::into).collect();
        if categories.is_empty() {
            return Err(RatioError::Empty);
        }

        let share = 1.0 / categories.len() as f64;
        let head = categories.len() - 1;
        let remainder = 1.0 - share * head as f64;

        let entries = categories
            .into_iter()
            .enumerate()
            .map(|(i, category)| (category, if i == head { remainder } else { share }));
        Self::new(entries)
    }

    /// Returns the ratio for `category`.
    pub fn get(&self, category: &str) -> Option<f64> {
        self.ratios.get(category).copied()
    }

    /// Iterates over `(category, ratio)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.ratios.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Returns the category keys in insertion order.
    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.ratios.keys().map(String::as_str)
    }

    /// Returns the sum of all ratios.
    pub fn total(&self) -> f64 {
        self.ratios.values().sum()
    }

    /// Returns the number of categories.
    pub fn len(&self) -> usize {
        self.ratios.len()
    }

    /// Always false: a valid table has at least one category.
    pub fn is_empty(&self) -> bool {
        self.ratios.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_ratios() {
        let regions = RatioTable::new([
            ("North East", 0.1),
            ("North West", 0.1),
            ("Yorkshire and The Humber", 0.1),
            ("East Midlands", 0.1),
            ("West Midlands", 0.1),
            ("East", 0.1),
            ("London", 0.2),
            ("South East", 0.1),
            ("South West", 0.1),
        ])
        .unwrap();
        assert_eq!(regions.len(), 9);
        assert!((regions.total() - 1.0).abs() < RATIO_TOLERANCE);
    }

    #[test]
    fn test_invalid_tables() {
        assert_eq!(
            RatioTable::new(Vec::<(String, f64)>::new()),
            Err(RatioError::Empty)
        );
        assert!(matches!(
            RatioTable::new([("a", 1.5), ("b", -0.5)]),
            Err(RatioError::OutOfRange { .. })
        ));
        assert!(matches!(
            RatioTable::new([("a", 0.5), ("a", 0.5)]),
            Err(RatioError::DuplicateCategory { .. })
        ));
        assert!(matches!(
            RatioTable::new([("a", 0.3), ("b", 0.3)]),
            Err(RatioError::BadTotal { .. })
        ));
    }

    #[test]
    fn test_uniform() {
        let table = RatioTable::uniform(["1", "2", "3", "4", "5", "6", "7"]).unwrap();
        assert_eq!(table.len(), 7);
        assert!((table.total() - 1.0).abs() < RATIO_TOLERANCE);
        let keys: Vec<&str> = table.categories().collect();
        assert_eq!(keys, vec!["1", "2", "3", "4", "5", "6", "7"]);
        assert!(RatioTable::uniform(Vec::<String>::new()).is_err());
    }
}
