//! Category dictionaries for `categorised_as` rules.
//!
//! A [`CategoryDictionary`] is an ordered list of rules. Rules are tried in
//! order and the first one whose condition holds names the category. The last
//! rule is always the unconditional default, so exactly one category resolves
//! for any input.
//!
//! Duplicate category keys never shadow each other silently: adjacent rules
//! with the same key are merged into a single rule whose condition is the
//! disjunction of theirs (identical under first-match evaluation), and a key
//! that reappears after a different key is rejected.
//!
//! # Examples
//!
//! ```
//! use cohort_types::{CategoryDictionary, CategoryRule, Condition, Row};
//!
//! let care_home = CategoryDictionary::from_rules(vec![
//!     CategoryRule::when("Yes", Condition::flag("nursing_home")),
//!     CategoryRule::when("Yes", Condition::flag("residential_home")),
//!     CategoryRule::otherwise("No"),
//! ])
//! .unwrap();
//!
//! assert_eq!(care_home.len(), 2);
//! let row = Row::new().with("residential_home", true);
//! assert_eq!(care_home.resolve(&row), "Yes");
//! assert_eq!(care_home.resolve(&Row::new()), "No");
//! ```

use std::collections::HashSet;
use std::fmt;

use indexmap::IndexMap;

use crate::{Condition, Row};

/// The keyword used for the default rule in the engine's textual form.
pub const DEFAULT_KEYWORD: &str = "DEFAULT";

/// A single categorisation rule.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "snake_case"))]
pub enum CategoryRule {
    /// Assigns `category` when `condition` holds.
    Condition {
        /// Category key.
        category: String,
        /// Condition that selects the category.
        condition: Condition,
    },
    /// Assigns `category` unconditionally.
    Default {
        /// Category key.
        category: String,
    },
}

impl CategoryRule {
    /// A conditional rule.
    pub fn when(category: impl Into<String>, condition: Condition) -> Self {
        Self::Condition {
            category: category.into(),
            condition,
        }
    }

    /// The unconditional fallback rule.
    pub fn otherwise(category: impl Into<String>) -> Self {
        Self::Default {
            category: category.into(),
        }
    }

    /// Returns the category key.
    pub fn category(&self) -> &str {
        match self {
            Self::Condition { category, .. } | Self::Default { category } => category,
        }
    }

    /// Returns the condition, or `None` for the default rule.
    pub fn condition(&self) -> Option<&Condition> {
        match self {
            Self::Condition { condition, .. } => Some(condition),
            Self::Default { .. } => None,
        }
    }

    /// Returns true if this rule matches the given row.
    pub fn matches(&self, row: &Row) -> bool {
        self.condition().is_none_or(|condition| condition.evaluate(row))
    }
}

/// Error type for malformed rule lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleError {
    /// The rule list is empty.
    Empty,
    /// The rule list does not end with a default rule.
    NonExhaustive,
    /// A default rule appears before the end, making later rules unreachable.
    MisplacedDefault {
        /// Position of the early default rule.
        position: usize,
    },
    /// A category key reappears after a different key.
    DuplicateCategory {
        /// The repeated key.
        category: String,
    },
}

impl fmt::Display for RuleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "category rule list is empty"),
            Self::NonExhaustive => {
                write!(f, "category rule list does not end with a {} rule", DEFAULT_KEYWORD)
            }
            Self::MisplacedDefault { position } => write!(
                f,
                "{} rule at position {} makes later rules unreachable",
                DEFAULT_KEYWORD, position
            ),
            Self::DuplicateCategory { category } => write!(
                f,
                "category '{}' appears in non-adjacent rules and would be shadowed",
                category
            ),
        }
    }
}

impl std::error::Error for RuleError {}

/// A validated, ordered list of category rules ending in a default.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct CategoryDictionary {
    rules: Vec<CategoryRule>,
}

impl CategoryDictionary {
    /// Validates and normalises a rule list.
    ///
    /// # Errors
    /// - [`RuleError::Empty`] for an empty list
    /// - [`RuleError::NonExhaustive`] when the last rule is conditional
    /// - [`RuleError::MisplacedDefault`] when a default rule is not last
    /// - [`RuleError::DuplicateCategory`] when a key reappears after another key
    pub fn from_rules(rules: Vec<CategoryRule>) -> Result<Self, RuleError> {
        let last = rules.len().checked_sub(1).ok_or(RuleError::Empty)?;

        for (position, rule) in rules.iter().enumerate() {
            if matches!(rule, CategoryRule::Default { .. }) && position != last {
                return Err(RuleError::MisplacedDefault { position });
            }
        }
        if !matches!(rules[last], CategoryRule::Default { .. }) {
            return Err(RuleError::NonExhaustive);
        }

        let mut merged: Vec<CategoryRule> = Vec::with_capacity(rules.len());
        let mut closed: HashSet<String> = HashSet::new();

        for rule in rules {
            if let Some(previous) = merged.last_mut() {
                if previous.category() == rule.category() {
                    *previous = merge_adjacent(previous.clone(), rule);
                    continue;
                }
                closed.insert(previous.category().to_string());
            }
            if closed.contains(rule.category()) {
                return Err(RuleError::DuplicateCategory {
                    category: rule.category().to_string(),
                });
            }
            merged.push(rule);
        }

        Ok(Self { rules: merged })
    }

    /// Returns the rules in evaluation order.
    pub fn rules(&self) -> &[CategoryRule] {
        &self.rules
    }

    /// Returns the number of distinct categories.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Always false: a valid dictionary has at least the default rule.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Returns the category keys in evaluation order.
    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(CategoryRule::category)
    }

    /// Returns the default category key.
    pub fn default_category(&self) -> &str {
        self.rules
            .last()
            .map(CategoryRule::category)
            .unwrap_or_default()
    }

    /// Returns the index of the first rule matching `row`.
    pub fn matching_rule(&self, row: &Row) -> usize {
        self.rules
            .iter()
            .position(|rule| rule.matches(row))
            .unwrap_or(self.rules.len().saturating_sub(1))
    }

    /// Resolves the category for one patient: first matching rule wins.
    pub fn resolve(&self, row: &Row) -> &str {
        self.rules[self.matching_rule(row)].category()
    }

    /// Returns the variable names read by any rule condition.
    pub fn references(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for condition in self.rules.iter().filter_map(CategoryRule::condition) {
            for name in condition.references() {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        names
    }

    /// Renders the engine's `{category: expression}` form, with the default
    /// rule written as `DEFAULT`.
    pub fn expressions(&self) -> IndexMap<String, String> {
        self.rules
            .iter()
            .map(|rule| {
                let expression = rule
                    .condition()
                    .map_or_else(|| DEFAULT_KEYWORD.to_string(), ToString::to_string);
                (rule.category().to_string(), expression)
            })
            .collect()
    }
}

fn merge_adjacent(previous: CategoryRule, next: CategoryRule) -> CategoryRule {
    match (previous, next) {
        (
            CategoryRule::Condition {
                category,
                condition,
            },
            CategoryRule::Condition {
                condition: extra, ..
            },
        ) => {
            let condition = match condition {
                Condition::Or(mut operands) => {
                    operands.push(extra);
                    Condition::Or(operands)
                }
                single => Condition::or([single, extra]),
            };
            CategoryRule::Condition { category, condition }
        }
        // A conditional rule followed by the default for the same key is
        // equivalent to the default alone.
        (_, default) => default,
    }
}
