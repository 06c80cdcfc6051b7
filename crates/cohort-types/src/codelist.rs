//! Codelist types.
//!
//! A [`Codelist`] is a named set of clinical codes from a single coding
//! system, optionally carrying a category label per code (for example the
//! 16-group ethnicity of each ethnicity code). A [`CombinedCodelist`] is the
//! membership-only union of several codelists.
//!
//! # Example
//!
//! ```
//! use cohort_types::{CodingSystem, Codelist, CombinedCodelist};
//!
//! let mut clinical = Codelist::new("covid_primary_care_code", CodingSystem::Ctv3);
//! clinical.insert("Y20d1", None).unwrap();
//!
//! let mut sequelae = Codelist::new("covid_primary_care_sequalae", CodingSystem::Ctv3);
//! sequelae.insert("Y20d2", None).unwrap();
//!
//! let any_code = CombinedCodelist::from_codelists([&clinical, &sequelae]);
//! assert_eq!(any_code.len(), 2);
//! assert!(any_code.contains(CodingSystem::Ctv3, "Y20d2"));
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::CodingSystem;

/// Errors raised while populating or slicing a [`Codelist`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryError {
    /// A categorised codelist received a code without a category.
    MissingCategory {
        /// The offending code.
        code: String,
    },
    /// An uncategorised codelist received a code with a category.
    UnexpectedCategory {
        /// The offending code.
        code: String,
    },
    /// The same code appeared twice with different categories.
    ConflictingCategory {
        /// The offending code.
        code: String,
        /// Category recorded first.
        existing: String,
        /// Category seen on the later row.
        found: String,
    },
    /// A category filter was applied to a codelist without categories.
    Uncategorised {
        /// Name of the codelist.
        name: String,
    },
}

impl fmt::Display for EntryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingCategory { code } => write!(f, "code '{}' has no category", code),
            Self::UnexpectedCategory { code } => {
                write!(f, "code '{}' has a category but the codelist is uncategorised", code)
            }
            Self::ConflictingCategory {
                code,
                existing,
                found,
            } => write!(
                f,
                "code '{}' listed with categories '{}' and '{}'",
                code, existing, found
            ),
            Self::Uncategorised { name } => {
                write!(f, "codelist '{}' has no category column", name)
            }
        }
    }
}

impl std::error::Error for EntryError {}

/// A single code qualified by its coding system.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CodeRef {
    /// Coding system of the code.
    pub system: CodingSystem,
    /// The code itself.
    pub code: String,
}

impl CodeRef {
    /// Creates a new code reference.
    pub fn new(system: CodingSystem, code: impl Into<String>) -> Self {
        Self {
            system,
            code: code.into(),
        }
    }
}

/// A named, single-system set of clinical codes.
///
/// Codes are kept in sorted order so that the produced study definition is
/// deterministic regardless of row order in the source file.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Codelist {
    name: String,
    system: CodingSystem,
    source: Option<String>,
    category_column: Option<String>,
    entries: BTreeMap<String, Option<String>>,
}

impl Codelist {
    /// Creates an empty, uncategorised codelist.
    pub fn new(name: impl Into<String>, system: CodingSystem) -> Self {
        Self {
            name: name.into(),
            system,
            source: None,
            category_column: None,
            entries: BTreeMap::new(),
        }
    }

    /// Creates an empty codelist whose codes each carry a category.
    pub fn categorised(
        name: impl Into<String>,
        system: CodingSystem,
        category_column: impl Into<String>,
    ) -> Self {
        Self {
            category_column: Some(category_column.into()),
            ..Self::new(name, system)
        }
    }

    /// Records the file this codelist was read from.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Adds a code.
    ///
    /// Returns `Ok(true)` when the code is new and `Ok(false)` when an
    /// identical entry already existed.
    ///
    /// # Errors
    /// Fails when the presence of `category` does not match the codelist kind,
    /// or when the code is already present with a different category.
    pub fn insert(
        &mut self,
        code: impl Into<String>,
        category: Option<String>,
    ) -> Result<bool, EntryError> {
        let code = code.into();
        match (&self.category_column, &category) {
            (Some(_), None) => return Err(EntryError::MissingCategory { code }),
            (None, Some(_)) => return Err(EntryError::UnexpectedCategory { code }),
            _ => {}
        }

        if let Some(existing) = self.entries.get(&code) {
            if *existing == category {
                return Ok(false);
            }
            return Err(EntryError::ConflictingCategory {
                code,
                existing: existing.clone().unwrap_or_default(),
                found: category.unwrap_or_default(),
            });
        }

        self.entries.insert(code, category);
        Ok(true)
    }

    /// Returns the codelist name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the coding system shared by every code.
    pub fn system(&self) -> CodingSystem {
        self.system
    }

    /// Returns the source file reference, if known.
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    /// Returns the category column name for categorised codelists.
    pub fn category_column(&self) -> Option<&str> {
        self.category_column.as_deref()
    }

    /// Returns true if every code carries a category.
    pub fn is_categorised(&self) -> bool {
        self.category_column.is_some()
    }

    /// Returns the number of codes.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the codelist has no codes.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns true if `code` is a member.
    pub fn contains(&self, code: &str) -> bool {
        self.entries.contains_key(code)
    }

    /// Returns the category of `code`, if it is a member of a categorised list.
    pub fn category(&self, code: &str) -> Option<&str> {
        self.entries.get(code).and_then(|c| c.as_deref())
    }

    /// Iterates over codes in sorted order.
    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Iterates over `(code, category)` pairs in sorted code order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.entries
            .iter()
            .map(|(code, category)| (code.as_str(), category.as_deref()))
    }

    /// Returns the distinct category labels.
    pub fn categories(&self) -> BTreeSet<&str> {
        self.entries.values().filter_map(|c| c.as_deref()).collect()
    }

    /// Returns every code qualified by this codelist's system.
    pub fn code_refs(&self) -> BTreeSet<CodeRef> {
        self.codes().map(|code| CodeRef::new(self.system, code)).collect()
    }

    /// Returns the subset of codes whose category is in `include`.
    ///
    /// The result keeps the category column and is named
    /// `<name>[cat1,cat2]` after the sorted included categories.
    ///
    /// # Errors
    /// Returns [`EntryError::Uncategorised`] if this codelist has no categories.
    pub fn filter_by_category<I, S>(&self, include: I) -> Result<Codelist, EntryError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if !self.is_categorised() {
            return Err(EntryError::Uncategorised {
                name: self.name.clone(),
            });
        }

        let include: BTreeSet<String> = include
            .into_iter()
            .map(|s| s.as_ref().to_string())
            .collect();
        let label = include.iter().cloned().collect::<Vec<_>>().join(",");

        let entries = self
            .entries
            .iter()
            .filter(|(_, category)| {
                category
                    .as_ref()
                    .is_some_and(|category| include.contains(category))
            })
            .map(|(code, category)| (code.clone(), category.clone()))
            .collect();

        Ok(Codelist {
            name: format!("{}[{}]", self.name, label),
            system: self.system,
            source: self.source.clone(),
            category_column: self.category_column.clone(),
            entries,
        })
    }
}

/// The union of several codelists, by `(system, code)` membership.
///
/// Categories are not carried: a combined list can only be used where a
/// lookup returns dates, counts or flags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CombinedCodelist {
    sources: BTreeSet<String>,
    members: BTreeSet<CodeRef>,
}

impl CombinedCodelist {
    /// Creates an empty combined codelist.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the union of the given codelists.
    pub fn from_codelists<'a, I>(codelists: I) -> Self
    where
        I: IntoIterator<Item = &'a Codelist>,
    {
        let mut combined = Self::new();
        for codelist in codelists {
            combined.extend_from_codelist(codelist);
        }
        combined
    }

    /// Adds every code of `codelist`.
    pub fn extend_from_codelist(&mut self, codelist: &Codelist) {
        self.sources.insert(codelist.name().to_string());
        self.members.extend(codelist.code_refs());
    }

    /// Adds every member of another combined codelist.
    pub fn extend_from_combined(&mut self, other: &CombinedCodelist) {
        self.sources.extend(other.sources.iter().cloned());
        self.members.extend(other.members.iter().cloned());
    }

    /// Returns the union of `self` and `other`.
    pub fn union(&self, other: &CombinedCodelist) -> CombinedCodelist {
        let mut combined = self.clone();
        combined.extend_from_combined(other);
        combined
    }

    /// Returns true if the code is a member.
    pub fn contains(&self, system: CodingSystem, code: &str) -> bool {
        self.members.contains(&CodeRef::new(system, code))
    }

    /// Returns the names of the codelists that were combined.
    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.sources.iter().map(String::as_str)
    }

    /// Returns the members in sorted order.
    pub fn members(&self) -> &BTreeSet<CodeRef> {
        &self.members
    }

    /// Returns the coding systems present.
    pub fn systems(&self) -> BTreeSet<CodingSystem> {
        self.members.iter().map(|m| m.system).collect()
    }

    /// Returns the number of distinct codes.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Returns true if there are no codes.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl From<&Codelist> for CombinedCodelist {
    fn from(codelist: &Codelist) -> Self {
        Self::from_codelists([codelist])
    }
}

/// The codes a lookup searches for.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "snake_case"))]
pub enum CodeSelection {
    /// A single codelist.
    Codelist(Codelist),
    /// A union of codelists.
    Combined(CombinedCodelist),
}

impl CodeSelection {
    /// Returns a human-readable label for logs and error messages.
    pub fn label(&self) -> String {
        match self {
            Self::Codelist(codelist) => codelist.name().to_string(),
            Self::Combined(combined) => combined.sources().collect::<Vec<_>>().join("+"),
        }
    }

    /// Returns true if the selection can return a per-code category.
    pub fn is_categorised(&self) -> bool {
        match self {
            Self::Codelist(codelist) => codelist.is_categorised(),
            Self::Combined(_) => false,
        }
    }

    /// Returns the number of codes selected.
    pub fn len(&self) -> usize {
        match self {
            Self::Codelist(codelist) => codelist.len(),
            Self::Combined(combined) => combined.len(),
        }
    }

    /// Returns true if nothing is selected.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the coding systems present.
    pub fn systems(&self) -> BTreeSet<CodingSystem> {
        match self {
            Self::Codelist(codelist) => BTreeSet::from([codelist.system()]),
            Self::Combined(combined) => combined.systems(),
        }
    }
}

impl From<Codelist> for CodeSelection {
    fn from(codelist: Codelist) -> Self {
        Self::Codelist(codelist)
    }
}

impl From<CombinedCodelist> for CodeSelection {
    fn from(combined: CombinedCodelist) -> Self {
        Self::Combined(combined)
    }
}
