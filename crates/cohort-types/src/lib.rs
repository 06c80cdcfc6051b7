//! # cohort-types
//!
//! Type definitions for electronic-health-record cohort study definitions.
//!
//! This crate provides the data model shared by the codelist loader and the
//! study builder: clinical codelists and their coding systems, typed
//! conditions and category dictionaries, date windows, engine lookup
//! primitives and the per-patient values the reference evaluator works on.
//!
//! ## Features
//!
//! - `serde` (default): Enables serialization/deserialization support via serde.
//!
//! ## Usage
//!
//! ```rust
//! use cohort_types::{Codelist, CodingSystem, CombinedCodelist};
//!
//! let mut clinical = Codelist::new("covid_primary_care_code", CodingSystem::Ctv3);
//! clinical.insert("Y20d1", None).unwrap();
//! let mut test = Codelist::new("covid_primary_care_positive_test", CodingSystem::Ctv3);
//! test.insert("Y20d1", None).unwrap();
//! test.insert("Y228e", None).unwrap();
//!
//! let any_code = CombinedCodelist::from_codelists([&clinical, &test]);
//! assert_eq!(any_code.len(), 2);
//! assert!(any_code.contains(CodingSystem::Ctv3, "Y228e"));
//! ```

#![warn(missing_docs)]

mod category;
mod codelist;
mod condition;
mod expectations;
mod ratio;
mod system;
mod value;
mod variable;
mod window;

pub use category::{CategoryDictionary, CategoryRule, RuleError, DEFAULT_KEYWORD};
pub use codelist::{CodeRef, CodeSelection, Codelist, CombinedCodelist, EntryError};
pub use condition::{CmpOp, Condition, Literal};
pub use expectations::{
    DateRange, ExpectationError, Expectations, FloatDistribution, IntDistribution, Rate,
};
pub use ratio::{RatioError, RatioTable, RATIO_TOLERANCE};
pub use system::{CodingSystem, UnknownCodingSystem};
pub use value::{Row, Value, ValueKind};
pub use variable::{
    DateFormat, FindMatch, Period, Query, Returning, Rule, TestResult, VariableSpec,
};
pub use window::{DateBound, DateWindow, OffsetUnit, WindowError};
