//! # cohort-study
//!
//! Builds the study definition of an electronic-health-record cohort.
//!
//! The study is composed from three layers:
//!
//! - [`helpers`]: parametric category dictionaries (ethnicity groupings,
//!   deprivation N-tiles) and synthetic ratio tables.
//! - [`VariableSetBuilder`]: appends derived variables in evaluation order
//!   and rejects duplicate names, forward references and invalid rules as
//!   they are declared.
//! - [`build_study`]: the population, quality-assurance variables, death
//!   dates, fixed covariates and the [`common_variables`] of this study.
//!
//! The [`evaluate`] module resolves combination rules for one patient, given
//! the raw lookup values the extraction engine would return.
//!
//! ## Features
//!
//! - `parallel` (default): Loads codelists in parallel via rayon.
//!
//! ## Usage
//!
//! ```rust
//! use cohort_study::VariableSetBuilder;
//! use cohort_types::{CategoryRule, Condition, Expectations};
//!
//! let mut builder = VariableSetBuilder::new();
//! let result = builder.categorised_as(
//!     "cov_cat_smoking_status",
//!     vec![CategoryRule::when("S", Condition::eq("most_recent_smoking_code", "S"))],
//!     Vec::new(),
//!     Expectations::new(),
//! );
//! assert!(result.is_err());
//! ```

#![warn(missing_docs)]

mod builder;
pub mod codelists;
pub mod common_variables;
mod config;
mod error;
pub mod evaluate;
pub mod helpers;
mod study;

pub use builder::{VariableSet, VariableSetBuilder};
pub use common_variables::{add_common_variables, generate_variables};
pub use config::{
    StudyConfig, CODELIST_DIR_VAR, DEFAULT_CODELIST_DIR, INDEX_DATE_VAR, OUTPUT_VAR,
};
pub use error::{StudyError, StudyResult};
pub use evaluate::{evaluate_output, evaluate_rule, evaluate_set};
pub use helpers::{
    generate_deprivation_ntile_dictionary, generate_ethnicity_dictionary,
    generate_grouping_dictionary, generate_ntile_dictionary, generate_synthetic_ratio_table,
    generate_universal_expectations,
};
pub use study::{build_study, Population, StudyDefinition};

// Re-export the lower layers for convenience
pub use cohort_loader;
pub use cohort_types;
