//! # cohort-loader
//!
//! Loads clinical codelists from CSV files into a [`CodelistCatalog`].
//!
//! Each codelist file has a header row naming a code column and, for
//! categorised codelists, a category column. The catalog keeps codelists in
//! declaration order and derives combined and category-filtered views.
//!
//! ## Features
//!
//! - `parallel` (default): Enables [`CodelistCatalog::load_all_parallel`] via rayon.

#![warn(missing_docs)]

mod catalog;
mod loader;
mod parser;
mod types;

pub use catalog::CodelistCatalog;
pub use loader::{discover_codelist_files, load, load_source, load_with_config};
pub use parser::{CodelistParser, CodelistRow};
pub use types::{CodelistConfig, CodelistError, CodelistResult, CodelistSource, LoadStats};

// Re-export cohort-types for convenience
pub use cohort_types;
