//! Loader-specific types for codelist file processing.

use std::ops::AddAssign;
use std::path::{Path, PathBuf};

use cohort_types::{CodingSystem, EntryError, UnknownCodingSystem};
use thiserror::Error;

/// Errors that can occur while loading codelists.
#[derive(Error, Debug)]
pub enum CodelistError {
    /// I/O error reading a codelist file.
    #[error("IO error reading codelist file: {0}")]
    Io(#[from] std::io::Error),

    /// CSV parsing error.
    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    /// File not found.
    #[error("File not found: {path}")]
    FileNotFound {
        /// The path that was not found.
        path: String,
    },

    /// Directory not found.
    #[error("Directory not found: {path}")]
    DirectoryNotFound {
        /// The path that was not found.
        path: String,
    },

    /// A declared column is absent from the header row.
    #[error("Missing required column '{column}' in {path}")]
    MissingColumn {
        /// The name of the missing column.
        column: String,
        /// The file that was read.
        path: String,
    },

    /// A row has an empty code and blank codes are not skipped.
    #[error("Blank code on line {line} of {path}")]
    BlankCode {
        /// The file that was read.
        path: String,
        /// One-based line number.
        line: u64,
    },

    /// Unknown coding system tag.
    #[error(transparent)]
    UnknownCodingSystem(#[from] UnknownCodingSystem),

    /// A code appears twice with different categories.
    #[error("Code '{code}' in codelist '{codelist}' has conflicting categories '{existing}' and '{found}'")]
    ConflictingCategory {
        /// Codelist name.
        codelist: String,
        /// The duplicated code.
        code: String,
        /// Category seen first.
        existing: String,
        /// Category seen later.
        found: String,
    },

    /// A code in a categorised codelist has a blank category.
    #[error("Code '{code}' in categorised codelist '{codelist}' has no category")]
    MissingCategory {
        /// Codelist name.
        codelist: String,
        /// The uncategorised code.
        code: String,
    },

    /// No codelist with this name has been loaded.
    #[error("Codelist not found: {name}")]
    CodelistNotFound {
        /// The requested name.
        name: String,
    },

    /// A codelist with this name is already in the catalog.
    #[error("Codelist already loaded: {name}")]
    DuplicateCodelist {
        /// The repeated name.
        name: String,
    },

    /// Category filtering requested on a codelist without categories.
    #[error("Codelist '{name}' has no category column")]
    InvalidCategory {
        /// Codelist name.
        name: String,
    },
}

impl CodelistError {
    /// Attaches the codelist name to an entry-level error.
    pub fn from_entry(codelist: &str, error: EntryError) -> Self {
        let codelist = codelist.to_string();
        match error {
            EntryError::ConflictingCategory {
                code,
                existing,
                found,
            } => Self::ConflictingCategory {
                codelist,
                code,
                existing,
                found,
            },
            EntryError::MissingCategory { code } => Self::MissingCategory { codelist, code },
            EntryError::UnexpectedCategory { .. } => Self::InvalidCategory { name: codelist },
            EntryError::Uncategorised { name } => Self::InvalidCategory { name },
        }
    }
}

/// Result type for codelist operations.
pub type CodelistResult<T> = Result<T, CodelistError>;

/// Configuration for codelist parsing.
#[derive(Debug, Clone)]
pub struct CodelistConfig {
    /// Trim surrounding whitespace from codes and categories.
    pub trim_values: bool,
    /// Skip rows whose code is blank instead of failing.
    pub skip_blank_codes: bool,
    /// Field delimiter.
    pub delimiter: u8,
}

impl Default for CodelistConfig {
    fn default() -> Self {
        Self {
            trim_values: true,
            skip_blank_codes: true,
            delimiter: b',',
        }
    }
}

impl CodelistConfig {
    /// A configuration for tab-delimited exports.
    pub fn tab_delimited() -> Self {
        Self {
            delimiter: b'\t',
            ..Self::default()
        }
    }
}

/// Statistics from loading one or more codelist files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadStats {
    /// Files read.
    pub files: usize,
    /// Data rows read from the files.
    pub rows_read: usize,
    /// Distinct codes kept.
    pub codes_kept: usize,
    /// Rows skipped because the code was blank.
    pub blank_rows_skipped: usize,
    /// Rows repeating an earlier code with the same category.
    pub duplicate_rows: usize,
}

impl LoadStats {
    /// Returns the percentage of rows that produced a distinct code.
    pub fn keep_rate(&self) -> f64 {
        if self.rows_read == 0 {
            0.0
        } else {
            (self.codes_kept as f64 / self.rows_read as f64) * 100.0
        }
    }
}

impl AddAssign for LoadStats {
    fn add_assign(&mut self, other: Self) {
        self.files += other.files;
        self.rows_read += other.rows_read;
        self.codes_kept += other.codes_kept;
        self.blank_rows_skipped += other.blank_rows_skipped;
        self.duplicate_rows += other.duplicate_rows;
    }
}

/// Declaration of one codelist file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodelistSource {
    /// Name the codelist is registered under.
    pub name: String,
    /// Path of the CSV file, relative to the catalog root.
    pub path: PathBuf,
    /// Coding system of the code column.
    pub system: CodingSystem,
    /// Column holding the codes.
    pub code_column: String,
    /// Column holding per-code categories, for categorised codelists.
    pub category_column: Option<String>,
}

impl CodelistSource {
    /// Declares an uncategorised codelist.
    pub fn new(
        name: impl Into<String>,
        path: impl AsRef<Path>,
        system: CodingSystem,
        code_column: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            path: path.as_ref().to_path_buf(),
            system,
            code_column: code_column.into(),
            category_column: None,
        }
    }

    /// Declares the category column.
    pub fn with_category_column(mut self, column: impl Into<String>) -> Self {
        self.category_column = Some(column.into());
        self
    }

    /// Like [`CodelistSource::new`] but parses the coding system from its tag.
    ///
    /// # Errors
    /// Fails with [`CodelistError::UnknownCodingSystem`] for unknown tags.
    pub fn from_tag(
        name: impl Into<String>,
        path: impl AsRef<Path>,
        system: &str,
        code_column: impl Into<String>,
    ) -> CodelistResult<Self> {
        let system = system.parse::<CodingSystem>()?;
        Ok(Self::new(name, path, system, code_column))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codelist_config_default() {
        let config = CodelistConfig::default();
        assert!(config.trim_values);
        assert!(config.skip_blank_codes);
        assert_eq!(config.delimiter, b',');
        assert_eq!(CodelistConfig::tab_delimited().delimiter, b'\t');
    }

    #[test]
    fn test_load_stats_keep_rate() {
        let stats = LoadStats {
            rows_read: 100,
            codes_kept: 75,
            ..Default::default()
        };
        assert!((stats.keep_rate() - 75.0).abs() < 0.01);
        assert_eq!(LoadStats::default().keep_rate(), 0.0);
    }

    #[test]
    fn test_load_stats_add_assign() {
        let mut total = LoadStats::default();
        total += LoadStats {
            files: 1,
            rows_read: 10,
            codes_kept: 8,
            blank_rows_skipped: 1,
            duplicate_rows: 1,
        };
        total += LoadStats {
            files: 1,
            rows_read: 5,
            codes_kept: 5,
            ..Default::default()
        };
        assert_eq!(total.files, 2);
        assert_eq!(total.rows_read, 15);
        assert_eq!(total.codes_kept, 13);
    }

    #[test]
    fn test_source_from_tag() {
        let source = CodelistSource::from_tag("covid_codes", "covid.csv", "ICD10", "icd10_code")
            .unwrap()
            .with_category_column("group");
        assert_eq!(source.system, CodingSystem::Icd10);
        assert_eq!(source.category_column.as_deref(), Some("group"));

        let err = CodelistSource::from_tag("x", "x.csv", "read2", "code").unwrap_err();
        assert!(matches!(err, CodelistError::UnknownCodingSystem(_)));
    }

    #[test]
    fn test_from_entry_names_codelist() {
        let err = CodelistError::from_entry(
            "smoking_clear",
            EntryError::ConflictingCategory {
                code: "137R.".to_string(),
                existing: "S".to_string(),
                found: "E".to_string(),
            },
        );
        assert!(err.to_string().contains("smoking_clear"));
        assert!(err.to_string().contains("137R."));
    }
}
