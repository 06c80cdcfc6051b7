//! Error types for study definition building.

use cohort_loader::CodelistError;
use cohort_types::{
    ExpectationError, RatioError, Returning, RuleError, ValueKind, WindowError,
};
use thiserror::Error;

/// Errors raised while building or evaluating a study definition.
#[derive(Error, Debug)]
pub enum StudyError {
    /// Codelist loading or lookup failed.
    #[error(transparent)]
    Codelist(#[from] CodelistError),

    /// A generated grouping needs at least one group.
    #[error("Invalid group count: {count} (at least 1 group required)")]
    InvalidGroupCount {
        /// The requested count.
        count: usize,
    },

    /// A grouping dictionary needs at least one source variable.
    #[error("Grouping dictionary needs at least one source variable")]
    InvalidGroupingSources,

    /// An N-tile range is empty or not finite.
    #[error("Invalid range [{min}, {max}] for '{source_variable}'")]
    InvalidRange {
        /// Variable being banded.
        source_variable: String,
        /// Lower end.
        min: f64,
        /// Upper end.
        max: f64,
    },

    /// A variable name was declared twice.
    #[error("Variable '{name}' is already declared")]
    DuplicateVariable {
        /// The repeated name.
        name: String,
    },

    /// A rule reads a variable that has not been declared earlier.
    #[error("Variable '{variable}' references undeclared variable '{reference}'")]
    UnresolvedReference {
        /// Variable being declared.
        variable: String,
        /// The missing reference.
        reference: String,
    },

    /// `minimum_of` or `maximum_of` without inputs.
    #[error("Aggregate variable '{variable}' has no inputs")]
    EmptyAggregate {
        /// Variable being declared.
        variable: String,
    },

    /// A category rule list has no terminal default.
    #[error("Category rules for '{variable}' have no DEFAULT rule")]
    NonExhaustiveRule {
        /// Variable being declared.
        variable: String,
    },

    /// A category key reappears after a different key.
    #[error("Category '{category}' of '{variable}' appears in non-adjacent rules")]
    DuplicateCategory {
        /// Variable being declared.
        variable: String,
        /// The repeated category.
        category: String,
    },

    /// The default rule is not last.
    #[error("DEFAULT rule of '{variable}' at position {position} is not last")]
    MisplacedDefault {
        /// Variable being declared.
        variable: String,
        /// Zero-based rule position.
        position: usize,
    },

    /// A lookup window ends before it starts.
    #[error("Invalid window for '{variable}': {source}")]
    InvalidWindow {
        /// Variable being declared.
        variable: String,
        /// The window problem.
        source: WindowError,
    },

    /// `returning = category` against a codelist without categories.
    #[error("Variable '{variable}' returns categories but codelist '{codelist}' has none")]
    InvalidCategory {
        /// Variable being declared.
        variable: String,
        /// The uncategorised codelist.
        codelist: String,
    },

    /// A lookup primitive cannot produce the requested return type.
    #[error("Variable '{variable}': {query} cannot return {returning}")]
    IncompatibleReturning {
        /// Variable being declared.
        variable: String,
        /// Engine primitive.
        query: &'static str,
        /// Requested return type.
        returning: Returning,
    },

    /// Aggregate inputs of different kinds.
    #[error("Variable '{variable}' expects {expected} inputs but found {found}")]
    TypeMismatch {
        /// Variable being declared or evaluated.
        variable: String,
        /// Kind of the first input.
        expected: ValueKind,
        /// Conflicting kind.
        found: ValueKind,
    },

    /// A calendar date that does not exist.
    #[error("Invalid date: {value}")]
    InvalidDate {
        /// The date as written.
        value: String,
    },

    /// Invalid ratio table.
    #[error("Invalid ratio table: {0}")]
    Ratio(#[from] RatioError),

    /// Invalid expectations.
    #[error("Invalid expectations: {0}")]
    Expectation(#[from] ExpectationError),

    /// Invalid configuration value.
    #[error("Invalid configuration {key}={value}: {reason}")]
    InvalidConfig {
        /// Environment variable name.
        key: String,
        /// The offending value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// I/O error writing the artifact.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialisation error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StudyError {
    /// Attaches the variable name to a category rule error.
    pub fn from_rule(variable: &str, error: RuleError) -> Self {
        let variable = variable.to_string();
        match error {
            RuleError::Empty | RuleError::NonExhaustive => Self::NonExhaustiveRule { variable },
            RuleError::MisplacedDefault { position } => Self::MisplacedDefault { variable, position },
            RuleError::DuplicateCategory { category } => {
                Self::DuplicateCategory { variable, category }
            }
        }
    }
}

/// Result type for study operations.
pub type StudyResult<T> = Result<T, StudyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_rule() {
        let err = StudyError::from_rule("cov_cat_smoking_status", RuleError::NonExhaustive);
        assert!(matches!(err, StudyError::NonExhaustiveRule { ref variable } if variable == "cov_cat_smoking_status"));

        let err = StudyError::from_rule(
            "cov_bin_carehome_status",
            RuleError::DuplicateCategory {
                category: "Yes".to_string(),
            },
        );
        assert_eq!(
            err.to_string(),
            "Category 'Yes' of 'cov_bin_carehome_status' appears in non-adjacent rules"
        );
    }

    #[test]
    fn test_codelist_error_is_transparent() {
        let err: StudyError = CodelistError::CodelistNotFound {
            name: "hf_icd10".to_string(),
        }
        .into();
        assert_eq!(err.to_string(), "Codelist not found: hf_icd10");
    }
}
