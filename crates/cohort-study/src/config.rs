//! Configuration of the `study-definition` binary.

use std::path::PathBuf;

use chrono::NaiveDate;

use crate::error::{StudyError, StudyResult};

/// Environment variable naming the codelist directory.
pub const CODELIST_DIR_VAR: &str = "COHORT_CODELIST_DIR";
/// Environment variable holding the index date (`YYYY-MM-DD`).
pub const INDEX_DATE_VAR: &str = "COHORT_INDEX_DATE";
/// Environment variable naming the output file.
pub const OUTPUT_VAR: &str = "COHORT_OUTPUT";

/// Default codelist directory.
pub const DEFAULT_CODELIST_DIR: &str = "codelists";

/// Study configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudyConfig {
    /// Directory holding the codelist CSV files.
    pub codelist_dir: PathBuf,
    /// Index date of the study.
    pub index_date: NaiveDate,
    /// Output file; stdout when unset.
    pub output: Option<PathBuf>,
}

impl Default for StudyConfig {
    fn default() -> Self {
        Self {
            codelist_dir: PathBuf::from(DEFAULT_CODELIST_DIR),
            index_date: default_index_date(),
            output: None,
        }
    }
}

fn default_index_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 1, 1).unwrap_or_default()
}

impl StudyConfig {
    /// Reads the configuration from the process environment.
    ///
    /// # Errors
    /// Fails with [`StudyError::InvalidConfig`] for an unparsable index date.
    pub fn from_env() -> StudyResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`, falling back to defaults for
    /// unset or empty variables.
    pub fn from_lookup<F>(lookup: F) -> StudyResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let mut config = Self::default();

        if let Some(dir) = get(CODELIST_DIR_VAR) {
            config.codelist_dir = PathBuf::from(dir);
        }
        if let Some(value) = get(INDEX_DATE_VAR) {
            config.index_date = NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|e| {
                StudyError::InvalidConfig {
                    key: INDEX_DATE_VAR.to_string(),
                    value: value.clone(),
                    reason: e.to_string(),
                }
            })?;
        }
        config.output = get(OUTPUT_VAR).map(PathBuf::from);

        Ok(config)
    }

    /// Sets the index date.
    pub fn with_index_date(mut self, index_date: NaiveDate) -> Self {
        self.index_date = index_date;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = StudyConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, StudyConfig::default());
        assert_eq!(config.codelist_dir, PathBuf::from("codelists"));
        assert_eq!(config.index_date, NaiveDate::from_ymd_opt(2020, 1, 1).unwrap());
        assert!(config.output.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = StudyConfig::from_lookup(lookup(&[
            (CODELIST_DIR_VAR, "analysis/codelists"),
            (INDEX_DATE_VAR, "2021-06-01"),
            (OUTPUT_VAR, "output/study.json"),
        ]))
        .unwrap();
        assert_eq!(config.codelist_dir, PathBuf::from("analysis/codelists"));
        assert_eq!(config.index_date, NaiveDate::from_ymd_opt(2021, 6, 1).unwrap());
        assert_eq!(config.output, Some(PathBuf::from("output/study.json")));
    }

    #[test]
    fn test_empty_values_use_defaults() {
        let config = StudyConfig::from_lookup(lookup(&[(OUTPUT_VAR, "  ")])).unwrap();
        assert!(config.output.is_none());
    }

    #[test]
    fn test_invalid_index_date() {
        let err = StudyConfig::from_lookup(lookup(&[(INDEX_DATE_VAR, "2020-02-30")])).unwrap_err();
        assert!(matches!(
            err,
            StudyError::InvalidConfig { ref key, ref value, .. }
                if key == INDEX_DATE_VAR && value == "2020-02-30"
        ));
    }
}
