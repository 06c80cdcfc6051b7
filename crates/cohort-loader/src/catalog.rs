//! In-memory codelist catalog.
//!
//! The catalog owns every codelist a study uses, keyed by name in the order
//! they were declared. Codelists are loaded once and never modified; combined
//! and filtered views are derived on request.
//!
//! ```ignore
//! let mut catalog = CodelistCatalog::new("codelists");
//! catalog.load_all(&sources)?;
//!
//! let any_covid = catalog.combine(&[
//!     "covid_primary_care_code",
//!     "covid_primary_care_positive_test",
//!     "covid_primary_care_sequalae",
//! ])?;
//! let ever_smoked = catalog.filter_by_category("smoking_clear", ["S", "E"])?;
//! ```

use std::path::{Path, PathBuf};

use cohort_types::{Codelist, CombinedCodelist};
use indexmap::IndexMap;
use tracing::info;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::loader::load_source;
use crate::types::{CodelistConfig, CodelistError, CodelistResult, CodelistSource, LoadStats};

/// Named codelists loaded from a codelist directory.
#[derive(Debug, Clone)]
pub struct CodelistCatalog {
    root: PathBuf,
    config: CodelistConfig,
    codelists: IndexMap<String, Codelist>,
}

impl Default for CodelistCatalog {
    fn default() -> Self {
        Self::new(".")
    }
}

impl CodelistCatalog {
    /// Creates an empty catalog reading files relative to `root`.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self::with_config(root, CodelistConfig::default())
    }

    /// Creates an empty catalog with a custom parser configuration.
    pub fn with_config(root: impl AsRef<Path>, config: CodelistConfig) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            config,
            codelists: IndexMap::new(),
        }
    }

    /// Returns the directory codelist paths are resolved against.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Loads one declared codelist.
    ///
    /// # Errors
    /// Fails if the file cannot be loaded or the name is already taken.
    pub fn load_source(&mut self, source: &CodelistSource) -> CodelistResult<LoadStats> {
        self.ensure_vacant(&source.name)?;
        let (codelist, stats) = load_source(&self.root, source, &self.config)?;
        self.codelists.insert(source.name.clone(), codelist);
        Ok(stats)
    }

    /// Loads declared codelists one after another.
    pub fn load_all(&mut self, sources: &[CodelistSource]) -> CodelistResult<LoadStats> {
        let mut total = LoadStats::default();
        for source in sources {
            total += self.load_source(source)?;
        }

        info!(
            codelists = sources.len(),
            codes = total.codes_kept,
            rows = total.rows_read,
            "codelist catalog loaded"
        );
        Ok(total)
    }

    /// Loads declared codelists concurrently.
    ///
    /// Files are parsed in parallel; results are inserted in declaration
    /// order, so the catalog is identical to one built by [`Self::load_all`].
    #[cfg(feature = "parallel")]
    pub fn load_all_parallel(&mut self, sources: &[CodelistSource]) -> CodelistResult<LoadStats> {
        for (i, source) in sources.iter().enumerate() {
            self.ensure_vacant(&source.name)?;
            if sources[..i].iter().any(|s| s.name == source.name) {
                return Err(CodelistError::DuplicateCodelist {
                    name: source.name.clone(),
                });
            }
        }

        let root = &self.root;
        let config = &self.config;
        let loaded: Vec<CodelistResult<(Codelist, LoadStats)>> = sources
            .par_iter()
            .map(|source| load_source(root, source, config))
            .collect();

        let mut total = LoadStats::default();
        for (source, result) in sources.iter().zip(loaded) {
            let (codelist, stats) = result?;
            self.codelists.insert(source.name.clone(), codelist);
            total += stats;
        }

        info!(
            codelists = sources.len(),
            codes = total.codes_kept,
            rows = total.rows_read,
            "codelist catalog loaded in parallel"
        );
        Ok(total)
    }

    /// Adds an already-built codelist under its own name.
    ///
    /// # Errors
    /// Fails with [`CodelistError::DuplicateCodelist`] if the name is taken.
    pub fn insert(&mut self, codelist: Codelist) -> CodelistResult<()> {
        self.ensure_vacant(codelist.name())?;
        self.codelists.insert(codelist.name().to_string(), codelist);
        Ok(())
    }

    /// Returns a codelist by name.
    pub fn get(&self, name: &str) -> Option<&Codelist> {
        self.codelists.get(name)
    }

    /// Returns a codelist by name.
    ///
    /// # Errors
    /// Fails with [`CodelistError::CodelistNotFound`] if it is not loaded.
    pub fn require(&self, name: &str) -> CodelistResult<&Codelist> {
        self.get(name).ok_or_else(|| CodelistError::CodelistNotFound {
            name: name.to_string(),
        })
    }

    /// Returns the union of the named codelists.
    ///
    /// # Errors
    /// Fails if any name is not loaded.
    pub fn combine(&self, names: &[&str]) -> CodelistResult<CombinedCodelist> {
        let mut combined = CombinedCodelist::new();
        for name in names {
            combined.extend_from_codelist(self.require(name)?);
        }
        Ok(combined)
    }

    /// Returns the codes of `name` whose category is in `include`.
    ///
    /// # Errors
    /// Fails with [`CodelistError::CodelistNotFound`] if `name` is not loaded
    /// and [`CodelistError::InvalidCategory`] if it has no category column.
    pub fn filter_by_category<I, S>(&self, name: &str, include: I) -> CodelistResult<Codelist>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.require(name)?
            .filter_by_category(include)
            .map_err(|e| CodelistError::from_entry(name, e))
    }

    /// Returns the number of codelists.
    pub fn len(&self) -> usize {
        self.codelists.len()
    }

    /// Returns true if no codelists are loaded.
    pub fn is_empty(&self) -> bool {
        self.codelists.is_empty()
    }

    /// Iterates over codelist names in load order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.codelists.keys().map(String::as_str)
    }

    /// Iterates over codelists in load order.
    pub fn iter(&self) -> impl Iterator<Item = &Codelist> {
        self.codelists.values()
    }

    /// Returns the total number of codes across all codelists.
    pub fn total_codes(&self) -> usize {
        self.codelists.values().map(Codelist::len).sum()
    }

    fn ensure_vacant(&self, name: &str) -> CodelistResult<()> {
        if self.codelists.contains_key(name) {
            return Err(CodelistError::DuplicateCodelist {
                name: name.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cohort_types::CodingSystem;
    use std::fs;

    fn fixture() -> (tempfile::TempDir, Vec<CodelistSource>) {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("covid-code.csv"),
            "CTV3ID,term\nY20d1,Confirmed\nY20d2,Suspected\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("covid-test.csv"),
            "CTV3ID,term\nY20d1,Confirmed\nY228e,Positive test\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("smoking-clear.csv"),
            "CTV3Code,Category\n137R.,S\n137S.,N\n1372.,E\n",
        )
        .unwrap();

        let sources = vec![
            CodelistSource::new("covid_code", "covid-code.csv", CodingSystem::Ctv3, "CTV3ID"),
            CodelistSource::new("covid_test", "covid-test.csv", CodingSystem::Ctv3, "CTV3ID"),
            CodelistSource::new("smoking_clear", "smoking-clear.csv", CodingSystem::Ctv3, "CTV3Code")
                .with_category_column("Category"),
        ];
        (dir, sources)
    }

    #[test]
    fn test_load_all() {
        let (dir, sources) = fixture();
        let mut catalog = CodelistCatalog::new(dir.path());
        let stats = catalog.load_all(&sources).unwrap();

        assert_eq!(catalog.len(), 3);
        assert_eq!(stats.files, 3);
        assert_eq!(catalog.total_codes(), 7);
        let names: Vec<&str> = catalog.names().collect();
        assert_eq!(names, vec!["covid_code", "covid_test", "smoking_clear"]);
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn test_load_all_parallel_matches_sequential() {
        let (dir, sources) = fixture();
        let mut sequential = CodelistCatalog::new(dir.path());
        sequential.load_all(&sources).unwrap();
        let mut parallel = CodelistCatalog::new(dir.path());
        parallel.load_all_parallel(&sources).unwrap();

        assert!(sequential.names().eq(parallel.names()));
        assert!(sequential.iter().eq(parallel.iter()));
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn test_load_all_parallel_rejects_duplicate_names() {
        let (dir, mut sources) = fixture();
        sources.push(sources[0].clone());
        let mut catalog = CodelistCatalog::new(dir.path());
        let err = catalog.load_all_parallel(&sources).unwrap_err();
        assert!(matches!(err, CodelistError::DuplicateCodelist { .. }));
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_duplicate_and_missing() {
        let (dir, sources) = fixture();
        let mut catalog = CodelistCatalog::new(dir.path());
        catalog.load_source(&sources[0]).unwrap();

        let err = catalog.load_source(&sources[0]).unwrap_err();
        assert!(matches!(err, CodelistError::DuplicateCodelist { .. }));

        let err = catalog.require("dementia_codes").unwrap_err();
        assert_eq!(err.to_string(), "Codelist not found: dementia_codes");
    }

    #[test]
    fn test_combine_by_name() {
        let (dir, sources) = fixture();
        let mut catalog = CodelistCatalog::new(dir.path());
        catalog.load_all(&sources).unwrap();

        let ab = catalog.combine(&["covid_code", "covid_test"]).unwrap();
        let ba = catalog.combine(&["covid_test", "covid_code"]).unwrap();
        assert_eq!(ab.members(), ba.members());
        assert_eq!(ab.len(), 3);
        assert!(catalog.combine(&["covid_code", "absent"]).is_err());
    }

    #[test]
    fn test_filter_by_category() {
        let (dir, sources) = fixture();
        let mut catalog = CodelistCatalog::new(dir.path());
        catalog.load_all(&sources).unwrap();

        let ever = catalog.filter_by_category("smoking_clear", ["S", "E"]).unwrap();
        assert_eq!(ever.name(), "smoking_clear[E,S]");
        assert_eq!(ever.len(), 2);
        assert!(!ever.contains("137S."));

        let err = catalog.filter_by_category("covid_code", ["S"]).unwrap_err();
        assert!(matches!(err, CodelistError::InvalidCategory { ref name } if name == "covid_code"));
    }

    #[test]
    fn test_insert() {
        let mut catalog = CodelistCatalog::default();
        let mut codelist = Codelist::new("manual", CodingSystem::Snomed);
        codelist.insert("1240581000000104", None).unwrap();
        catalog.insert(codelist.clone()).unwrap();
        assert!(catalog.get("manual").is_some());
        assert!(catalog.insert(codelist).is_err());
    }
}
