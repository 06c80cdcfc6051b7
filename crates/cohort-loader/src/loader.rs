//! Codelist file discovery and loading utilities.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use cohort_types::{Codelist, CodingSystem};
use tracing::debug;

use crate::parser::CodelistParser;
use crate::types::{CodelistConfig, CodelistError, CodelistResult, CodelistSource, LoadStats};

/// Lists the `*.csv` files in a codelist directory, keyed by file stem.
///
/// Subdirectories are not searched.
pub fn discover_codelist_files<P: AsRef<Path>>(dir: P) -> CodelistResult<BTreeMap<String, PathBuf>> {
    let dir = dir.as_ref();

    if !dir.is_dir() {
        return Err(CodelistError::DirectoryNotFound {
            path: dir.display().to_string(),
        });
    }

    let mut files = BTreeMap::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }

        let path = entry.path();
        let is_csv = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
        if !is_csv {
            continue;
        }

        if let Some(stem) = path.file_stem() {
            files.insert(stem.to_string_lossy().into_owned(), path);
        }
    }

    debug!(dir = %dir.display(), count = files.len(), "discovered codelist files");
    Ok(files)
}

/// Loads one codelist file with the default configuration.
///
/// The codelist is named after the file stem.
///
/// # Errors
/// Fails with [`CodelistError::FileNotFound`] if the file is missing and
/// [`CodelistError::MissingColumn`] if a declared column is absent.
pub fn load<P: AsRef<Path>>(
    path: P,
    system: CodingSystem,
    code_column: &str,
    category_column: Option<&str>,
) -> CodelistResult<Codelist> {
    let path = path.as_ref();
    let name = codelist_name(path);
    load_with_config(&name, path, system, code_column, category_column, &CodelistConfig::default())
        .map(|(codelist, _)| codelist)
}

/// Loads one codelist file under `name`, returning parse statistics.
pub fn load_with_config<P: AsRef<Path>>(
    name: &str,
    path: P,
    system: CodingSystem,
    code_column: &str,
    category_column: Option<&str>,
    config: &CodelistConfig,
) -> CodelistResult<(Codelist, LoadStats)> {
    let path = path.as_ref();
    let parser = CodelistParser::from_path(path, code_column, category_column, config.clone())?;
    let (codelist, stats) = parser.into_codelist(name, system)?;

    debug!(
        codelist = name,
        system = %system,
        path = %path.display(),
        codes = stats.codes_kept,
        rows = stats.rows_read,
        "loaded codelist"
    );
    Ok((codelist, stats))
}

/// Loads a declared codelist relative to `root`.
pub fn load_source(
    root: &Path,
    source: &CodelistSource,
    config: &CodelistConfig,
) -> CodelistResult<(Codelist, LoadStats)> {
    load_with_config(
        &source.name,
        root.join(&source.path),
        source.system,
        &source.code_column,
        source.category_column.as_deref(),
        config,
    )
}

fn codelist_name(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_discover_codelist_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("opensafely-covid-identification.csv"), "icd10_code\nU071\n").unwrap();
        fs::write(dir.path().join("README.md"), "notes").unwrap();
        fs::write(dir.path().join("upper.CSV"), "code\n1\n").unwrap();
        fs::create_dir(dir.path().join("nested.csv")).unwrap();

        let files = discover_codelist_files(dir.path()).unwrap();
        let names: Vec<&str> = files.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["opensafely-covid-identification", "upper"]);
    }

    #[test]
    fn test_discover_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let err = discover_codelist_files(dir.path().join("absent")).unwrap_err();
        assert!(matches!(err, CodelistError::DirectoryNotFound { .. }));
    }

    #[test]
    fn test_load_names_by_stem() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("opensafely-covid-identification.csv");
        fs::write(&path, "icd10_code,description\nU071,COVID-19 virus identified\nU072,COVID-19 virus not identified\n").unwrap();

        let codelist = load(&path, CodingSystem::Icd10, "icd10_code", None).unwrap();
        assert_eq!(codelist.name(), "opensafely-covid-identification");
        assert_eq!(codelist.len(), 2);
        assert!(codelist.contains("U071"));
        assert_eq!(codelist.source(), Some(path.display().to_string().as_str()));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load(dir.path().join("absent.csv"), CodingSystem::Ctv3, "CTV3ID", None).unwrap_err();
        assert!(matches!(err, CodelistError::FileNotFound { .. }));
    }

    #[test]
    fn test_load_source_relative_to_root() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("opensafely-ethnicity.csv"),
            "Code,Grouping_6,Grouping_16\nXaJQk,1,1\nXaJQl,1,2\nXactH,3,8\n",
        )
        .unwrap();

        let source = CodelistSource::new(
            "opensafely_ethnicity_codes_6",
            "opensafely-ethnicity.csv",
            CodingSystem::Ctv3,
            "Code",
        )
        .with_category_column("Grouping_6");

        let (codelist, stats) = load_source(dir.path(), &source, &CodelistConfig::default()).unwrap();
        assert_eq!(codelist.name(), "opensafely_ethnicity_codes_6");
        assert_eq!(codelist.categories().into_iter().collect::<Vec<_>>(), vec!["1", "3"]);
        assert_eq!(stats.files, 1);
        assert_eq!(stats.codes_kept, 3);
    }
}
