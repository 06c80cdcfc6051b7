//! Streaming codelist CSV parser.
//!
//! Codelist files are comma-separated with a header row. The parser locates
//! the declared code column (and optional category column) by header name and
//! yields one [`CodelistRow`] per data row.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use csv::{Reader, ReaderBuilder, StringRecord};
use cohort_types::{Codelist, CodingSystem};

use crate::types::{CodelistConfig, CodelistError, CodelistResult, LoadStats};

/// One data row of a codelist file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodelistRow {
    /// One-based line number in the source file.
    pub line: u64,
    /// The code.
    pub code: String,
    /// The category, when a category column was declared.
    pub category: Option<String>,
}

/// A streaming parser for codelist files.
pub struct CodelistParser<R: Read> {
    reader: Reader<R>,
    config: CodelistConfig,
    path: String,
    code_index: usize,
    category_index: Option<usize>,
    records_read: usize,
    blank_skipped: usize,
}

impl CodelistParser<BufReader<File>> {
    /// Creates a parser from a file path.
    ///
    /// # Errors
    /// Returns an error if the file does not exist, cannot be opened, or
    /// lacks a declared column.
    pub fn from_path<P: AsRef<Path>>(
        path: P,
        code_column: &str,
        category_column: Option<&str>,
        config: CodelistConfig,
    ) -> CodelistResult<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(CodelistError::FileNotFound {
                path: path.display().to_string(),
            });
        }

        let file = File::open(path)?;
        Self::from_reader(
            BufReader::new(file),
            path.display().to_string(),
            code_column,
            category_column,
            config,
        )
    }
}

impl<R: Read> CodelistParser<R> {
    /// Creates a parser from a reader. `path` labels error messages.
    pub fn from_reader(
        reader: R,
        path: impl Into<String>,
        code_column: &str,
        category_column: Option<&str>,
        config: CodelistConfig,
    ) -> CodelistResult<Self> {
        let path = path.into();
        let mut csv_reader = ReaderBuilder::new()
            .delimiter(config.delimiter)
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::None)
            .from_reader(reader);

        let headers = csv_reader.headers()?.clone();
        let code_index = column_index(&headers, code_column, &path)?;
        let category_index = category_column
            .map(|column| column_index(&headers, column, &path))
            .transpose()?;

        Ok(Self {
            reader: csv_reader,
            config,
            path,
            code_index,
            category_index,
            records_read: 0,
            blank_skipped: 0,
        })
    }

    /// Returns the number of data rows read so far.
    pub fn records_read(&self) -> usize {
        self.records_read
    }

    /// Returns the number of rows skipped for a blank code.
    pub fn blank_skipped(&self) -> usize {
        self.blank_skipped
    }

    /// Returns the path label of the source.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns true if rows carry categories.
    pub fn is_categorised(&self) -> bool {
        self.category_index.is_some()
    }

    fn field(&self, record: &StringRecord, index: usize) -> String {
        let value = record.get(index).unwrap_or("");
        if self.config.trim_values {
            value.trim().to_string()
        } else {
            value.to_string()
        }
    }

    /// Collects every row into a [`Codelist`].
    ///
    /// Duplicate rows collapse; a duplicate code with a different category is
    /// an error, as is a blank category in a categorised codelist.
    pub fn into_codelist(
        mut self,
        name: &str,
        system: CodingSystem,
    ) -> CodelistResult<(Codelist, LoadStats)> {
        let mut codelist = match self.category_index {
            Some(index) => {
                let column = self
                    .reader
                    .headers()?
                    .get(index)
                    .map(clean_header)
                    .unwrap_or_default()
                    .to_string();
                Codelist::categorised(name, system, column)
            }
            None => Codelist::new(name, system),
        }
        .with_source(self.path.clone());

        let mut duplicate_rows = 0;
        for row in self.by_ref() {
            let row = row?;
            if codelist.is_categorised() && row.category.as_deref().is_some_and(str::is_empty) {
                return Err(CodelistError::MissingCategory {
                    codelist: name.to_string(),
                    code: row.code,
                });
            }
            let added = codelist
                .insert(row.code, row.category)
                .map_err(|e| CodelistError::from_entry(name, e))?;
            if !added {
                duplicate_rows += 1;
            }
        }

        let stats = LoadStats {
            files: 1,
            rows_read: self.records_read,
            codes_kept: codelist.len(),
            blank_rows_skipped: self.blank_skipped,
            duplicate_rows,
        };
        Ok((codelist, stats))
    }
}

impl<R: Read> Iterator for CodelistParser<R> {
    type Item = CodelistResult<CodelistRow>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let mut record = StringRecord::new();
            match self.reader.read_record(&mut record) {
                Ok(true) => {
                    // Skip empty records
                    if record.iter().all(|f| f.trim().is_empty()) {
                        continue;
                    }
                    self.records_read += 1;

                    let line = record.position().map_or(0, |p| p.line());
                    let code = self.field(&record, self.code_index);
                    if code.trim().is_empty() {
                        if self.config.skip_blank_codes {
                            self.blank_skipped += 1;
                            continue;
                        }
                        return Some(Err(CodelistError::BlankCode {
                            path: self.path.clone(),
                            line,
                        }));
                    }

                    let category = self.category_index.map(|i| self.field(&record, i));
                    return Some(Ok(CodelistRow {
                        line,
                        code,
                        category,
                    }));
                }
                Ok(false) => return None,
                Err(e) => return Some(Err(e.into())),
            }
        }
    }
}

/// Strips a UTF-8 BOM and surrounding whitespace from a header name.
fn clean_header(header: &str) -> &str {
    header.trim_start_matches('\u{feff}').trim()
}

fn column_index(headers: &StringRecord, column: &str, path: &str) -> CodelistResult<usize> {
    headers
        .iter()
        .position(|h| clean_header(h) == column.trim())
        .ok_or_else(|| CodelistError::MissingColumn {
            column: column.to_string(),
            path: path.to_string(),
        })
}
