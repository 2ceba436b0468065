//! CSV-backed event classification for Dreadsylvania.
//!
//! [`CsvLoader`] reads pattern tables such as `dread.csv` from the database
//! folder and caches them by file name. [`ClassifierTable`] compiles the
//! rows once and annotates raid log events with the single row whose
//! `category` and `regex` match them.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use dungeon_types::{ClassifierRow, Event};
use regex::Regex;
use tracing::{debug, error, info};

/// File name of the Dreadsylvania pattern table.
pub const DREAD_CSV: &str = "dread.csv";

/// Categories kept in a classified Dreadsylvania log.
pub const DREAD_CATEGORIES: [&str; 4] = ["The Village", "The Woods", "The Castle", "Miscellaneous"];

/// Errors raised while loading or applying a classifier table.
#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    /// The CSV file could not be read or parsed.
    #[error("failed to read classifier table {file}: {source}")]
    Csv {
        /// The file being loaded.
        file: String,
        /// The underlying CSV error.
        source: csv::Error,
    },

    /// A non-empty row lacks a required column.
    #[error("classifier table {file} row {row} has no {column}")]
    MissingColumn {
        /// The file being loaded.
        file: String,
        /// 1-based data row number.
        row: usize,
        /// The missing column name.
        column: &'static str,
    },

    /// A row's regex does not compile.
    #[error("invalid classifier pattern {pattern}: {source}")]
    BadPattern {
        /// The pattern text.
        pattern: String,
        /// The underlying regex error.
        source: regex::Error,
    },

    /// Two rows match the same event.
    #[error(
        "duplicate classifier match in {category}: {first:?} and {second:?} both match {event:?}"
    )]
    DuplicateMatch {
        /// The event's category.
        category: String,
        /// The first matching pattern.
        first: String,
        /// The second matching pattern.
        second: String,
        /// The event text.
        event: String,
    },
}

// ---------------------------------------------------------------------------
// Loader
// ---------------------------------------------------------------------------

/// Reads classifier tables from a folder and caches them by file name.
#[derive(Debug)]
pub struct CsvLoader {
    folder: PathBuf,
    cache: Mutex<HashMap<String, Arc<[ClassifierRow]>>>,
}

impl CsvLoader {
    /// Create a loader over `folder`.
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: folder.into(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Load `file`, returning the cached rows on repeat calls.
    ///
    /// Empty fields are dropped from each row and rows with no non-empty
    /// field are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`ClassifierError::Csv`] if the file cannot be read and
    /// [`ClassifierError::MissingColumn`] if a row lacks `category` or
    /// `regex`.
    pub fn load(&self, file: &str) -> Result<Arc<[ClassifierRow]>, ClassifierError> {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(rows) = cache.get(file) {
            return Ok(Arc::clone(rows));
        }

        let path = self.folder.join(file);
        let rows: Arc<[ClassifierRow]> = read_rows(&path, file)?.into();
        info!(file, rows = rows.len(), "classifier table loaded");
        cache.insert(file.to_owned(), Arc::clone(&rows));
        Ok(rows)
    }
}

fn read_rows(path: &Path, file: &str) -> Result<Vec<ClassifierRow>, ClassifierError> {
    let csv_error = |source| ClassifierError::Csv {
        file: file.to_owned(),
        source,
    };

    let mut reader = csv::Reader::from_path(path).map_err(csv_error)?;
    let headers = reader.headers().map_err(csv_error)?.clone();

    let mut rows = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record.map_err(csv_error)?;
        let mut fields: BTreeMap<String, String> = headers
            .iter()
            .zip(record.iter())
            .filter(|(_, value)| !value.is_empty())
            .map(|(name, value)| (name.to_owned(), value.to_owned()))
            .collect();
        if fields.is_empty() {
            continue;
        }

        let row_number = index.saturating_add(1);
        let missing = |column| ClassifierError::MissingColumn {
            file: file.to_owned(),
            row: row_number,
            column,
        };
        let category = fields.remove("category").ok_or_else(|| missing("category"))?;
        let regex = fields.remove("regex").ok_or_else(|| missing("regex"))?;
        let zone = fields.remove("zone");
        let subzone = fields.remove("subzone");

        rows.push(ClassifierRow {
            category,
            regex,
            zone,
            subzone,
            extra: fields,
        });
    }
    Ok(rows)
}

// ---------------------------------------------------------------------------
// Table
// ---------------------------------------------------------------------------

/// A compiled classifier table.
#[derive(Debug, Clone)]
pub struct ClassifierTable {
    rows: Arc<[ClassifierRow]>,
    patterns: Vec<Regex>,
}

impl ClassifierTable {
    /// Compile every row's regex.
    ///
    /// # Errors
    ///
    /// Returns [`ClassifierError::BadPattern`] naming the first pattern that
    /// fails to compile.
    pub fn new(rows: Arc<[ClassifierRow]>) -> Result<Self, ClassifierError> {
        let patterns = rows
            .iter()
            .map(|row| {
                Regex::new(&row.regex).map_err(|source| ClassifierError::BadPattern {
                    pattern: row.regex.clone(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rows, patterns })
    }

    /// Load `file` through `loader` and compile it.
    ///
    /// # Errors
    ///
    /// Any load or compile error.
    pub fn load(loader: &CsvLoader, file: &str) -> Result<Self, ClassifierError> {
        Self::new(loader.load(file)?)
    }

    /// The raw rows, shared with modules as auxiliary init data.
    pub const fn rows(&self) -> &Arc<[ClassifierRow]> {
        &self.rows
    }

    /// Annotate each event with its matching row.
    ///
    /// An event matching no row keeps `db_match = None`.
    ///
    /// # Errors
    ///
    /// Returns [`ClassifierError::DuplicateMatch`] if two rows match one
    /// event. The whole batch fails.
    pub fn classify(&self, events: &[Event]) -> Result<Vec<Event>, ClassifierError> {
        events
            .iter()
            .map(|event| {
                let mut classified = event.clone();
                classified.db_match = self.find_match(event)?.cloned();
                Ok(classified)
            })
            .collect()
    }

    fn find_match(&self, event: &Event) -> Result<Option<&ClassifierRow>, ClassifierError> {
        let category = event.category.trim();
        let mut found: Option<&ClassifierRow> = None;

        for (row, pattern) in self.rows.iter().zip(&self.patterns) {
            if row.category.trim() != category || !pattern.is_match(&event.event) {
                continue;
            }
            if let Some(first) = found {
                error!(
                    category,
                    first = %first.regex,
                    second = %row.regex,
                    event = %event.event,
                    "duplicate classifier match"
                );
                return Err(ClassifierError::DuplicateMatch {
                    category: category.to_owned(),
                    first: first.regex.clone(),
                    second: row.regex.clone(),
                    event: event.event.clone(),
                });
            }
            found = Some(row);
        }

        if found.is_none() {
            debug!(category, event = %event.event, "event matched no classifier row");
        }
        Ok(found)
    }
}
