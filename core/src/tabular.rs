//! Tabular record source/sink — the only place rows cross the process edge.
//!
//! RULE: Steps never open files. They read and write logical streams
//! ("quad_fposi.primary", "cicli_preview.detail", ...) through a
//! `TabularStore`. The CSV store maps stream names to paths; the memory
//! store backs the tests.
//!
//! An empty field is absence. It is mapped to `None` here and nowhere else.

use crate::error::{LgdError, LgdResult};
use csv::{ReaderBuilder, WriterBuilder};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

/// One input row, addressed by column name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    values: HashMap<String, Option<String>>,
}

impl Row {
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, Option<V>)>,
        K: Into<String>,
        V: Into<String>,
    {
        let values = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.map(Into::into).filter(|s: &String| !s.is_empty())))
            .collect();
        Self { values }
    }

    /// Value of `column`; `None` both for absent values and unknown columns.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.values.get(column).and_then(|v| v.as_deref())
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.values.contains_key(column)
    }
}

/// A header plus positional rows, as written by a step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub header: Vec<String>,
    pub rows:   Vec<Vec<Option<String>>>,
}

impl Table {
    pub fn new(header: Vec<String>) -> Self {
        Self { header, rows: Vec::new() }
    }

    pub fn push(&mut self, row: Vec<Option<String>>) {
        debug_assert_eq!(row.len(), self.header.len(), "row width must match header");
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Values of `column` across every row; `None` if the column is unknown.
    pub fn column(&self, column: &str) -> Option<Vec<Option<&str>>> {
        let idx = self.header.iter().position(|h| h == column)?;
        Some(self.rows.iter().map(|r| r[idx].as_deref()).collect())
    }

    /// Rows keyed by column name.
    pub fn to_rows(&self) -> Vec<Row> {
        self.rows
            .iter()
            .map(|r| Row::from_pairs(self.header.iter().cloned().zip(r.iter().cloned())))
            .collect()
    }

    fn check_columns(&self, stream: &str, required: &[String]) -> LgdResult<()> {
        let header: Vec<&str> = self.header.iter().map(String::as_str).collect();
        check_columns(stream, &header, required)
    }
}

fn check_columns(stream: &str, header: &[&str], required: &[String]) -> LgdResult<()> {
    for column in required {
        if !header.iter().any(|h| *h == column.as_str()) {
            return Err(LgdError::SchemaMismatch {
                stream: stream.to_string(),
                column: column.clone(),
            });
        }
    }
    Ok(())
}

/// The contract between steps and whatever holds the data.
pub trait TabularStore {
    /// Read every row of `stream`, failing with `SchemaMismatch` if any
    /// `required` column is missing from its header.
    fn read(&mut self, stream: &str, required: &[String]) -> LgdResult<Vec<Row>>;

    /// Replace the contents of `stream`.
    fn write(&mut self, stream: &str, table: &Table) -> LgdResult<()>;
}

// ── CSV ────────────────────────────────────────────────────────────

pub struct CsvStore {
    delimiter: u8,
    paths:     BTreeMap<String, PathBuf>,
}

impl CsvStore {
    pub fn new(delimiter: u8, paths: BTreeMap<String, PathBuf>) -> Self {
        Self { delimiter, paths }
    }

    fn path_for(&self, stream: &str) -> LgdResult<&PathBuf> {
        self.paths.get(stream).ok_or_else(|| {
            LgdError::Configuration(format!("no path configured for stream '{stream}'"))
        })
    }
}

impl TabularStore for CsvStore {
    fn read(&mut self, stream: &str, required: &[String]) -> LgdResult<Vec<Row>> {
        let path = self.path_for(stream)?;
        log::debug!("reading stream {stream} from {}", path.display());

        let mut rdr = ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(true)
            .from_path(path)?;

        let headers = rdr.headers()?.clone();
        let header_names: Vec<&str> = headers.iter().collect();
        check_columns(stream, &header_names, required)?;

        let mut rows = Vec::new();
        for record in rdr.records() {
            let record = record?;
            rows.push(Row::from_pairs(
                headers.iter().zip(record.iter()).map(|(h, v)| (h, Some(v))),
            ));
        }
        Ok(rows)
    }

    fn write(&mut self, stream: &str, table: &Table) -> LgdResult<()> {
        let path = self.path_for(stream)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let mut wtr = WriterBuilder::new()
            .delimiter(self.delimiter)
            .from_path(path)?;

        wtr.write_record(&table.header)?;
        for row in &table.rows {
            wtr.write_record(row.iter().map(|v| v.as_deref().unwrap_or("")))?;
        }
        wtr.flush()?;

        log::debug!("wrote {} rows to {}", table.len(), path.display());
        Ok(())
    }
}

// ── In-memory ──────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: HashMap<String, Table>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, stream: &str, table: Table) -> Self {
        self.tables.insert(stream.to_string(), table);
        self
    }

    pub fn table(&self, stream: &str) -> Option<&Table> {
        self.tables.get(stream)
    }
}

impl TabularStore for MemoryStore {
    fn read(&mut self, stream: &str, required: &[String]) -> LgdResult<Vec<Row>> {
        let table = self.tables.get(stream).ok_or_else(|| {
            LgdError::Configuration(format!("stream '{stream}' is not loaded"))
        })?;
        table.check_columns(stream, required)?;
        Ok(table.to_rows())
    }

    fn write(&mut self, stream: &str, table: &Table) -> LgdResult<()> {
        self.tables.insert(stream.to_string(), table.clone());
        Ok(())
    }
}
