//! Flat-file record store.
//!
//! The ledger talks to its storage through [`RecordStore`] so a
//! lock-protected or transactional backend can be swapped in without
//! touching the pipeline logic. [`CsvStore`] is the shipped implementation:
//! one delimited file per store, re-read on every operation.

use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::record::{ParcelRecord, COLUMNS};

/// Narrow open/read-all/write-all interface over one record store.
pub trait RecordStore {
    fn read_all(&self) -> Result<Vec<ParcelRecord>>;
    fn write_all(&self, rows: &[ParcelRecord]) -> Result<()>;
}

/// Delimited flat file with a fixed header row.
pub struct CsvStore {
    path: PathBuf,
}

impl CsvStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl RecordStore for CsvStore {
    /// A missing file reads as an empty store. Unknown columns are ignored
    /// and missing columns default to empty strings.
    fn read_all(&self) -> Result<Vec<ParcelRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let mut reader = csv::Reader::from_path(&self.path)
            .with_context(|| format!("failed to open record store {}", self.path.display()))?;
        let mut rows = Vec::new();
        for result in reader.deserialize() {
            let record: ParcelRecord = result
                .with_context(|| format!("malformed row in {}", self.path.display()))?;
            rows.push(record);
        }
        Ok(rows)
    }

    /// Rewrites the whole file. An empty row set leaves a header-only file.
    fn write_all(&self, rows: &[ParcelRecord]) -> Result<()> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(&self.path)
            .with_context(|| format!("failed to open record store {}", self.path.display()))?;
        writer.write_record(COLUMNS)?;
        for row in rows {
            writer.serialize(row)?;
        }
        writer
            .flush()
            .with_context(|| format!("failed to persist record store {}", self.path.display()))?;
        Ok(())
    }
}
