//! Day-scoped parcel ledger.
//!
//! Owns the active record store and the day-boundary marker. Serial numbers
//! stay contiguous 1..N within the active store; label IDs embed the day
//! stamp and a zero-padded daily serial. The day-boundary check runs before
//! every operation that reads or appends the active store and is the sole
//! trigger for archival.
//!
//! Single-writer: the process serializes access to a `Ledger` (see
//! `AppState`); the store files themselves carry no locks.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveDate};
use thiserror::Error;
use tracing::info;

use crate::classify::FieldMap;
use crate::directory::{RecipientDirectory, RecipientEntry};
use crate::record::{ParcelRecord, MAIL_PENDING, PICKED_DEFAULT, STATUS_PENDING};
use crate::store::{CsvStore, RecordStore};

/// Which record store an operation targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreSelector {
    Active,
    Archive(String),
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("record {0} not found")]
    NotFound(u32),
    #[error("invalid archive name: {0}")]
    BadSelector(String),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

pub struct Ledger {
    data_file: PathBuf,
    archive_dir: PathBuf,
    marker_file: PathBuf,
    directory: RecipientDirectory,
}

impl Ledger {
    pub fn new(
        data_file: impl Into<PathBuf>,
        archive_dir: impl Into<PathBuf>,
        marker_file: impl Into<PathBuf>,
        directory: RecipientDirectory,
    ) -> Self {
        Self {
            data_file: data_file.into(),
            archive_dir: archive_dir.into(),
            marker_file: marker_file.into(),
            directory,
        }
    }

    // ── Day boundary ────────────────────────────────────────────────────

    /// Archive and reset the active store when the stored marker date is
    /// older than today; always rewrite the marker afterward. Calling this
    /// twice within one day archives nothing the second time.
    pub fn check_day_boundary(&self) -> Result<()> {
        let now = Local::now();
        self.check_day_boundary_at(now.date_naive(), &archive_stamp(&now))
    }

    fn check_day_boundary_at(&self, today: NaiveDate, stamp: &str) -> Result<()> {
        let today_str = today.format("%Y-%m-%d").to_string();
        let marker = self.read_marker()?;
        if !marker.is_empty() && marker != today_str && self.data_file.exists() {
            let rows = self.active_store().read_all()?;
            if !rows.is_empty() {
                std::fs::create_dir_all(&self.archive_dir).with_context(|| {
                    format!("failed to create archive dir {}", self.archive_dir.display())
                })?;
                let archive_path = self.unique_archive_path(&marker, stamp);
                std::fs::copy(&self.data_file, &archive_path).with_context(|| {
                    format!("failed to archive ledger to {}", archive_path.display())
                })?;
                info!(
                    "archived {} records from {} to {}",
                    rows.len(),
                    marker,
                    archive_path.display()
                );
                self.active_store().write_all(&[])?;
            }
        }
        self.write_marker(&today_str)
    }

    /// Archive name: `<stem>_<previous-date>_<timestamp>.csv`, with a
    /// numeric suffix when repeated resets land on the same timestamp.
    fn unique_archive_path(&self, previous: &str, stamp: &str) -> PathBuf {
        let stem = self
            .data_file
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("data");
        let base = format!("{stem}_{previous}_{stamp}");
        let mut candidate = self.archive_dir.join(format!("{base}.csv"));
        let mut n = 2;
        while candidate.exists() {
            candidate = self.archive_dir.join(format!("{base}_{n}.csv"));
            n += 1;
        }
        candidate
    }

    fn read_marker(&self) -> Result<String> {
        if !self.marker_file.exists() {
            return Ok(String::new());
        }
        let marker = std::fs::read_to_string(&self.marker_file)
            .with_context(|| format!("failed to read marker {}", self.marker_file.display()))?;
        Ok(marker.trim().to_string())
    }

    fn write_marker(&self, date: &str) -> Result<()> {
        std::fs::write(&self.marker_file, date)
            .with_context(|| format!("failed to write marker {}", self.marker_file.display()))
    }

    // ── Record operations ───────────────────────────────────────────────

    /// Append one parcel built from extracted (or manually entered) fields.
    /// Directory hits fill identity gaps keyed by the input roll number
    /// first, then the input phone. Returns the stored record.
    pub fn append(&self, fields: &FieldMap) -> Result<ParcelRecord> {
        self.append_at(fields, Local::now())
    }

    /// Manual blank-row insert: serial, label ID, arrival time, and the
    /// default states only.
    pub fn append_blank(&self) -> Result<ParcelRecord> {
        self.append(&FieldMap::default())
    }

    fn append_at(&self, fields: &FieldMap, now: DateTime<Local>) -> Result<ParcelRecord> {
        self.check_day_boundary_at(now.date_naive(), &archive_stamp(&now))?;
        let store = self.active_store();
        let mut rows = store.read_all()?;
        let serial = rows.len() as u32 + 1;

        let mut record = ParcelRecord {
            serial,
            label_id: format!("{}-{serial:04}", now.format("%Y%m%d")),
            roll_no: fields.roll_no.clone(),
            name: fields.name.clone(),
            company: fields.company.clone(),
            awb: fields.awb.clone(),
            phone: fields.phone.clone(),
            time: now.format("%Y-%m-%d %H:%M:%S").to_string(),
            picked: PICKED_DEFAULT.to_string(),
            status: STATUS_PENDING.to_string(),
            mail_status: MAIL_PENDING.to_string(),
            ..Default::default()
        };

        // Lookup is keyed by the caller-supplied fields, not merged data.
        if let Some(entry) = self
            .directory
            .lookup(&fields.roll_no)
            .or_else(|| self.directory.lookup(&fields.phone))
        {
            merge_directory(&mut record, &entry);
        }

        rows.push(record.clone());
        store.write_all(&rows)?;
        Ok(record)
    }

    /// List the selected store. Targeting the active store runs the day
    /// boundary check first.
    pub fn records(&self, selector: &StoreSelector) -> Result<Vec<ParcelRecord>, LedgerError> {
        let store = self.resolve(selector)?;
        if *selector == StoreSelector::Active {
            self.check_day_boundary()?;
        }
        Ok(store.read_all()?)
    }

    /// Persist a full row set back to the selected store.
    pub fn write_back(
        &self,
        rows: &[ParcelRecord],
        selector: &StoreSelector,
    ) -> Result<(), LedgerError> {
        let store = self.resolve(selector)?;
        Ok(store.write_all(rows)?)
    }

    /// Merge caller-supplied column edits into one record. When the edit
    /// includes a roll number or phone, the directory merge re-runs with
    /// the same gap-filling rules as append.
    pub fn update(
        &self,
        serial: u32,
        changes: &HashMap<String, String>,
        selector: &StoreSelector,
    ) -> Result<ParcelRecord, LedgerError> {
        let store = self.resolve(selector)?;
        if *selector == StoreSelector::Active {
            self.check_day_boundary()?;
        }
        let mut rows = store.read_all()?;
        let row = rows
            .iter_mut()
            .find(|r| r.serial == serial)
            .ok_or(LedgerError::NotFound(serial))?;

        for (column, value) in changes {
            row.set_field(column, value);
        }

        let roll = changes.get("Roll No").map(String::as_str).unwrap_or("");
        let phone = changes.get("Phone No").map(String::as_str).unwrap_or("");
        if !roll.is_empty() || !phone.is_empty() {
            if let Some(entry) = self
                .directory
                .lookup(roll)
                .or_else(|| self.directory.lookup(phone))
            {
                merge_directory(row, &entry);
            }
        }

        let updated = row.clone();
        store.write_all(&rows)?;
        Ok(updated)
    }

    /// Remove one record and re-number the survivors 1..N — a full
    /// re-index, not a soft delete.
    pub fn delete(&self, serial: u32, selector: &StoreSelector) -> Result<(), LedgerError> {
        let store = self.resolve(selector)?;
        if *selector == StoreSelector::Active {
            self.check_day_boundary()?;
        }
        let mut rows = store.read_all()?;
        let before = rows.len();
        rows.retain(|r| r.serial != serial);
        if rows.len() == before {
            return Err(LedgerError::NotFound(serial));
        }
        for (index, row) in rows.iter_mut().enumerate() {
            row.serial = index as u32 + 1;
        }
        store.write_all(&rows)?;
        Ok(())
    }

    /// Set the pickup field verbatim; the value is not validated.
    pub fn set_pickup_status(
        &self,
        serial: u32,
        status: &str,
        selector: &StoreSelector,
    ) -> Result<ParcelRecord, LedgerError> {
        let store = self.resolve(selector)?;
        if *selector == StoreSelector::Active {
            self.check_day_boundary()?;
        }
        let mut rows = store.read_all()?;
        let row = rows
            .iter_mut()
            .find(|r| r.serial == serial)
            .ok_or(LedgerError::NotFound(serial))?;
        row.picked = status.to_string();
        let updated = row.clone();
        store.write_all(&rows)?;
        Ok(updated)
    }

    /// Archive file names, newest first. A missing archive dir is empty.
    pub fn archives(&self) -> Result<Vec<String>> {
        if !self.archive_dir.exists() {
            return Ok(Vec::new());
        }
        let mut names: Vec<String> = std::fs::read_dir(&self.archive_dir)
            .with_context(|| format!("failed to list {}", self.archive_dir.display()))?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .collect();
        names.sort_by(|a, b| b.cmp(a));
        Ok(names)
    }

    fn resolve(&self, selector: &StoreSelector) -> Result<Box<dyn RecordStore>, LedgerError> {
        match selector {
            StoreSelector::Active => Ok(Box::new(self.active_store())),
            StoreSelector::Archive(name) => {
                if name.is_empty() || name.contains(['/', '\\']) || name.contains("..") {
                    return Err(LedgerError::BadSelector(name.clone()));
                }
                Ok(Box::new(CsvStore::new(self.archive_dir.join(name))))
            }
        }
    }

    fn active_store(&self) -> CsvStore {
        CsvStore::new(&self.data_file)
    }
}

fn archive_stamp(now: &DateTime<Local>) -> String {
    now.format("%Y%m%d_%H%M%S").to_string()
}

/// Directory hits fill gaps: a non-empty directory field replaces the
/// caller's value, a blank one never clobbers it.
fn merge_directory(record: &mut ParcelRecord, entry: &RecipientEntry) {
    if !entry.name.is_empty() {
        record.name = entry.name.clone();
    }
    if !entry.email.is_empty() {
        record.email = entry.email.clone();
    }
    if !entry.phone.is_empty() {
        record.phone = entry.phone.clone();
    }
    if !entry.roll_no.is_empty() {
        record.roll_no = entry.roll_no.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    const CONTACTS: &str = "\
Name,phno,rollno,email
Alice Kumar,,21691A3155,alice@example.com
Bob Rao,918765432109,21691A3156,bob@example.com
";

    fn ledger_in(dir: &TempDir) -> Ledger {
        let contact_file = dir.path().join("contact.csv");
        std::fs::write(&contact_file, CONTACTS).unwrap();
        Ledger::new(
            dir.path().join("data.csv"),
            dir.path().join("archive"),
            dir.path().join("last_run_date.txt"),
            RecipientDirectory::new(contact_file),
        )
    }

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    fn fields(name: &str, roll: &str, phone: &str) -> FieldMap {
        FieldMap {
            name: name.to_string(),
            roll_no: roll.to_string(),
            phone: phone.to_string(),
            ..Default::default()
        }
    }

    fn archive_files(dir: &TempDir) -> Vec<String> {
        let archive = dir.path().join("archive");
        if !archive.exists() {
            return Vec::new();
        }
        let mut names: Vec<String> = std::fs::read_dir(archive)
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_append_assigns_serial_and_label_id() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger_in(&dir);
        let first = ledger.append_at(&fields("John Smith", "", ""), at(2026, 8, 6, 9)).unwrap();
        let second = ledger.append_at(&fields("Jane Doe", "", ""), at(2026, 8, 6, 10)).unwrap();
        assert_eq!(first.serial, 1);
        assert_eq!(first.label_id, "20260806-0001");
        assert_eq!(second.serial, 2);
        assert_eq!(second.label_id, "20260806-0002");
        assert_eq!(first.picked, "Not Picked");
        assert_eq!(first.status, "Pending");
        assert_eq!(first.mail_status, "Pending");
        assert_eq!(first.time, "2026-08-06 09:00:00");
    }

    #[test]
    fn test_directory_fills_gaps_on_append() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger_in(&dir);
        let record = ledger
            .append_at(&fields("", "21691A3155", ""), at(2026, 8, 6, 9))
            .unwrap();
        assert_eq!(record.name, "Alice Kumar");
        assert_eq!(record.email, "alice@example.com");
        assert_eq!(record.roll_no, "21691A3155");
    }

    #[test]
    fn test_directory_never_clobbers_with_emptiness() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger_in(&dir);
        // Alice's directory row has a blank phone; the caller's phone must
        // survive the merge.
        let record = ledger
            .append_at(&fields("", "21691A3155", "9999999999"), at(2026, 8, 6, 9))
            .unwrap();
        assert_eq!(record.phone, "9999999999");
        assert_eq!(record.name, "Alice Kumar");
    }

    #[test]
    fn test_phone_lookup_when_roll_misses() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger_in(&dir);
        let record = ledger
            .append_at(&fields("", "", "8765432109"), at(2026, 8, 6, 9))
            .unwrap();
        assert_eq!(record.name, "Bob Rao");
        assert_eq!(record.roll_no, "21691A3156");
        // Directory phone is fuller than the extracted fragment.
        assert_eq!(record.phone, "918765432109");
    }

    #[test]
    fn test_day_boundary_archives_once() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger_in(&dir);
        ledger.append_at(&fields("John Smith", "", ""), at(2026, 8, 5, 9)).unwrap();
        ledger.append_at(&fields("Jane Doe", "", ""), at(2026, 8, 5, 10)).unwrap();

        ledger
            .check_day_boundary_at(at(2026, 8, 6, 0).date_naive(), "20260806_000100")
            .unwrap();
        assert_eq!(archive_files(&dir).len(), 1);
        assert!(archive_files(&dir)[0].starts_with("data_2026-08-05_"));
        let active = CsvStore::new(dir.path().join("data.csv"));
        assert!(active.read_all().unwrap().is_empty());

        // Second check on the same day: no new archive, store untouched.
        ledger
            .check_day_boundary_at(at(2026, 8, 6, 1).date_naive(), "20260806_010000")
            .unwrap();
        assert_eq!(archive_files(&dir).len(), 1);
        assert!(active.read_all().unwrap().is_empty());
    }

    #[test]
    fn test_archive_content_matches_previous_day() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger_in(&dir);
        ledger.append_at(&fields("John Smith", "", ""), at(2026, 8, 5, 9)).unwrap();
        ledger
            .check_day_boundary_at(at(2026, 8, 6, 0).date_naive(), "20260806_000100")
            .unwrap();
        let name = archive_files(&dir)[0].clone();
        let archived = ledger.records(&StoreSelector::Archive(name)).unwrap();
        assert_eq!(archived.len(), 1);
        assert_eq!(archived[0].name, "John Smith");
    }

    #[test]
    fn test_archive_names_unique_within_same_second() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger_in(&dir);
        let stamp = "20260806_090000";

        ledger.append_at(&fields("John Smith", "", ""), at(2026, 8, 5, 9)).unwrap();
        ledger
            .check_day_boundary_at(at(2026, 8, 6, 9).date_naive(), stamp)
            .unwrap();
        ledger.append_at(&fields("Jane Doe", "", ""), at(2026, 8, 6, 9)).unwrap();
        ledger
            .check_day_boundary_at(at(2026, 8, 7, 9).date_naive(), stamp)
            .unwrap();

        let files = archive_files(&dir);
        assert_eq!(files.len(), 2);
        assert_ne!(files[0], files[1]);
    }

    #[test]
    fn test_first_run_writes_marker_without_archiving() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger_in(&dir);
        ledger
            .check_day_boundary_at(at(2026, 8, 6, 9).date_naive(), "20260806_090000")
            .unwrap();
        assert!(archive_files(&dir).is_empty());
        let marker = std::fs::read_to_string(dir.path().join("last_run_date.txt")).unwrap();
        assert_eq!(marker, "2026-08-06");
    }

    #[test]
    fn test_delete_reindexes_contiguously() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger_in(&dir);
        for name in ["A one", "B two", "C three", "D four"] {
            ledger.append(&fields(name, "", "")).unwrap();
        }

        ledger.delete(2, &StoreSelector::Active).unwrap();
        let rows = ledger.records(&StoreSelector::Active).unwrap();
        let serials: Vec<u32> = rows.iter().map(|r| r.serial).collect();
        assert_eq!(serials, vec![1, 2, 3]);
        let names: Vec<&str> = rows.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["A one", "C three", "D four"]);

        ledger.delete(1, &StoreSelector::Active).unwrap();
        let rows = ledger.records(&StoreSelector::Active).unwrap();
        assert_eq!(rows.iter().map(|r| r.serial).collect::<Vec<_>>(), vec![1, 2]);

        // The next append continues the dense sequence.
        let next = ledger.append(&fields("E five", "", "")).unwrap();
        assert_eq!(next.serial, 3);
    }

    #[test]
    fn test_delete_missing_is_not_found() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger_in(&dir);
        ledger.append(&fields("John Smith", "", "")).unwrap();
        assert!(matches!(
            ledger.delete(9, &StoreSelector::Active),
            Err(LedgerError::NotFound(9))
        ));
        assert_eq!(ledger.records(&StoreSelector::Active).unwrap().len(), 1);
    }

    #[test]
    fn test_update_merges_recognized_fields_only() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger_in(&dir);
        ledger.append(&fields("John Smith", "", "")).unwrap();

        let changes = HashMap::from([
            ("AWB No".to_string(), "1234567890123".to_string()),
            ("Mystery".to_string(), "ignored".to_string()),
        ]);
        let updated = ledger.update(1, &changes, &StoreSelector::Active).unwrap();
        assert_eq!(updated.awb, "1234567890123");
        assert_eq!(updated.name, "John Smith");
    }

    #[test]
    fn test_update_reruns_directory_merge() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger_in(&dir);
        ledger.append(&fields("", "", "")).unwrap();

        let changes = HashMap::from([("Roll No".to_string(), "21691A3155".to_string())]);
        let updated = ledger.update(1, &changes, &StoreSelector::Active).unwrap();
        assert_eq!(updated.name, "Alice Kumar");
        assert_eq!(updated.email, "alice@example.com");
    }

    #[test]
    fn test_update_missing_is_not_found() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger_in(&dir);
        let changes = HashMap::from([("Name".to_string(), "X".to_string())]);
        assert!(matches!(
            ledger.update(1, &changes, &StoreSelector::Active),
            Err(LedgerError::NotFound(1))
        ));
    }

    #[test]
    fn test_set_pickup_status_verbatim() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger_in(&dir);
        ledger.append(&fields("John Smith", "", "")).unwrap();
        let updated = ledger
            .set_pickup_status(1, "whatever the operator typed", &StoreSelector::Active)
            .unwrap();
        assert_eq!(updated.picked, "whatever the operator typed");
    }

    #[test]
    fn test_archive_selector_rejects_path_traversal() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger_in(&dir);
        for name in ["../data.csv", "a/b.csv", ""] {
            assert!(matches!(
                ledger.records(&StoreSelector::Archive(name.to_string())),
                Err(LedgerError::BadSelector(_))
            ));
        }
    }

    #[test]
    fn test_blank_append_sets_defaults_only() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger_in(&dir);
        let record = ledger.append_blank().unwrap();
        assert_eq!(record.serial, 1);
        assert!(!record.label_id.is_empty());
        assert!(!record.time.is_empty());
        assert_eq!(record.name, "");
        assert_eq!(record.mail_status, "Pending");
    }
}
