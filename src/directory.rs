//! Recipient directory lookup.
//!
//! The directory is an externally maintained table mapping identity keys
//! (roll number / phone) to contact details. It is read-only from the
//! pipeline's perspective and re-read from disk on every lookup.

use std::path::PathBuf;

use serde::Deserialize;
use tracing::warn;

/// One reference row. Column names follow the deployed directory file.
#[derive(Debug, Clone, Deserialize)]
pub struct RecipientEntry {
    #[serde(rename = "Name", default)]
    pub name: String,
    #[serde(rename = "phno", default)]
    pub phone: String,
    #[serde(rename = "rollno", default)]
    pub roll_no: String,
    #[serde(rename = "email", default)]
    pub email: String,
}

#[derive(Debug)]
pub struct RecipientDirectory {
    path: PathBuf,
}

impl RecipientDirectory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Scan the directory once and return the first entry whose roll number
    /// equals the key or whose phone number contains it. An empty key, an
    /// absent file, or no match are all normal `None` outcomes.
    pub fn lookup(&self, key: &str) -> Option<RecipientEntry> {
        let key = key.trim().to_lowercase();
        if key.is_empty() || !self.path.exists() {
            return None;
        }
        let mut reader = match csv::Reader::from_path(&self.path) {
            Ok(reader) => reader,
            Err(e) => {
                warn!("failed to open recipient directory {}: {e}", self.path.display());
                return None;
            }
        };
        for result in reader.deserialize::<RecipientEntry>() {
            let entry = match result {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("skipping malformed directory row: {e}");
                    continue;
                }
            };
            let roll = entry.roll_no.trim().to_lowercase();
            let phone = entry.phone.trim().to_lowercase();
            if (!roll.is_empty() && key == roll) || (!phone.is_empty() && phone.contains(&key)) {
                return Some(entry);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn directory_with(content: &str) -> (TempDir, RecipientDirectory) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("contact.csv");
        std::fs::write(&path, content).unwrap();
        (dir, RecipientDirectory::new(path))
    }

    const SAMPLE: &str = "\
Name,phno,rollno,email
Alice Kumar,919876543210,21691A3155,alice@example.com
Bob Rao,918765432109,21691A3156,bob@example.com
";

    #[test]
    fn test_exact_roll_match() {
        let (_dir, directory) = directory_with(SAMPLE);
        let entry = directory.lookup("21691A3155").unwrap();
        assert_eq!(entry.name, "Alice Kumar");
        assert_eq!(entry.email, "alice@example.com");
    }

    #[test]
    fn test_roll_match_is_case_insensitive() {
        let (_dir, directory) = directory_with(SAMPLE);
        assert!(directory.lookup("21691a3155").is_some());
    }

    #[test]
    fn test_phone_substring_match() {
        let (_dir, directory) = directory_with(SAMPLE);
        let entry = directory.lookup("8765432109").unwrap();
        assert_eq!(entry.name, "Bob Rao");
    }

    #[test]
    fn test_first_match_wins() {
        let (_dir, directory) = directory_with(
            "Name,phno,rollno,email\nFirst,911111111111,,\nSecond,911111111111,,\n",
        );
        assert_eq!(directory.lookup("1111111111").unwrap().name, "First");
    }

    #[test]
    fn test_empty_key_and_missing_file() {
        let (_dir, directory) = directory_with(SAMPLE);
        assert!(directory.lookup("").is_none());
        assert!(directory.lookup("   ").is_none());

        let absent = RecipientDirectory::new("/nonexistent/contact.csv");
        assert!(absent.lookup("21691A3155").is_none());
    }

    #[test]
    fn test_no_match() {
        let (_dir, directory) = directory_with(SAMPLE);
        assert!(directory.lookup("99999Z9999").is_none());
    }
}
