//! Unread-notes flags, persisted across sessions.
//!
//! Tracks which claimed customers have notes the provider has not read
//! yet. The map is stored as one JSON object (`customerId` as string →
//! `bool`) under a fixed path, loaded at startup and rewritten on
//! every change. Entries are only removed when the provider reads the
//! customer's notes; there is no expiry.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use telecare_core::types::CustomerId;

/// Errors from unread-notes persistence.
#[derive(Debug, thiserror::Error)]
pub enum NotesError {
    #[error("Failed to access notes file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Notes file is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

/// File-backed map of customers with unread notes.
pub struct UnreadNotes {
    path: PathBuf,
    map: Mutex<HashMap<CustomerId, bool>>,
}

impl UnreadNotes {
    /// Load the map from `path`, starting empty if the file does not
    /// exist yet.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, NotesError> {
        let path = path.into();
        let map = match std::fs::read_to_string(&path) {
            Ok(contents) => parse_map(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            map: Mutex::new(map),
        })
    }

    /// Whether the customer has unread notes.
    pub fn is_unread(&self, customer_id: CustomerId) -> bool {
        self.map
            .lock()
            .expect("notes lock poisoned")
            .get(&customer_id)
            .copied()
            .unwrap_or(false)
    }

    /// Flag the customer as having unread notes.
    pub fn set(&self, customer_id: CustomerId) -> Result<(), NotesError> {
        let mut guard = self.map.lock().expect("notes lock poisoned");
        guard.insert(customer_id, true);
        self.persist(&guard)
    }

    /// Clear the flag once the provider reads the notes.
    pub fn clear(&self, customer_id: CustomerId) -> Result<(), NotesError> {
        let mut guard = self.map.lock().expect("notes lock poisoned");
        if guard.remove(&customer_id).is_none() {
            return Ok(());
        }
        self.persist(&guard)
    }

    /// Customers currently flagged unread.
    pub fn unread_customers(&self) -> Vec<CustomerId> {
        let guard = self.map.lock().expect("notes lock poisoned");
        guard
            .iter()
            .filter(|(_, &unread)| unread)
            .map(|(&id, _)| id)
            .collect()
    }

    fn persist(&self, map: &HashMap<CustomerId, bool>) -> Result<(), NotesError> {
        let on_disk: HashMap<String, bool> =
            map.iter().map(|(id, &v)| (id.to_string(), v)).collect();
        let json = serde_json::to_string(&on_disk)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }

    /// Path the map persists to.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn parse_map(contents: &str) -> Result<HashMap<CustomerId, bool>, NotesError> {
    let on_disk: HashMap<String, bool> = serde_json::from_str(contents)?;
    Ok(on_disk
        .into_iter()
        .filter_map(|(id, v)| id.parse::<CustomerId>().ok().map(|id| (id, v)))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let notes = UnreadNotes::load(dir.path().join("notes.json")).unwrap();
        assert!(!notes.is_unread(500));
        assert!(notes.unread_customers().is_empty());
    }

    #[test]
    fn set_and_clear_persist_across_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.json");

        let notes = UnreadNotes::load(&path).unwrap();
        notes.set(500).unwrap();
        notes.set(501).unwrap();
        notes.clear(501).unwrap();

        let reloaded = UnreadNotes::load(&path).unwrap();
        assert!(reloaded.is_unread(500));
        assert!(!reloaded.is_unread(501));
        assert_eq!(reloaded.unread_customers(), vec![500]);
    }

    #[test]
    fn clear_unknown_customer_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.json");

        let notes = UnreadNotes::load(&path).unwrap();
        notes.clear(999).unwrap();
        // Nothing was flagged, so nothing should have been written.
        assert!(!path.exists());
    }

    #[test]
    fn disk_format_keys_customer_ids_as_strings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.json");

        let notes = UnreadNotes::load(&path).unwrap();
        notes.set(500).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["500"], true);
    }

    #[test]
    fn unparsable_keys_are_skipped() {
        let map = parse_map(r#"{"500": true, "not-a-number": true}"#).unwrap();
        assert_eq!(map.len(), 1);
        assert!(map.contains_key(&500));
    }
}
