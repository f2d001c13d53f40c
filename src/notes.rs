//! Local note storage
//!
//! Persists the note list as pretty-printed JSON, newest first, in the
//! platform data directory or a custom location. Loading is tolerant: a
//! missing or unreadable file yields an empty list so a damaged store never
//! takes the app down.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};
use uuid::Uuid;

/// A single saved voice note
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Note {
    pub id: Uuid,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// Note storage errors with contextual information
#[derive(Debug, thiserror::Error)]
pub(crate) enum NoteStoreError {
    #[error("Could not find data directory")]
    NoDataDir,

    #[error("Note text is empty")]
    EmptyNote,

    #[error("No note with id {0}")]
    NotFound(Uuid),

    #[error("Failed to create directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write notes file {path}: {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize notes: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// JSON-backed note store
pub(crate) struct NoteStore {
    path: PathBuf,
}

impl NoteStore {
    pub(crate) fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    /// Open the store at the preferred location: the user's configured
    /// override if set, otherwise `<data_dir>/VoiceNote/notes.json`.
    pub(crate) fn open_default() -> Result<Self, NoteStoreError> {
        let path = match crate::preferences::get_notes_location() {
            Some(custom) => custom,
            None => default_notes_path().ok_or(NoteStoreError::NoDataDir)?,
        };
        Ok(Self::with_path(path))
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Load all notes, newest first
    ///
    /// Returns an empty list if the file doesn't exist or can't be parsed.
    pub(crate) fn load(&self) -> Vec<Note> {
        if !self.path.exists() {
            return Vec::new();
        }
        match fs::read_to_string(&self.path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(notes) => notes,
                Err(e) => {
                    error!("Failed to parse notes file: {}", e);
                    Vec::new()
                }
            },
            Err(e) => {
                error!("Failed to read notes file: {}", e);
                Vec::new()
            }
        }
    }

    /// Save a new note at the front of the list
    pub(crate) fn add(&self, text: &str) -> Result<Note, NoteStoreError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(NoteStoreError::EmptyNote);
        }
        let note = Note {
            id: Uuid::new_v4(),
            text: text.to_string(),
            created_at: Utc::now(),
        };
        let mut notes = self.load();
        notes.insert(0, note.clone());
        self.persist(&notes)?;
        info!("Saved note {} ({} chars)", note.id, note.text.len());
        Ok(note)
    }

    /// Replace a note's text and refresh its timestamp
    pub(crate) fn update(&self, id: Uuid, text: &str) -> Result<Note, NoteStoreError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(NoteStoreError::EmptyNote);
        }
        let mut notes = self.load();
        let note = notes
            .iter_mut()
            .find(|note| note.id == id)
            .ok_or(NoteStoreError::NotFound(id))?;
        note.text = text.to_string();
        note.created_at = Utc::now();
        let updated = note.clone();
        self.persist(&notes)?;
        info!("Updated note {}", id);
        Ok(updated)
    }

    /// Delete a note by id
    pub(crate) fn delete(&self, id: Uuid) -> Result<(), NoteStoreError> {
        let mut notes = self.load();
        let before = notes.len();
        notes.retain(|note| note.id != id);
        if notes.len() == before {
            return Err(NoteStoreError::NotFound(id));
        }
        self.persist(&notes)?;
        info!("Deleted note {}", id);
        Ok(())
    }

    fn persist(&self, notes: &[Note]) -> Result<(), NoteStoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| NoteStoreError::CreateDirectory {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
            }
        }
        let json = serde_json::to_string_pretty(notes)?;
        fs::write(&self.path, json).map_err(|e| NoteStoreError::WriteFile {
            path: self.path.clone(),
            source: e,
        })
    }
}

/// Default notes file in the platform data directory
pub(crate) fn default_notes_path() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join("VoiceNote").join("notes.json"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> NoteStore {
        let path = std::env::temp_dir()
            .join(format!("voicenote-test-{}", Uuid::new_v4()))
            .join("notes.json");
        NoteStore::with_path(path)
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let store = temp_store();
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_add_inserts_newest_first() {
        let store = temp_store();
        store.add("first").expect("add");
        store.add("second").expect("add");

        let notes = store.load();
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0].text, "second");
        assert_eq!(notes[1].text, "first");
    }

    #[test]
    fn test_add_rejects_empty_text() {
        let store = temp_store();
        assert!(matches!(store.add("   "), Err(NoteStoreError::EmptyNote)));
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_update_replaces_text() {
        let store = temp_store();
        let note = store.add("draft wording").expect("add");
        store.update(note.id, "final wording").expect("update");

        let notes = store.load();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].text, "final wording");
        assert_eq!(notes[0].id, note.id);
    }

    #[test]
    fn test_update_unknown_id_fails() {
        let store = temp_store();
        let result = store.update(Uuid::new_v4(), "text");
        assert!(matches!(result, Err(NoteStoreError::NotFound(_))));
    }

    #[test]
    fn test_delete_removes_note() {
        let store = temp_store();
        let keep = store.add("keep me").expect("add");
        let gone = store.add("delete me").expect("add");

        store.delete(gone.id).expect("delete");
        let notes = store.load();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].id, keep.id);

        assert!(matches!(
            store.delete(gone.id),
            Err(NoteStoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_corrupt_file_loads_empty() {
        let store = temp_store();
        store.add("valid").expect("add");
        fs::write(store.path(), "not json at all").expect("write");
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_default_notes_path() {
        let path = default_notes_path();
        assert!(path.is_some());
        assert!(path.unwrap().ends_with("VoiceNote/notes.json"));
    }
}
