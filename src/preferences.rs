//! User preferences storage
//!
//! Handles saving and loading user preferences to a JSON file
//! in the application support directory.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::{error, info};

/// User preferences
#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct Preferences {
    /// Recognition locale (e.g. "en-US", "nb-NO", "de-DE")
    /// Defaults to the embedded configuration's locale if not set
    pub language_code: Option<String>,
    /// Custom notes file location (None = use default)
    /// Set by editing this file; the app only reads it
    pub notes_location: Option<PathBuf>,
}

/// Get the preferences file path
fn preferences_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("VoiceNote").join("preferences.json"))
}

/// Load preferences from disk
///
/// Returns default preferences if the file doesn't exist or can't be read
pub(crate) fn load_preferences() -> Preferences {
    let Some(path) = preferences_path() else {
        return Preferences::default();
    };

    if !path.exists() {
        return Preferences::default();
    }

    match fs::read_to_string(&path) {
        Ok(contents) => match serde_json::from_str(&contents) {
            Ok(prefs) => prefs,
            Err(e) => {
                error!("Failed to parse preferences: {}", e);
                Preferences::default()
            }
        },
        Err(e) => {
            error!("Failed to read preferences file: {}", e);
            Preferences::default()
        }
    }
}

/// Save preferences to disk
pub(crate) fn save_preferences(prefs: &Preferences) -> Result<(), PreferencesError> {
    let path = preferences_path().ok_or(PreferencesError::NoConfigDir)?;

    if let Some(parent) = path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent)?;
            info!("Created preferences directory: {:?}", parent);
        }
    }

    let json = serde_json::to_string_pretty(prefs)?;
    fs::write(&path, json)?;
    info!("Saved preferences to: {:?}", path);

    Ok(())
}

/// Get the recognition locale preference, if set
pub(crate) fn get_language_code() -> Option<String> {
    load_preferences().language_code.filter(|c| !c.is_empty())
}

/// Set the recognition locale preference
pub(crate) fn set_language_code(code: &str) -> Result<(), PreferencesError> {
    let mut prefs = load_preferences();
    prefs.language_code = Some(code.to_string());
    save_preferences(&prefs)
}

/// Get the custom notes file location, if set
pub(crate) fn get_notes_location() -> Option<PathBuf> {
    load_preferences().notes_location
}

/// Preferences errors
#[derive(Debug, thiserror::Error)]
pub(crate) enum PreferencesError {
    #[error("Could not find config directory")]
    NoConfigDir,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_preferences() {
        let prefs = Preferences::default();
        assert!(prefs.language_code.is_none());
        assert!(prefs.notes_location.is_none());
    }

    #[test]
    fn test_preferences_path() {
        let path = preferences_path();
        assert!(path.is_some());
        let path = path.unwrap();
        assert!(path.ends_with("VoiceNote/preferences.json"));
    }
}
