// Scanner run state
// Records which files a completed run uploaded and when it finished.
// Change detection is owned by the hash cache, not this document.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Per-run scanner state, persisted as JSON in the OS temp directory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScannerState {
    /// Relative path -> digest of the last successfully uploaded content
    #[serde(default)]
    pub files: HashMap<String, String>,
    /// ISO-8601 timestamp of the last completed run
    #[serde(rename = "lastRun", skip_serializing_if = "Option::is_none")]
    pub last_run: Option<String>,
}

impl ScannerState {
    /// Default on-disk location: `<tmpdir>/internxt-backup-state.json`
    pub fn default_state_path() -> PathBuf {
        std::env::temp_dir().join("internxt-backup-state.json")
    }

    /// Best-effort load; absence or a corrupt document yields the default.
    pub fn load(path: &Path) -> Self {
        let data = match fs::read_to_string(path) {
            Ok(d) => d,
            Err(_) => return Self::default(),
        };
        match serde_json::from_str(&data) {
            Ok(state) => state,
            Err(e) => {
                warn!("scanner state at {} is unreadable, starting fresh: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Persist as pretty-printed JSON. Failures are logged, not raised, so a
    /// full temp partition cannot abort a finished run.
    pub fn save(&self, path: &Path) -> bool {
        let data = match serde_json::to_string_pretty(self) {
            Ok(d) => d,
            Err(e) => {
                warn!("failed to serialize scanner state: {}", e);
                return false;
            }
        };
        if let Err(e) = fs::write(path, data) {
            warn!("failed to write scanner state to {}: {}", path.display(), e);
            return false;
        }
        true
    }

    /// Record a successfully uploaded file.
    pub fn record_upload(&mut self, relative_path: &str, digest: &str) {
        self.files.insert(relative_path.to_string(), digest.to_string());
    }

    /// Stamp the completion time of the current run.
    pub fn record_completion(&mut self) {
        self.last_run = Some(chrono::Utc::now().to_rfc3339());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");

        let mut state = ScannerState::default();
        state.record_upload("a/b.txt", "d41d8cd98f00b204e9800998ecf8427e");
        state.record_completion();
        assert!(state.save(&path));

        let loaded = ScannerState::load(&path);
        assert_eq!(
            loaded.files.get("a/b.txt").map(String::as_str),
            Some("d41d8cd98f00b204e9800998ecf8427e")
        );
        assert!(loaded.last_run.is_some());
    }

    #[test]
    fn test_load_missing_is_default() {
        let dir = TempDir::new().unwrap();
        let state = ScannerState::load(&dir.path().join("nope.json"));
        assert!(state.files.is_empty());
        assert!(state.last_run.is_none());
    }

    #[test]
    fn test_load_corrupt_is_default() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "{not json").unwrap();

        let state = ScannerState::load(&path);
        assert!(state.files.is_empty());
    }
}
