// Persistent hash cache
// Maps normalized absolute paths to the last observed MD5 digest

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::digest;

/// Persistent mapping of absolute file path to last observed content digest.
///
/// The cache is a hint, not a source of truth: every error path answers
/// "changed" so that a doubtful file is uploaded rather than skipped.
pub struct HashCache {
    path: PathBuf,
    entries: HashMap<String, String>,
}

impl HashCache {
    /// Create a cache backed by the given file. Nothing is read until `load`.
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            entries: HashMap::new(),
        }
    }

    /// Default on-disk location: `<tmpdir>/internxt-backup-hash-cache.json`
    pub fn default_cache_path() -> PathBuf {
        std::env::temp_dir().join("internxt-backup-hash-cache.json")
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the cache from disk. Returns false (leaving the cache empty) when
    /// the file is missing or unparseable; never errors.
    pub fn load(&mut self) -> bool {
        let data = match fs::read_to_string(&self.path) {
            Ok(d) => d,
            Err(_) => return false,
        };

        match serde_json::from_str::<HashMap<String, String>>(&data) {
            Ok(map) => {
                debug!("loaded {} hash cache entries", map.len());
                self.entries = map;
                true
            }
            Err(e) => {
                warn!("hash cache at {} is unreadable: {}", self.path.display(), e);
                self.entries.clear();
                false
            }
        }
    }

    /// Persist the cache as pretty-printed JSON. Uses write-then-rename so a
    /// crash mid-save leaves the previous document intact.
    pub fn save(&self) -> bool {
        let data = match serde_json::to_string_pretty(&self.entries) {
            Ok(d) => d,
            Err(e) => {
                warn!("failed to serialize hash cache: {}", e);
                return false;
            }
        };

        let tmp = self.path.with_extension("json.tmp");
        if let Err(e) = fs::write(&tmp, data) {
            warn!("failed to write hash cache: {}", e);
            return false;
        }
        if let Err(e) = fs::rename(&tmp, &self.path) {
            warn!("failed to replace hash cache: {}", e);
            let _ = fs::remove_file(&tmp);
            return false;
        }
        true
    }

    /// Decide whether the file at `path` has changed since last observed,
    /// computing its MD5 in the process. New and changed digests are stored
    /// and persisted before returning.
    pub fn has_changed(&mut self, path: &Path) -> bool {
        let computed = match digest::md5_file(path) {
            Ok(d) => d,
            Err(e) => {
                warn!("hashing {} failed, treating as changed: {}", path.display(), e);
                return true;
            }
        };
        self.has_changed_with(path, &computed)
    }

    /// `has_changed` for callers that already computed the digest.
    pub fn has_changed_with(&mut self, path: &Path, computed: &str) -> bool {
        let key = normalize_key(path);
        match self.entries.get(&key) {
            Some(stored) if stored == computed => false,
            _ => {
                self.entries.insert(key, computed.to_string());
                self.save();
                true
            }
        }
    }

    /// Record a digest in memory without persisting; the caller decides when
    /// to `save`.
    pub fn update_hash(&mut self, path: &Path, digest: String) {
        self.entries.insert(normalize_key(path), digest);
    }

    /// Stored digest for a path, if any.
    pub fn get(&self, path: &Path) -> Option<&String> {
        self.entries.get(&normalize_key(path))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Delete the backing file and empty the in-memory map.
    pub fn clear_persistent(&mut self) -> bool {
        self.entries.clear();
        match fs::remove_file(&self.path) {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
            Err(e) => {
                warn!("failed to delete hash cache: {}", e);
                false
            }
        }
    }
}

/// Cache keys always use forward slashes, regardless of platform.
fn normalize_key(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
