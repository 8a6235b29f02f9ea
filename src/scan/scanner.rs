// Directory scanning module
// Walks the source tree, digests content, and emits the change set

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::cache::HashCache;
use super::digest;
use super::state::ScannerState;
use crate::error::BackupError;

/// Change detection verdict for a discovered file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChangeState {
    /// Not yet compared against the cache
    #[default]
    Unknown,
    /// Differs from the last observed content (or never observed)
    Changed,
    /// Identical to the last observed content
    Unchanged,
}

/// A discovered file. Immutable once the transfer queue accepts it.
#[derive(Debug, Clone)]
pub struct FileRecord {
    /// Forward-slash path relative to the source root
    pub relative_path: String,
    pub absolute_path: PathBuf,
    pub size_bytes: u64,
    /// MD5 hex of the content at scan time
    pub content_digest: String,
    pub change_state: ChangeState,
}

/// Result of a full scan.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    pub all_files: Vec<FileRecord>,
    pub files_to_upload: Vec<FileRecord>,
    /// Total size of the files needing upload
    pub total_bytes: u64,
}

impl ScanOutcome {
    pub fn total_mb(&self) -> f64 {
        self.total_bytes as f64 / 1_048_576.0
    }
}

/// Scanner configuration.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Mark every file changed regardless of the cache
    pub force_upload: bool,
    /// Do not skip leading-dot entries
    pub include_hidden: bool,
    /// Digest computation threads; 1 keeps the walk fully deterministic
    pub concurrency: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            force_upload: false,
            include_hidden: false,
            concurrency: 1,
        }
    }
}

/// Produces the set of files needing upload for one run.
///
/// Owns the scanner-state document; the hash cache is injected so that the
/// orchestrator controls its location and lifetime.
pub struct FileScanner {
    root: PathBuf,
    state_path: PathBuf,
    state: ScannerState,
    cache: HashCache,
    config: ScanConfig,
}

impl FileScanner {
    /// Resolve the source root and load prior scanner state from the
    /// temp-state file. Absence is not an error; the state starts empty.
    /// Change detection never consults this document.
    pub fn new(
        source_dir: &Path,
        cache: HashCache,
        config: ScanConfig,
    ) -> Result<Self, BackupError> {
        let root = source_dir
            .canonicalize()
            .map_err(|e| BackupError::from_io_error(e, "scanning", Some(source_dir.to_path_buf())))?;

        let state_path = ScannerState::default_state_path();
        let state = ScannerState::load(&state_path);

        Ok(Self {
            root,
            state_path,
            state,
            cache,
            config,
        })
    }

    /// Relocate the scanner-state document, reloading prior state from the
    /// new location. Runs that share a machine point this somewhere private.
    pub fn with_state_path(mut self, path: PathBuf) -> Self {
        self.state = ScannerState::load(&path);
        self.state_path = path;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Walk the tree, digest every regular file, and classify each record
    /// against the hash cache.
    pub fn scan(&mut self) -> Result<ScanOutcome, BackupError> {
        self.cache.load();

        info!("scanning {}", self.root.display());
        let paths = self.collect_files()?;
        debug!("found {} files", paths.len());

        let digests = self.compute_digests(&paths);

        let mut outcome = ScanOutcome::default();
        for (path, digest_result) in paths.into_iter().zip(digests) {
            let digest = match digest_result {
                Ok(d) => d,
                Err(e) => {
                    warn!("failed to hash {}: {}", path.display(), e);
                    continue;
                }
            };

            let size_bytes = match fs::metadata(&path) {
                Ok(m) => m.len(),
                Err(e) => {
                    warn!("failed to stat {}: {}", path.display(), e);
                    continue;
                }
            };

            let relative_path = relative_key(&path, &self.root);

            // The cache is consulted even under force so its entry always
            // reflects the digest at upload time
            let cache_changed = self.cache.has_changed_with(&path, &digest);
            let change_state = if self.config.force_upload || cache_changed {
                ChangeState::Changed
            } else {
                ChangeState::Unchanged
            };

            let record = FileRecord {
                relative_path,
                absolute_path: path,
                size_bytes,
                content_digest: digest,
                change_state,
            };

            if record.change_state == ChangeState::Changed {
                outcome.total_bytes += record.size_bytes;
                outcome.files_to_upload.push(record.clone());
            }
            outcome.all_files.push(record);
        }

        Ok(outcome)
    }

    /// Record a successfully uploaded file.
    pub fn update_file_state(&mut self, relative_path: &str, digest: &str) {
        self.state.record_upload(relative_path, digest);
    }

    /// Stamp `lastRun` with the current time.
    pub fn record_completion(&mut self) {
        self.state.record_completion();
    }

    /// Persist the scanner state document.
    pub fn save_state(&self) -> bool {
        self.state.save(&self.state_path)
    }

    pub fn cache(&self) -> &HashCache {
        &self.cache
    }

    /// Collect regular files under the root, in directory order.
    ///
    /// Entries whose name begins with `.` are skipped unless `include_hidden`
    /// is set; the scanner-state and hash-cache files are always skipped.
    /// Unreadable directories are reported and the walk continues.
    fn collect_files(&self) -> Result<Vec<PathBuf>, BackupError> {
        let mut files = Vec::new();
        let excluded = [self.state_path.clone(), self.cache.path().to_path_buf()];
        self.collect_files_recursive(&self.root, &excluded, &mut files);
        Ok(files)
    }

    fn collect_files_recursive(&self, dir: &Path, excluded: &[PathBuf], files: &mut Vec<PathBuf>) {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("cannot read directory {}: {}", dir.display(), e);
                return;
            }
        };

        let mut children: Vec<_> = entries
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!("cannot read directory entry in {}: {}", dir.display(), e);
                    None
                }
            })
            .collect();
        children.sort_by_key(|e| e.file_name());

        for entry in children {
            let path = entry.path();

            if !self.config.include_hidden {
                let hidden = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with('.'))
                    .unwrap_or(false);
                if hidden {
                    continue;
                }
            }

            if excluded.iter().any(|e| e == &path) {
                continue;
            }

            let metadata = match entry.metadata() {
                Ok(m) => m,
                Err(e) => {
                    warn!("cannot read metadata for {}: {}", path.display(), e);
                    continue;
                }
            };

            if metadata.is_file() {
                files.push(path);
            } else if metadata.is_dir() {
                self.collect_files_recursive(&path, excluded, files);
            }
            // Symlinks and other special files are skipped
        }
    }

    /// Compute MD5 digests for the collected paths. With concurrency 1 the
    /// files are hashed in walk order; otherwise a dedicated rayon pool hashes
    /// them in parallel while result order is preserved by index.
    fn compute_digests(&self, paths: &[PathBuf]) -> Vec<Result<String, BackupError>> {
        if self.config.concurrency <= 1 {
            return paths.iter().map(|p| digest::md5_file(p)).collect();
        }

        use rayon::prelude::*;

        let pool = match rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.concurrency)
            .build()
        {
            Ok(pool) => pool,
            Err(e) => {
                warn!("could not build scan pool, hashing serially: {}", e);
                return paths.iter().map(|p| digest::md5_file(p)).collect();
            }
        };

        pool.install(|| paths.par_iter().map(|p| digest::md5_file(p)).collect())
    }
}

/// Forward-slash path of `path` relative to `root`.
fn relative_key(path: &Path, root: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let joined = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    joined
}
