// Resumable large-file uploads
// Retries with backoff, checksum-verified resume, per-file state on disk

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::remote::{PercentFn, RemoteClient};
use crate::scan::digest;

/// Default chunk size: 50 MiB.
pub const DEFAULT_CHUNK_SIZE: u64 = 50 * 1024 * 1024;

/// Files strictly larger than this take the resumable path.
pub const RESUMABLE_THRESHOLD: u64 = 100 * 1024 * 1024;

/// Retries after the initial attempt.
pub const MAX_RETRIES: u32 = 3;

/// Per-file resumable upload state, persisted between attempts.
///
/// `uploaded_chunks` is part of the format for a future chunk-aware CLI; the
/// current CLI treats the streamed upload as atomic and never advances it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadState {
    #[serde(rename = "filePath")]
    pub file_path: String,
    #[serde(rename = "remotePath")]
    pub remote_path: String,
    #[serde(rename = "chunkSize")]
    pub chunk_size: u64,
    #[serde(rename = "totalChunks")]
    pub total_chunks: u64,
    #[serde(rename = "uploadedChunks")]
    pub uploaded_chunks: Vec<u64>,
    /// SHA-256 of the file at the time the state was created
    pub checksum: String,
    pub timestamp: String,
}

/// Outcome of a large-file upload.
#[derive(Debug, Clone)]
pub struct UploadReport {
    pub success: bool,
    pub bytes_uploaded: u64,
    pub error: Option<String>,
}

type DelayFn = Arc<dyn Fn(u32) -> Duration + Send + Sync>;

/// Exponential backoff: min(1000 * 2^attempt, 10000) milliseconds.
fn default_delay(attempt: u32) -> Duration {
    let millis = 1000u64
        .saturating_mul(2u64.saturating_pow(attempt))
        .min(10_000);
    Duration::from_millis(millis)
}

/// Large-file upload path with retry and checksum-verified resume.
///
/// Sub-threshold files are delegated to the remote client's streamed upload
/// unchanged. Super-threshold files get a persisted state file that survives
/// exhausted retries; a later run resumes if the file's SHA-256 still
/// matches, or starts fresh if it does not.
pub struct ResumableUploader {
    remote: Arc<dyn RemoteClient>,
    state_dir: PathBuf,
    chunk_size: u64,
    delay_fn: DelayFn,
}

impl ResumableUploader {
    pub fn new(remote: Arc<dyn RemoteClient>) -> Self {
        let state_dir = std::env::temp_dir().join("internxt-uploads");
        if let Err(e) = fs::create_dir_all(&state_dir) {
            warn!("could not create resume state dir {}: {}", state_dir.display(), e);
        }
        Self {
            remote,
            state_dir,
            chunk_size: DEFAULT_CHUNK_SIZE,
            delay_fn: Arc::new(default_delay),
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_state_dir(mut self, state_dir: PathBuf) -> Self {
        if let Err(e) = fs::create_dir_all(&state_dir) {
            warn!("could not create resume state dir {}: {}", state_dir.display(), e);
        }
        self.state_dir = state_dir;
        self
    }

    /// Override the backoff schedule, e.g. to zero delays in tests.
    pub fn with_delay_fn<F>(mut self, delay_fn: F) -> Self
    where
        F: Fn(u32) -> Duration + Send + Sync + 'static,
    {
        self.delay_fn = Arc::new(delay_fn);
        self
    }

    /// Whether a file of `size` bytes takes the resumable path.
    pub fn should_use_resumable(size: u64) -> bool {
        size > RESUMABLE_THRESHOLD
    }

    /// `<state dir>/<basename>.<md5 of local path>.upload-state.json`
    pub fn state_path(&self, local: &Path) -> PathBuf {
        let basename = local
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());
        let path_digest = digest::md5_bytes(local.to_string_lossy().as_bytes());
        self.state_dir
            .join(format!("{}.{}.upload-state.json", basename, path_digest))
    }

    fn load_state(&self, local: &Path) -> Option<UploadState> {
        let data = fs::read_to_string(self.state_path(local)).ok()?;
        serde_json::from_str(&data).ok()
    }

    fn save_state(&self, local: &Path, state: &UploadState) -> bool {
        let data = match serde_json::to_string_pretty(state) {
            Ok(d) => d,
            Err(e) => {
                warn!("failed to serialize upload state: {}", e);
                return false;
            }
        };
        let path = self.state_path(local);
        if let Err(e) = fs::write(&path, data) {
            warn!("failed to write upload state to {}: {}", path.display(), e);
            return false;
        }
        true
    }

    /// Delete the state file. Idempotent.
    pub fn clear_state(&self, local: &Path) {
        let _ = fs::remove_file(self.state_path(local));
    }

    /// Percent completed according to persisted state, 0 when absent.
    pub fn get_progress(&self, local: &Path) -> u8 {
        match self.load_state(local) {
            Some(state) if state.total_chunks > 0 => {
                let done = state.uploaded_chunks.len() as f64;
                ((done / state.total_chunks as f64) * 100.0).round() as u8
            }
            _ => 0,
        }
    }

    /// True iff a state file exists and the upload is incomplete.
    pub fn can_resume(&self, local: &Path) -> bool {
        match self.load_state(local) {
            Some(state) => (state.uploaded_chunks.len() as u64) < state.total_chunks,
            None => false,
        }
    }

    /// Upload a file, retrying with backoff and persisting state across
    /// failures. Sub-threshold files are delegated directly.
    pub async fn upload_large_file(
        &self,
        local: &Path,
        remote_path: &str,
        on_percent: Option<PercentFn>,
    ) -> UploadReport {
        let size = match fs::metadata(local) {
            Ok(m) => m.len(),
            Err(e) => {
                return UploadReport {
                    success: false,
                    bytes_uploaded: 0,
                    error: Some(format!("cannot stat {}: {}", local.display(), e)),
                };
            }
        };

        if !Self::should_use_resumable(size) {
            let outcome = self
                .remote
                .upload_file_streamed(local, remote_path, on_percent)
                .await;
            return UploadReport {
                success: outcome.success,
                bytes_uploaded: if outcome.success { size } else { 0 },
                error: outcome.error,
            };
        }

        let checksum = match digest::sha256_file_async(local).await {
            Ok(c) => c,
            Err(e) => {
                return UploadReport {
                    success: false,
                    bytes_uploaded: 0,
                    error: Some(e.to_string()),
                };
            }
        };

        let total_chunks = size.div_ceil(self.chunk_size).max(1);

        let mut state = match self.load_state(local) {
            Some(existing) if existing.checksum == checksum => {
                debug!(
                    "resuming upload of {} ({}/{} chunks recorded)",
                    local.display(),
                    existing.uploaded_chunks.len(),
                    existing.total_chunks
                );
                existing
            }
            Some(_) => {
                // Content changed since the state was written; start fresh
                debug!("checksum mismatch for {}, discarding stale state", local.display());
                self.clear_state(local);
                self.fresh_state(local, remote_path, total_chunks, &checksum)
            }
            None => self.fresh_state(local, remote_path, total_chunks, &checksum),
        };

        let uploaded = state.uploaded_chunks.len() as u64;
        let composed = on_percent.map(|callback| {
            let base = uploaded as f64 / total_chunks as f64 * 100.0;
            let per_chunk = total_chunks as f64;
            Arc::new(move |chunk_percent: u8| {
                let current = chunk_percent as f64 / per_chunk;
                callback(((base + current).min(100.0)).round() as u8);
            }) as PercentFn
        });

        let mut last_error = None;
        for attempt in 0..=MAX_RETRIES {
            let outcome = self
                .remote
                .upload_file_streamed(local, remote_path, composed.clone())
                .await;

            if outcome.success {
                self.clear_state(local);
                return UploadReport {
                    success: true,
                    bytes_uploaded: size,
                    error: None,
                };
            }

            last_error = outcome.error;
            state.timestamp = chrono::Utc::now().to_rfc3339();
            self.save_state(local, &state);

            if attempt < MAX_RETRIES {
                let delay = (self.delay_fn)(attempt + 1);
                warn!(
                    "upload of {} failed (attempt {}/{}), retrying in {:?}",
                    local.display(),
                    attempt + 1,
                    MAX_RETRIES + 1,
                    delay
                );
                tokio::time::sleep(delay).await;
            }
        }

        let bytes_uploaded =
            (uploaded as f64 / total_chunks as f64 * size as f64) as u64;
        UploadReport {
            success: false,
            bytes_uploaded,
            error: last_error,
        }
    }

    fn fresh_state(
        &self,
        local: &Path,
        remote_path: &str,
        total_chunks: u64,
        checksum: &str,
    ) -> UploadState {
        UploadState {
            file_path: local.to_string_lossy().into_owned(),
            remote_path: remote_path.to_string(),
            chunk_size: self.chunk_size,
            total_chunks,
            uploaded_chunks: Vec::new(),
            checksum: checksum.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}
