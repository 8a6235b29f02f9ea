// Single-run orchestration
// Wires scanner, queue, reporter, and uploader together for one backup or
// restore, and guarantees state is saved on every exit path

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use super::context::SyncContext;
use crate::error::BackupError;
use crate::remote::{parse, RemoteFileEntry};
use crate::scan::{FileScanner, HashCache, ScanConfig};
use crate::transfer::{
    ProgressReporter, ResumableUploader, TaskResult, TransferQueue,
};

/// Aggregate result of one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl RunSummary {
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}

/// One restore task: a remote entry and where it lands locally.
#[derive(Debug, Clone)]
struct RestoreTask {
    entry: RemoteFileEntry,
    local_path: PathBuf,
}

/// Orchestrates a single backup or restore run over an injected remote
/// client. Owns component lifecycle for the run; holds no global state.
pub struct SyncOrchestrator {
    ctx: SyncContext,
}

impl SyncOrchestrator {
    pub fn new(ctx: SyncContext) -> Self {
        Self { ctx }
    }

    /// Probe the remote CLI, mapping the two failure modes to typed errors.
    async fn ensure_cli_ready(&self) -> Result<(), BackupError> {
        let availability = self.ctx.remote.check_availability().await;
        if !availability.installed {
            return Err(BackupError::CliNotInstalled {
                message: availability.error.unwrap_or_default(),
            });
        }
        if !availability.authenticated {
            return Err(BackupError::CliNotAuthenticated {
                message: availability.error.unwrap_or_default(),
            });
        }
        Ok(())
    }

    /// Run one backup of `source_dir` against the configured remote target.
    ///
    /// Scanner completion and state are recorded on the way out even when the
    /// scan itself fails, so the next run can make forward progress.
    pub async fn backup_once(&self, source_dir: &Path) -> Result<RunSummary, BackupError> {
        self.ensure_cli_ready().await?;

        let config = &self.ctx.config;
        let cache_path = config
            .cache_path
            .clone()
            .unwrap_or_else(HashCache::default_cache_path);
        let cache = HashCache::new(cache_path);
        let scan_config = ScanConfig {
            force_upload: config.force,
            include_hidden: config.include_hidden,
            concurrency: config.scan_concurrency,
        };
        let mut scanner = FileScanner::new(source_dir, cache, scan_config)?;
        if let Some(state_path) = &config.state_path {
            scanner = scanner.with_state_path(state_path.clone());
        }

        // Hashing is CPU- and I/O-bound; keep it off the async runtime
        let (scanner, scan_result) = tokio::task::spawn_blocking(move || {
            let mut scanner = scanner;
            let result = scanner.scan();
            (scanner, result)
        })
        .await
        .map_err(|e| {
            BackupError::from_io_error(
                std::io::Error::new(std::io::ErrorKind::Other, e),
                "scanning",
                Some(source_dir.to_path_buf()),
            )
        })?;

        let scanner = Arc::new(Mutex::new(scanner));

        let run_result = match scan_result {
            Err(e) => Err(e),
            Ok(outcome) if outcome.files_to_upload.is_empty() => {
                info!("All files are up to date.");
                Ok(RunSummary::default())
            }
            Ok(outcome) => {
                info!(
                    "{} of {} files changed ({:.2} MB)",
                    outcome.files_to_upload.len(),
                    outcome.all_files.len(),
                    outcome.total_mb()
                );
                Ok(self.upload_batch(Arc::clone(&scanner), outcome.files_to_upload).await)
            }
        };

        {
            let mut scanner = scanner.lock().unwrap();
            scanner.record_completion();
            scanner.save_state();
        }

        run_result
    }

    /// Pre-create remote directories, then drain the upload batch through the
    /// transfer queue.
    async fn upload_batch(
        &self,
        scanner: Arc<Mutex<FileScanner>>,
        batch: Vec<crate::scan::FileRecord>,
    ) -> RunSummary {
        let config = &self.ctx.config;
        let target = config.target.trim_end_matches('/').to_string();
        let target = if target.is_empty() { "/".to_string() } else { target };

        // Every unique remote directory implied by the batch, target root
        // included. BTreeSet ordering puts parents before children.
        let mut directories: BTreeSet<String> = BTreeSet::new();
        directories.insert(target.clone());
        for record in &batch {
            let mut current = target.clone();
            let components: Vec<&str> = record.relative_path.split('/').collect();
            for part in &components[..components.len().saturating_sub(1)] {
                current = parse::join_remote(&current, part);
                directories.insert(current.clone());
            }
        }

        for dir in &directories {
            let outcome = self.ctx.remote.create_folder(dir).await;
            if !outcome.success {
                warn!(
                    "could not create remote folder {}: {}",
                    dir,
                    outcome.error.unwrap_or_default()
                );
            }
        }

        let total = batch.len();
        let reporter = Arc::new(if config.quiet {
            ProgressReporter::hidden(total as u64)
        } else {
            ProgressReporter::new(total as u64)
        });
        reporter.start_updates();

        let uploader = config.resume.then(|| {
            Arc::new(
                ResumableUploader::new(Arc::clone(&self.ctx.remote))
                    .with_chunk_size(config.chunk_size_bytes),
            )
        });

        let remote = Arc::clone(&self.ctx.remote);
        let verbose = config.effective_verbose();
        let handler_reporter = Arc::clone(&reporter);
        let handler_target = target.clone();

        let queue = TransferQueue::new(config.concurrency(), move |record: crate::scan::FileRecord| {
            let remote = Arc::clone(&remote);
            let uploader = uploader.clone();
            let reporter = Arc::clone(&handler_reporter);
            let scanner = Arc::clone(&scanner);
            let remote_file = parse::join_remote(&handler_target, &record.relative_path);

            async move {
                let (success, error) = match &uploader {
                    Some(uploader)
                        if ResumableUploader::should_use_resumable(record.size_bytes) =>
                    {
                        let report = uploader
                            .upload_large_file(&record.absolute_path, &remote_file, None)
                            .await;
                        (report.success, report.error)
                    }
                    _ => {
                        let outcome = remote
                            .upload_file_streamed(&record.absolute_path, &remote_file, None)
                            .await;
                        (outcome.success, outcome.error)
                    }
                };

                if success {
                    {
                        let mut scanner = scanner.lock().unwrap();
                        scanner.update_file_state(&record.relative_path, &record.content_digest);
                    }
                    if verbose {
                        reporter.log_line(&format!("uploaded {}", record.relative_path));
                    }
                    reporter.record_success();
                } else {
                    reporter.log_line(&format!(
                        "upload of {} failed: {}",
                        record.relative_path,
                        error.unwrap_or_default()
                    ));
                    reporter.record_failure();
                }

                TaskResult {
                    success,
                    identifier: record.relative_path,
                }
            }
        });

        queue.set_queue(batch);
        let stats = queue.start().await;

        reporter.stop_updates();
        reporter.render_summary("Backup complete");

        RunSummary {
            attempted: total,
            succeeded: stats.succeeded,
            failed: stats.failed,
        }
    }

    /// Restore a remote tree under `remote_path` into `destination`.
    ///
    /// Files whose local counterpart already matches the remote size are
    /// skipped unless `force` is set.
    pub async fn restore(
        &self,
        remote_path: &str,
        destination: &Path,
    ) -> Result<RunSummary, BackupError> {
        self.ensure_cli_ready().await?;

        let config = &self.ctx.config;
        let base = remote_path.trim_end_matches('/').to_string();
        let base = if base.is_empty() { "/".to_string() } else { base };

        // Walk the remote tree breadth-first
        let mut files: Vec<RemoteFileEntry> = Vec::new();
        let mut to_visit = vec![base.clone()];
        while let Some(dir) = to_visit.pop() {
            let listing = self.ctx.remote.list_files(&dir).await;
            if let Some(error) = listing.error {
                warn!("could not list {}: {}", dir, error);
                continue;
            }
            for entry in listing.files {
                if entry.is_folder {
                    to_visit.push(entry.path.clone());
                } else {
                    files.push(entry);
                }
            }
        }

        let tasks: Vec<RestoreTask> = files
            .into_iter()
            .map(|entry| {
                let relative = entry
                    .path
                    .strip_prefix(base.as_str())
                    .unwrap_or(entry.path.as_str())
                    .trim_start_matches('/')
                    .to_string();
                let local_path = destination.join(relative);
                RestoreTask { entry, local_path }
            })
            .filter(|task| {
                config.force || !is_file_up_to_date(&task.local_path, task.entry.size_bytes)
            })
            .collect();

        if tasks.is_empty() {
            info!("All files are up to date.");
            return Ok(RunSummary::default());
        }

        for task in &tasks {
            if let Some(parent) = task.local_path.parent() {
                if let Err(e) = fs::create_dir_all(parent) {
                    warn!("could not create {}: {}", parent.display(), e);
                }
            }
        }

        let total = tasks.len();
        let reporter = Arc::new(if config.quiet {
            ProgressReporter::hidden(total as u64)
        } else {
            ProgressReporter::new(total as u64)
        });
        reporter.start_updates();

        let remote = Arc::clone(&self.ctx.remote);
        let verbose = config.effective_verbose();
        let handler_reporter = Arc::clone(&reporter);

        let queue = TransferQueue::new(config.concurrency(), move |task: RestoreTask| {
            let remote = Arc::clone(&remote);
            let reporter = Arc::clone(&handler_reporter);

            async move {
                let outcome = remote
                    .download_file_streamed(&task.entry.path, &task.local_path, None)
                    .await;

                if outcome.success {
                    if verbose {
                        reporter.log_line(&format!("restored {}", task.entry.path));
                    }
                    reporter.record_success();
                } else {
                    reporter.log_line(&format!(
                        "restore of {} failed: {}",
                        task.entry.path,
                        outcome.error.unwrap_or_default()
                    ));
                    reporter.record_failure();
                }

                TaskResult {
                    success: outcome.success,
                    identifier: task.entry.path,
                }
            }
        });

        queue.set_queue(tasks);
        let stats = queue.start().await;

        reporter.stop_updates();
        reporter.render_summary("Restore complete");

        Ok(RunSummary {
            attempted: total,
            succeeded: stats.succeeded,
            failed: stats.failed,
        })
    }
}

/// A local file counts as up to date when it exists with the remote's size.
fn is_file_up_to_date(local: &Path, remote_size: u64) -> bool {
    match fs::metadata(local) {
        Ok(metadata) => metadata.is_file() && metadata.len() == remote_size,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_is_file_up_to_date() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.txt");
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(b"hello").unwrap();

        assert!(is_file_up_to_date(&path, 5));
        assert!(!is_file_up_to_date(&path, 6));
        assert!(!is_file_up_to_date(&dir.path().join("missing"), 5));
    }
}
