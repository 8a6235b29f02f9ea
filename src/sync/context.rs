// Per-run context
// All run configuration travels through values, never module-level state,
// so concurrent runs against different sources stay independent

use std::path::PathBuf;
use std::sync::Arc;

use crate::remote::RemoteClient;
use crate::transfer::DEFAULT_CHUNK_SIZE;

/// Configuration for one backup or restore run.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Remote folder for backup; local folder for restore
    pub target: String,
    /// Concurrency override; derived from CPU count when absent
    pub cores: Option<usize>,
    /// Ignore change detection and transfer everything
    pub force: bool,
    /// Route large files through the resumable uploader
    pub resume: bool,
    /// Resumable chunk size in bytes
    pub chunk_size_bytes: u64,
    pub quiet: bool,
    pub verbose: bool,
    /// Scan leading-dot entries too
    pub include_hidden: bool,
    /// Digest computation threads during scan
    pub scan_concurrency: usize,
    /// Hash cache location override; the temp-dir default when absent
    pub cache_path: Option<PathBuf>,
    /// Scanner state location override; the temp-dir default when absent
    pub state_path: Option<PathBuf>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            target: "/Backups".to_string(),
            cores: None,
            force: false,
            resume: false,
            chunk_size_bytes: DEFAULT_CHUNK_SIZE,
            quiet: false,
            verbose: false,
            include_hidden: false,
            scan_concurrency: 1,
            cache_path: None,
            state_path: None,
        }
    }
}

impl SyncConfig {
    /// Transfer concurrency: the override, or two thirds of the CPU count.
    pub fn concurrency(&self) -> usize {
        self.cores.unwrap_or_else(|| {
            let cpus = std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1);
            ((cpus * 2) / 3).max(1)
        })
    }

    /// Quiet overrides verbose.
    pub fn effective_verbose(&self) -> bool {
        self.verbose && !self.quiet
    }
}

/// Everything one run needs: configuration plus the injected remote client.
pub struct SyncContext {
    pub remote: Arc<dyn RemoteClient>,
    pub config: SyncConfig,
}

impl SyncContext {
    pub fn new(remote: Arc<dyn RemoteClient>, config: SyncConfig) -> Self {
        Self { remote, config }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concurrency_override() {
        let config = SyncConfig {
            cores: Some(8),
            ..SyncConfig::default()
        };
        assert_eq!(config.concurrency(), 8);
    }

    #[test]
    fn test_concurrency_derived_is_at_least_one() {
        let config = SyncConfig::default();
        assert!(config.concurrency() >= 1);
    }

    #[test]
    fn test_quiet_overrides_verbose() {
        let config = SyncConfig {
            quiet: true,
            verbose: true,
            ..SyncConfig::default()
        };
        assert!(!config.effective_verbose());
    }
}
