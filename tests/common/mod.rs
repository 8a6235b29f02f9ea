// Shared fixtures for integration tests
// MockRemote satisfies the RemoteClient capability set with scriptable
// outcomes and a full record of every invocation

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;

use internxt_backup::remote::{
    CliAvailability, PercentFn, RemoteClient, RemoteFileEntry, RemoteListing, TransferOutcome,
};

/// One recorded call against the mock.
#[derive(Debug, Clone, PartialEq)]
pub enum Invocation {
    CheckAvailability,
    Upload { local: PathBuf, remote: String },
    Download { remote: String, local: PathBuf },
    CreateFolder(String),
    List(String),
    Delete(String),
}

pub struct MockRemote {
    pub installed: bool,
    pub authenticated: bool,
    invocations: Mutex<Vec<Invocation>>,
    /// Remote upload path -> remaining failures before success
    /// (u32::MAX means the upload never succeeds)
    upload_failures: Mutex<HashMap<String, u32>>,
    /// Directory path -> entries served by list_files
    listings: Mutex<HashMap<String, Vec<RemoteFileEntry>>>,
    /// Remote path -> bytes written by download_file
    downloads: Mutex<HashMap<String, Vec<u8>>>,
}

impl MockRemote {
    pub fn new() -> Self {
        Self {
            installed: true,
            authenticated: true,
            invocations: Mutex::new(Vec::new()),
            upload_failures: Mutex::new(HashMap::new()),
            listings: Mutex::new(HashMap::new()),
            downloads: Mutex::new(HashMap::new()),
        }
    }

    pub fn not_installed() -> Self {
        Self {
            installed: false,
            ..Self::new()
        }
    }

    pub fn not_authenticated() -> Self {
        Self {
            authenticated: false,
            ..Self::new()
        }
    }

    /// Make uploads to `remote` fail `times` times before succeeding.
    pub fn fail_upload(&self, remote: &str, times: u32) {
        self.upload_failures
            .lock()
            .unwrap()
            .insert(remote.to_string(), times);
    }

    /// Serve `entries` when `dir` is listed.
    pub fn serve_listing(&self, dir: &str, entries: Vec<RemoteFileEntry>) {
        self.listings
            .lock()
            .unwrap()
            .insert(dir.to_string(), entries);
    }

    /// Serve `content` when `remote` is downloaded.
    pub fn serve_download(&self, remote: &str, content: &[u8]) {
        self.downloads
            .lock()
            .unwrap()
            .insert(remote.to_string(), content.to_vec());
    }

    pub fn recorded(&self) -> Vec<Invocation> {
        self.invocations.lock().unwrap().clone()
    }

    pub fn upload_count(&self) -> usize {
        self.recorded()
            .iter()
            .filter(|i| matches!(i, Invocation::Upload { .. }))
            .count()
    }

    pub fn created_folders(&self) -> Vec<String> {
        self.recorded()
            .iter()
            .filter_map(|i| match i {
                Invocation::CreateFolder(path) => Some(path.clone()),
                _ => None,
            })
            .collect()
    }

    fn record(&self, invocation: Invocation) {
        self.invocations.lock().unwrap().push(invocation);
    }

    fn upload_outcome(&self, remote: &str) -> TransferOutcome {
        let mut failures = self.upload_failures.lock().unwrap();
        match failures.get_mut(remote) {
            Some(&mut u32::MAX) => TransferOutcome::failed("connection reset"),
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                TransferOutcome::failed("connection reset")
            }
            _ => TransferOutcome::ok(),
        }
    }
}

#[async_trait]
impl RemoteClient for MockRemote {
    async fn check_availability(&self) -> CliAvailability {
        self.record(Invocation::CheckAvailability);
        CliAvailability {
            installed: self.installed,
            authenticated: self.authenticated,
            version: self.installed.then(|| "1.0.0-mock".to_string()),
            error: (!self.installed || !self.authenticated)
                .then(|| "mock unavailable".to_string()),
        }
    }

    async fn upload_file(&self, local: &Path, remote: &str) -> TransferOutcome {
        self.record(Invocation::Upload {
            local: local.to_path_buf(),
            remote: remote.to_string(),
        });
        self.upload_outcome(remote)
    }

    async fn upload_file_streamed(
        &self,
        local: &Path,
        remote: &str,
        on_percent: Option<PercentFn>,
    ) -> TransferOutcome {
        let outcome = self.upload_file(local, remote).await;
        if outcome.success {
            if let Some(callback) = on_percent {
                callback(100);
            }
        }
        outcome
    }

    async fn download_file(&self, remote: &str, local: &Path) -> TransferOutcome {
        self.record(Invocation::Download {
            remote: remote.to_string(),
            local: local.to_path_buf(),
        });
        let content = self.downloads.lock().unwrap().get(remote).cloned();
        match content {
            Some(content) => {
                if let Some(parent) = local.parent() {
                    let _ = fs::create_dir_all(parent);
                }
                match fs::write(local, content) {
                    Ok(()) => TransferOutcome::ok(),
                    Err(e) => TransferOutcome::failed(e.to_string()),
                }
            }
            None => TransferOutcome::failed("not found"),
        }
    }

    async fn download_file_streamed(
        &self,
        remote: &str,
        local: &Path,
        on_percent: Option<PercentFn>,
    ) -> TransferOutcome {
        let outcome = self.download_file(remote, local).await;
        if outcome.success {
            if let Some(callback) = on_percent {
                callback(100);
            }
        }
        outcome
    }

    async fn create_folder(&self, remote: &str) -> TransferOutcome {
        self.record(Invocation::CreateFolder(remote.to_string()));
        TransferOutcome::ok()
    }

    async fn list_files(&self, remote: &str) -> RemoteListing {
        self.record(Invocation::List(remote.to_string()));
        let files = self
            .listings
            .lock()
            .unwrap()
            .get(remote)
            .cloned()
            .unwrap_or_default();
        RemoteListing { files, error: None }
    }

    async fn file_exists(&self, remote: &str) -> bool {
        self.downloads.lock().unwrap().contains_key(remote)
    }

    async fn delete_file(&self, remote: &str) -> bool {
        self.record(Invocation::Delete(remote.to_string()));
        true
    }
}

/// Build a file with parent directories inside a test tree.
pub fn write_file(root: &Path, relative: &str, content: &[u8]) -> PathBuf {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
    path
}
