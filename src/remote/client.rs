// Remote client capability set
// Everything that talks to the remote store goes through this trait,
// so tests and the resumable uploader can substitute implementations

use std::path::Path;

use async_trait::async_trait;

use super::types::{CliAvailability, PercentFn, RemoteListing, TransferOutcome};

/// Capability set over the remote object store.
///
/// The production implementation shells out to the `internxt` CLI one
/// subprocess per call; mock implementations satisfy the same interface for
/// tests. Implementations never abort: failures come back as data.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// Probe the CLI: `--version` first, then a cheap authenticated call.
    async fn check_availability(&self) -> CliAvailability;

    /// Upload a single file, discarding progress output.
    async fn upload_file(&self, local: &Path, remote: &str) -> TransferOutcome;

    /// Upload a single file, forwarding each `<digits>%` occurrence in the
    /// CLI's output to `on_percent`.
    async fn upload_file_streamed(
        &self,
        local: &Path,
        remote: &str,
        on_percent: Option<PercentFn>,
    ) -> TransferOutcome;

    /// Download a single file, discarding progress output.
    async fn download_file(&self, remote: &str, local: &Path) -> TransferOutcome;

    /// Download a single file with progress forwarding.
    async fn download_file_streamed(
        &self,
        remote: &str,
        local: &Path,
        on_percent: Option<PercentFn>,
    ) -> TransferOutcome;

    /// Create a remote folder. "Already exists" counts as success.
    async fn create_folder(&self, remote: &str) -> TransferOutcome;

    /// List a remote directory.
    async fn list_files(&self, remote: &str) -> RemoteListing;

    /// Whether a remote path exists (file or folder).
    async fn file_exists(&self, remote: &str) -> bool;

    /// Permanently delete a remote path.
    async fn delete_file(&self, remote: &str) -> bool;
}
