// Shared types for remote CLI interactions

use std::sync::Arc;

/// Callback receiving transfer progress percentages (0..=100).
pub type PercentFn = Arc<dyn Fn(u8) + Send + Sync>;

/// One entry of a remote directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFileEntry {
    pub name: String,
    /// Remote path, forward-slash separated
    pub path: String,
    pub size_bytes: u64,
    pub is_folder: bool,
}

/// Result of probing the remote CLI.
#[derive(Debug, Clone, Default)]
pub struct CliAvailability {
    pub installed: bool,
    pub authenticated: bool,
    pub version: Option<String>,
    pub error: Option<String>,
}

impl CliAvailability {
    pub fn is_ready(&self) -> bool {
        self.installed && self.authenticated
    }
}

/// Outcome of a single remote transfer or folder operation.
///
/// Remote failures are data, never errors: a failed upload is recorded and
/// the batch drains regardless.
#[derive(Debug, Clone, Default)]
pub struct TransferOutcome {
    pub success: bool,
    pub error: Option<String>,
}

impl TransferOutcome {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Result of listing a remote directory.
#[derive(Debug, Clone, Default)]
pub struct RemoteListing {
    pub files: Vec<RemoteFileEntry>,
    pub error: Option<String>,
}
