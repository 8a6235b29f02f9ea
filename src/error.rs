// Centralized error handling module
// Run-level errors abort a run; per-file failures travel as data, not errors

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Run-level error type for the backup engine.
/// Per-task remote failures are not represented here; they are recorded as
/// transfer outcomes and never abort a batch.
#[derive(Debug)]
pub enum BackupError {
    /// The remote CLI is not on PATH (or produced no version output)
    CliNotInstalled { message: String },
    /// The remote CLI is installed but an authenticated call failed
    CliNotAuthenticated { message: String },

    /// Invalid cron expression passed to --schedule
    InvalidCronExpression { expression: String, reason: String },
    /// Invalid command-line arguments
    InvalidArguments { message: String },

    /// Filesystem errors with context
    SourceNotFound { path: PathBuf },
    Io { path: Option<PathBuf>, operation: String, source: io::Error },

    /// A persisted state document could not be interpreted
    StateCorrupt { path: PathBuf, reason: String },
}

impl fmt::Display for BackupError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            BackupError::CliNotInstalled { message } => {
                write!(f, "The internxt CLI is not installed: {}\n", message)?;
                write!(f, "Suggestion: install it with 'npm install -g @internxt/cli' and ensure it is on PATH")
            }
            BackupError::CliNotAuthenticated { message } => {
                write!(f, "The internxt CLI is not authenticated: {}\n", message)?;
                write!(f, "Suggestion: run 'internxt login' before starting a backup")
            }
            BackupError::InvalidCronExpression { expression, reason } => {
                write!(f, "Invalid cron expression '{}': {}\n", expression, reason)?;
                write!(f, "Suggestion: use a standard 5-field expression such as '*/5 * * * *'")
            }
            BackupError::InvalidArguments { message } => {
                write!(f, "Invalid arguments: {}\n", message)?;
                write!(f, "Suggestion: run with --help to see usage information")
            }
            BackupError::SourceNotFound { path } => {
                write!(f, "Source directory not found: {}\n", path.display())?;
                write!(f, "Suggestion: check that the directory path is correct and the directory exists")
            }
            BackupError::Io { path, operation, source } => {
                if let Some(p) = path {
                    write!(f, "I/O error while {} {}: {}\n", operation, p.display(), source)?;
                } else {
                    write!(f, "I/O error while {}: {}\n", operation, source)?;
                }
                write!(f, "Suggestion: check file permissions and disk space")
            }
            BackupError::StateCorrupt { path, reason } => {
                write!(f, "State file {} could not be read: {}\n", path.display(), reason)?;
                write!(f, "Suggestion: delete the file to start from a clean state")
            }
        }
    }
}

impl std::error::Error for BackupError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BackupError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl BackupError {
    /// Create an Io error with context about the operation and optional path
    pub fn from_io_error(err: io::Error, operation: &str, path: Option<PathBuf>) -> Self {
        match (err.kind(), &path) {
            (io::ErrorKind::NotFound, Some(p)) if operation.contains("scan") => {
                BackupError::SourceNotFound { path: p.clone() }
            }
            _ => BackupError::Io {
                path,
                operation: operation.to_string(),
                source: err,
            },
        }
    }

    /// True for the errors that must abort a run before any work is done
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            BackupError::CliNotInstalled { .. } | BackupError::CliNotAuthenticated { .. }
        )
    }
}

impl From<io::Error> for BackupError {
    fn from(err: io::Error) -> Self {
        BackupError::from_io_error(err, "unknown operation", None)
    }
}
