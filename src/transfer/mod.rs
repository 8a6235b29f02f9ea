//! File transfer machinery.
//!
//! The queue bounds concurrency over a batch, the resumable uploader owns
//! retry and per-file resume state for large files, and the reporter keeps
//! the terminal readable while both are running.

pub mod progress;
pub mod queue;
pub mod resumable;

pub use progress::{LogSink, ProgressReporter};
pub use queue::{QueueStats, TaskResult, TransferQueue};
pub use resumable::{ResumableUploader, UploadReport, UploadState, DEFAULT_CHUNK_SIZE, MAX_RETRIES, RESUMABLE_THRESHOLD};
