//! File discovery and change detection.
//!
//! The scanner walks the source tree, digests content, and asks the
//! persistent hash cache which files changed since the last observation.

pub mod cache;
pub mod digest;
pub mod scanner;
pub mod state;

pub use cache::HashCache;
pub use scanner::{ChangeState, FileRecord, FileScanner, ScanConfig, ScanOutcome};
pub use state::ScannerState;
