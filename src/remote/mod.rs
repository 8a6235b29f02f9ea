//! Remote store access through the external CLI.
//!
//! The engine never speaks to the backup service directly; every operation
//! is one invocation of the `internxt` command-line tool, and this module
//! owns spawning it and interpreting what it prints.

pub mod client;
pub mod internxt;
pub mod parse;
pub mod types;

pub use client::RemoteClient;
pub use internxt::InternxtCli;
pub use types::{CliAvailability, PercentFn, RemoteFileEntry, RemoteListing, TransferOutcome};
