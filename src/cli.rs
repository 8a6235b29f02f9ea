// Command-line surface

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "internxt-backup",
    version,
    disable_version_flag = true,
    about = "Incremental, resumable backups to Internxt Drive via the internxt CLI",
    args_conflicts_with_subcommands = true
)]
pub struct Cli {
    /// Print version
    #[arg(short = 'v', long = "version", action = clap::ArgAction::Version, value_parser = clap::value_parser!(bool))]
    pub version: (),

    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Source directory (bare positional form of `backup`)
    #[arg(value_name = "SOURCE_DIR")]
    pub source_dir: Option<PathBuf>,

    #[command(flatten)]
    pub options: SyncOptions,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Back up a local directory tree to the remote store
    Backup {
        /// Source directory to mirror
        source_dir: PathBuf,

        #[command(flatten)]
        options: SyncOptions,
    },

    /// Restore a remote tree to a local destination
    Restore {
        /// Remote path to restore from
        remote_path: String,

        /// Local destination (defaults to the current directory or --target)
        destination: Option<PathBuf>,

        #[command(flatten)]
        options: SyncOptions,
    },

    /// Inspect or reset the persistent hash cache
    #[command(subcommand)]
    Cache(CacheCommands),
}

#[derive(Subcommand)]
pub enum CacheCommands {
    /// Print entry count and on-disk location
    Stats,
    /// Delete the cache so the next run re-hashes everything
    Clear,
}

#[derive(Args, Default)]
pub struct SyncOptions {
    /// Remote folder for backup; local folder for restore
    #[arg(long)]
    pub target: Option<String>,

    /// Concurrent transfers (default: two thirds of the CPU count)
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..=64))]
    pub cores: Option<u64>,

    /// Cron expression for daemon mode
    #[arg(long)]
    pub schedule: Option<String>,

    /// Run as a long-lived daemon on the cron schedule
    #[arg(long)]
    pub daemon: bool,

    /// Ignore change detection and transfer everything
    #[arg(long)]
    pub force: bool,

    /// Resume large uploads across failures
    #[arg(long)]
    pub resume: bool,

    /// Resumable chunk size in MiB
    #[arg(long = "chunk-size", value_parser = clap::value_parser!(u64).range(1..=1024))]
    pub chunk_size: Option<u64>,

    /// Minimal output
    #[arg(long)]
    pub quiet: bool,

    /// Per-file output
    #[arg(long)]
    pub verbose: bool,

    /// Scan entries whose name begins with a dot
    #[arg(long = "include-hidden")]
    pub include_hidden: bool,

    /// Digest computation threads during scan (default: serial)
    #[arg(long = "scan-concurrency", default_value_t = 1, value_parser = clap::value_parser!(u64).range(1..=64))]
    pub scan_concurrency: u64,
}

impl SyncOptions {
    /// Fold the flags into a run configuration with the given default target.
    pub fn to_sync_config(&self, default_target: &str) -> crate::sync::SyncConfig {
        crate::sync::SyncConfig {
            target: self
                .target
                .clone()
                .unwrap_or_else(|| default_target.to_string()),
            cores: self.cores.map(|n| n as usize),
            force: self.force,
            resume: self.resume,
            chunk_size_bytes: self
                .chunk_size
                .map(|mib| mib * 1024 * 1024)
                .unwrap_or(crate::transfer::DEFAULT_CHUNK_SIZE),
            quiet: self.quiet,
            verbose: self.verbose,
            include_hidden: self.include_hidden,
            scan_concurrency: self.scan_concurrency as usize,
            cache_path: None,
            state_path: None,
        }
    }
}
