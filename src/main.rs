use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use console::style;
use tracing_subscriber::EnvFilter;

use internxt_backup::cli::{CacheCommands, Cli, Commands, SyncOptions};
use internxt_backup::error::BackupError;
use internxt_backup::remote::InternxtCli;
use internxt_backup::scan::HashCache;
use internxt_backup::sync::{run_daemon, SyncContext, SyncOrchestrator};
use internxt_backup::transfer::LogSink;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let code = run(cli).await;
    std::process::exit(code);
}

async fn run(cli: Cli) -> i32 {
    // Bare positional form is a synonym for `backup`
    let command = match (cli.command, cli.source_dir) {
        (Some(command), _) => command,
        (None, Some(source_dir)) => Commands::Backup {
            source_dir,
            options: cli.options,
        },
        (None, None) => {
            eprintln!("{}", style("Error: missing source directory or subcommand").red());
            eprintln!("Run with --help for usage.");
            return 1;
        }
    };

    match command {
        Commands::Backup { source_dir, options } => {
            init_logging(&options);
            run_backup(source_dir, options).await
        }
        Commands::Restore {
            remote_path,
            destination,
            options,
        } => {
            init_logging(&options);
            run_restore(remote_path, destination, options).await
        }
        Commands::Cache(command) => run_cache(command),
    }
}

fn init_logging(options: &SyncOptions) {
    let level = if options.quiet {
        "error"
    } else if options.verbose {
        "debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    // All log output goes through the sink so it cannot corrupt an active
    // progress bar
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(LogSink)
        .init();
}

async fn run_backup(source_dir: PathBuf, options: SyncOptions) -> i32 {
    if options.daemon && options.schedule.is_none() {
        return fatal(&BackupError::InvalidArguments {
            message: "--daemon requires --schedule".to_string(),
        });
    }

    let config = options.to_sync_config("/Backups");
    let ctx = SyncContext::new(Arc::new(InternxtCli::new()), config);
    let orchestrator = Arc::new(SyncOrchestrator::new(ctx));

    if options.daemon {
        let expression = options.schedule.as_deref().unwrap_or_default();
        match run_daemon(orchestrator, source_dir, expression).await {
            Ok(()) => 0,
            Err(e) => fatal(&e),
        }
    } else {
        // Backup exits 0 whenever the batch was attempted, even with
        // per-file failures; only run-level errors are fatal
        match orchestrator.backup_once(&source_dir).await {
            Ok(_) => 0,
            Err(e) => fatal(&e),
        }
    }
}

async fn run_restore(
    remote_path: String,
    destination: Option<PathBuf>,
    options: SyncOptions,
) -> i32 {
    let destination = destination.unwrap_or_else(|| {
        options
            .target
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
    });

    let config = options.to_sync_config("/Backups");
    let ctx = SyncContext::new(Arc::new(InternxtCli::new()), config);
    let orchestrator = SyncOrchestrator::new(ctx);

    match orchestrator.restore(&remote_path, &destination).await {
        Ok(summary) if summary.all_succeeded() => 0,
        Ok(_) => 1,
        Err(e) => fatal(&e),
    }
}

fn run_cache(command: CacheCommands) -> i32 {
    let mut cache = HashCache::new(HashCache::default_cache_path());
    match command {
        CacheCommands::Stats => {
            cache.load();
            println!("{} entries at {}", cache.len(), cache.path().display());
            0
        }
        CacheCommands::Clear => {
            if cache.clear_persistent() {
                println!("hash cache cleared");
                0
            } else {
                1
            }
        }
    }
}

fn fatal(error: &BackupError) -> i32 {
    eprintln!("{}", style(format!("Error: {}", error)).red());
    eprintln!("Run with --help for usage.");
    1
}
