// Daemon scheduling
// Cron-driven backups with overlap protection and signal-driven shutdown

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use cron::Schedule;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::orchestrator::SyncOrchestrator;
use crate::error::BackupError;

/// Parse a cron expression, accepting the standard 5-field form by
/// prepending a seconds field.
pub fn parse_schedule(expression: &str) -> Result<Schedule, BackupError> {
    let normalized = if expression.split_whitespace().count() == 5 {
        format!("0 {}", expression)
    } else {
        expression.to_string()
    };

    Schedule::from_str(&normalized).map_err(|e| BackupError::InvalidCronExpression {
        expression: expression.to_string(),
        reason: e.to_string(),
    })
}

/// Duration until the schedule's next firing, if any.
pub fn time_until_next(schedule: &Schedule) -> Option<Duration> {
    let next = schedule.upcoming(Utc).next()?;
    Some((next - Utc::now()).to_std().unwrap_or(Duration::ZERO))
}

/// Run the backup loop until SIGINT or SIGTERM.
///
/// One backup runs immediately; after that, each cron firing launches a run
/// unless the previous one is still in flight, in which case the firing is
/// skipped. The function returns on shutdown; terminating the process is the
/// entry program's responsibility.
pub async fn run_daemon(
    orchestrator: Arc<SyncOrchestrator>,
    source_dir: PathBuf,
    expression: &str,
) -> Result<(), BackupError> {
    let schedule = parse_schedule(expression)?;

    info!("daemon started with schedule '{}'", expression);

    // The immediate run surfaces precondition failures before the loop starts
    orchestrator.backup_once(&source_dir).await?;

    let running = Arc::new(AtomicBool::new(false));
    let mut in_flight: Option<JoinHandle<()>> = None;

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        let Some(delay) = time_until_next(&schedule) else {
            info!("schedule has no further firings");
            break;
        };

        tokio::select! {
            _ = &mut shutdown => {
                info!("shutdown signal received, stopping scheduler");
                break;
            }
            _ = tokio::time::sleep(delay) => {
                if running.swap(true, Ordering::SeqCst) {
                    warn!("previous backup still in progress, skipping this firing");
                    continue;
                }

                let orchestrator = Arc::clone(&orchestrator);
                let source = source_dir.clone();
                let flag = Arc::clone(&running);
                in_flight = Some(tokio::spawn(async move {
                    if let Err(e) = orchestrator.backup_once(&source).await {
                        error!("scheduled backup failed: {}", e);
                    }
                    flag.store(false, Ordering::SeqCst);
                }));
            }
        }
    }

    // Shutdown is cooperative: an in-flight run completes before we return
    if let Some(handle) = in_flight {
        if running.load(Ordering::SeqCst) {
            info!("waiting for in-flight backup to finish");
        }
        let _ = handle.await;
    }

    Ok(())
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = match signal(SignalKind::terminate()) {
            Ok(term) => term,
            Err(e) => {
                warn!("could not install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = term.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_five_field_expression() {
        let schedule = parse_schedule("*/5 * * * *").unwrap();
        assert!(schedule.upcoming(Utc).next().is_some());
    }

    #[test]
    fn test_parse_six_field_expression() {
        assert!(parse_schedule("0 */5 * * * *").is_ok());
    }

    #[test]
    fn test_parse_invalid_expression() {
        let err = parse_schedule("not a cron").unwrap_err();
        assert!(matches!(err, BackupError::InvalidCronExpression { .. }));
    }

    #[test]
    fn test_time_until_next_is_bounded() {
        // */5 minutes fires within the next five minutes
        let schedule = parse_schedule("*/5 * * * *").unwrap();
        let delay = time_until_next(&schedule).unwrap();
        assert!(delay <= Duration::from_secs(5 * 60));
    }
}
