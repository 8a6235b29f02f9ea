// Progress reporting
// A single-line bar that coexists with log output without corrupting it

use std::cell::Cell;
use std::io::{self, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::fmt::MakeWriter;

const BAR_WIDTH: usize = 40;
const TICK_INTERVAL: Duration = Duration::from_millis(250);

// The bar currently drawn, if any. The reporter installs it in
// `start_updates` and uninstalls it in `stop_updates`; the log sink consults
// it so every log line knows whether it must erase and redraw.
static ACTIVE_BAR: Mutex<Option<ProgressBar>> = Mutex::new(None);

thread_local! {
    // Re-entrancy guard: a log call made from within the sink passes
    // through unchanged
    static IN_SINK: Cell<bool> = Cell::new(false);
}

/// `MakeWriter` for the tracing subscriber that routes every log line over
/// the active progress bar. While a bar is drawn, each write erases the bar
/// line, emits the log line, and redraws the bar below it; with no bar the
/// line goes straight to stderr.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogSink;

pub struct LogSinkWriter;

impl<'a> MakeWriter<'a> for LogSink {
    type Writer = LogSinkWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogSinkWriter
    }
}

impl Write for LogSinkWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let reentrant = IN_SINK.with(|flag| flag.replace(true));
        if reentrant {
            return io::stderr().write_all(buf).map(|_| buf.len());
        }

        let bar = ACTIVE_BAR.lock().unwrap().clone();
        let result = match bar {
            Some(bar) => bar.suspend(|| io::stderr().write_all(buf)),
            None => io::stderr().write_all(buf),
        };

        IN_SINK.with(|flag| flag.set(false));
        result.map(|_| buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()
    }
}

/// Aggregates per-task outcomes and renders a 40-cell progress bar.
///
/// Counters are monotonic and `succeeded + failed` never exceeds the total.
/// Between `start_updates` and `stop_updates` the bar is registered with
/// [`LogSink`], so log lines emitted anywhere in the process coexist with
/// the bar instead of corrupting it.
pub struct ProgressReporter {
    bar: ProgressBar,
    total: u64,
    succeeded: AtomicU64,
    failed: AtomicU64,
}

impl ProgressReporter {
    /// Create a reporter for a batch of `total` tasks.
    pub fn new(total: u64) -> Self {
        let bar = ProgressBar::new(total);
        bar.set_style(
            ProgressStyle::default_bar()
                .template(&format!(
                    "[{{bar:{}}}] {{pos}}/{{len}} ({{percent}}%)",
                    BAR_WIDTH
                ))
                .unwrap()
                .progress_chars("█░"),
        );
        Self {
            bar,
            total,
            succeeded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    /// Create a reporter that renders nothing (quiet mode); counters still
    /// aggregate.
    pub fn hidden(total: u64) -> Self {
        Self {
            bar: ProgressBar::hidden(),
            total,
            succeeded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    /// Begin periodic rerendering on a timer and install the bar into the
    /// log sink.
    pub fn start_updates(&self) {
        *ACTIVE_BAR.lock().unwrap() = Some(self.bar.clone());
        self.bar.enable_steady_tick(TICK_INTERVAL);
    }

    /// Cancel the timer and uninstall the bar from the log sink. The bar
    /// stays at its final position.
    pub fn stop_updates(&self) {
        self.bar.disable_steady_tick();
        if !self.bar.is_finished() {
            self.bar.abandon();
        }
        *ACTIVE_BAR.lock().unwrap() = None;
    }

    pub fn record_success(&self) {
        self.succeeded.fetch_add(1, Ordering::SeqCst);
        self.advance();
    }

    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::SeqCst);
        self.advance();
    }

    fn advance(&self) {
        let processed = self.processed();
        self.bar.set_position(processed);
        if processed >= self.total {
            // Trailing newline and auto-stop once every task has settled
            self.bar.finish();
        }
    }

    /// Emit a log line while the bar may be visible. The bar line is erased,
    /// the message printed with its own newline, and the bar redrawn below.
    pub fn log_line(&self, message: &str) {
        self.bar.println(message);
    }

    pub fn succeeded(&self) -> u64 {
        self.succeeded.load(Ordering::SeqCst)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::SeqCst)
    }

    pub fn processed(&self) -> u64 {
        self.succeeded() + self.failed()
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    /// Terminal-render predicate: every task has settled.
    pub fn is_complete(&self) -> bool {
        self.processed() == self.total
    }

    /// Print the final one-line outcome: green when clean, yellow when some
    /// tasks failed.
    pub fn render_summary(&self, label: &str) {
        let succeeded = self.succeeded();
        let failed = self.failed();
        let line = format!("{}: {} succeeded, {} failed", label, succeeded, failed);
        if failed == 0 {
            println!("{}", style(line).green());
        } else {
            println!("{}", style(line).yellow());
        }
    }
}
