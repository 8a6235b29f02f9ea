// Bounded-concurrency transfer dispatch
// Tasks run in enqueue order; completion order is unspecified

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::warn;

/// What a handler reports back for one task.
#[derive(Debug, Clone)]
pub struct TaskResult {
    pub success: bool,
    /// Human-readable task identity for logs
    pub identifier: String,
}

/// Aggregate outcome of a drained batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub succeeded: usize,
    pub failed: usize,
}

type BoxFuture = Pin<Box<dyn Future<Output = TaskResult> + Send>>;
type Handler<T> = Arc<dyn Fn(T) -> BoxFuture + Send + Sync>;

/// Dispatches a batch of tasks to a handler with bounded concurrency.
///
/// `start` is awaitable and returns only after the last handler has settled,
/// so completion detection cannot race with in-flight tasks. Handler failures
/// are logged and counted; they never stop the drain.
pub struct TransferQueue<T> {
    max_concurrency: usize,
    handler: Handler<T>,
    pending: Arc<Mutex<VecDeque<T>>>,
    active: Arc<AtomicUsize>,
}

impl<T: Send + 'static> TransferQueue<T> {
    pub fn new<F, Fut>(max_concurrency: usize, handler: F) -> Self
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = TaskResult> + Send + 'static,
    {
        Self {
            max_concurrency: max_concurrency.max(1),
            handler: Arc::new(move |task| Box::pin(handler(task)) as BoxFuture),
            pending: Arc::new(Mutex::new(VecDeque::new())),
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Replace the pending list.
    pub fn set_queue(&self, tasks: Vec<T>) {
        let mut pending = self.pending.lock().unwrap();
        *pending = tasks.into();
    }

    /// Clear the pending list. In-flight tasks are not interrupted.
    pub fn cancel(&self) {
        self.pending.lock().unwrap().clear();
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn is_idle(&self) -> bool {
        self.pending_count() == 0 && self.active_count() == 0
    }

    /// Drain the pending list and await every spawned handler.
    pub async fn start(&self) -> QueueStats {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut join_set: JoinSet<TaskResult> = JoinSet::new();

        loop {
            // Wait for a slot before taking the next task, so a cancel while
            // saturated removes everything not yet started
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .expect("queue semaphore closed");

            let task = {
                let mut pending = self.pending.lock().unwrap();
                pending.pop_front()
            };
            let Some(task) = task else {
                break;
            };

            self.active.fetch_add(1, Ordering::SeqCst);
            let handler = Arc::clone(&self.handler);
            let active = Arc::clone(&self.active);

            join_set.spawn(async move {
                let result = handler(task).await;
                active.fetch_sub(1, Ordering::SeqCst);
                drop(permit);
                result
            });
        }

        let mut stats = QueueStats::default();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(result) => {
                    if result.success {
                        stats.succeeded += 1;
                    } else {
                        warn!("transfer failed: {}", result.identifier);
                        stats.failed += 1;
                    }
                }
                Err(e) => {
                    warn!("transfer task aborted: {}", e);
                    stats.failed += 1;
                }
            }
        }

        stats
    }
}
