//! Dedicated single-worker task queue.
//!
//! Tasks run one at a time in submission order on a spawned tokio task.
//! Submitting never waits for execution. Shutdown closes the queue and waits
//! a bounded time for the backlog; whatever is still queued afterwards is
//! dropped and reported.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

type Task = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Returned when submitting to a worker that has been shut down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("worker queue is closed")]
pub struct WorkerClosed;

/// FIFO queue served by exactly one tokio task.
///
/// Must be created from within a tokio runtime.
pub struct SerialWorker {
    name: String,
    tx: Option<mpsc::UnboundedSender<Task>>,
    pending: Arc<AtomicUsize>,
    handle: Option<JoinHandle<()>>,
}

impl SerialWorker {
    pub fn spawn(name: impl Into<String>) -> Self {
        let name = name.into();
        let (tx, mut rx) = mpsc::unbounded_channel::<Task>();
        let pending = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&pending);
        let worker_name = name.clone();
        let handle = tokio::spawn(async move {
            while let Some(task) = rx.recv().await {
                task.await;
                counter.fetch_sub(1, Ordering::SeqCst);
            }
            debug!(worker = %worker_name, "worker queue closed");
        });

        Self {
            name,
            tx: Some(tx),
            pending,
            handle: Some(handle),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of submitted tasks that have not finished yet.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Queues a task behind everything submitted before it.
    pub fn submit<F>(&self, task: F) -> Result<(), WorkerClosed>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let tx = self.tx.as_ref().ok_or(WorkerClosed)?;
        self.pending.fetch_add(1, Ordering::SeqCst);
        tx.send(Box::pin(task)).map_err(|_| {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            WorkerClosed
        })
    }

    /// Waits until every task submitted before this call has run.
    pub async fn drain(&self) -> Result<(), WorkerClosed> {
        let (done_tx, done_rx) = oneshot::channel();
        self.submit(async move {
            let _ = done_tx.send(());
        })?;
        done_rx.await.map_err(|_| WorkerClosed)
    }

    /// Closes the queue and waits up to `timeout` for the backlog.
    ///
    /// Returns the number of tasks dropped because the wait timed out.
    pub async fn shutdown(&mut self, timeout: Duration) -> usize {
        self.tx.take();
        let Some(mut handle) = self.handle.take() else {
            return 0;
        };

        match tokio::time::timeout(timeout, &mut handle).await {
            Ok(_) => 0,
            Err(_) => {
                handle.abort();
                let dropped = self.pending.swap(0, Ordering::SeqCst);
                warn!(
                    worker = %self.name,
                    dropped,
                    timeout_ms = timeout.as_millis() as u64,
                    "worker drain timed out, dropping queued tasks"
                );
                dropped
            }
        }
    }
}

impl std::fmt::Debug for SerialWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialWorker")
            .field("name", &self.name)
            .field("pending", &self.pending())
            .field("closed", &self.tx.is_none())
            .finish()
    }
}
