//! Serial queue for model maintenance jobs.

use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{trace, warn};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Runs submitted jobs one at a time, in submission order, on the blocking
/// pool of a tokio runtime.
///
/// Jobs may block on disk I/O; callers must not assume a job has run when
/// `submit` returns.
pub struct ModelTaskQueue {
    tx: mpsc::UnboundedSender<Job>,
    worker: JoinHandle<()>,
}

impl ModelTaskQueue {
    /// Starts the queue worker on `runtime`.
    pub fn spawn(runtime: &Handle) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        let worker = runtime.spawn(async move {
            while let Some(job) = rx.recv().await {
                if let Err(e) = tokio::task::spawn_blocking(job).await {
                    warn!(error = %e, "model task failed");
                }
            }
            trace!("model task queue drained");
        });
        Self { tx, worker }
    }

    /// Queues `job`. Returns false if the queue has shut down.
    pub fn submit(&self, job: impl FnOnce() + Send + 'static) -> bool {
        self.tx.send(Box::new(job)).is_ok()
    }

    /// Waits until every job submitted before this call has run.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.submit(move || {
            let _ = done_tx.send(());
        }) {
            let _ = done_rx.await;
        }
    }
}

impl Drop for ModelTaskQueue {
    fn drop(&mut self) {
        self.worker.abort();
    }
}
