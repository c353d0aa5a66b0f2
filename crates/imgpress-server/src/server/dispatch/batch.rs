use super::{context::RequestContext, submission::submit_and_wait};
use crate::server::{pool::WorkerPool, telemetry::record_batch_items};
use futures::future::join_all;
use imgpress_core::{Error, Job};
use parking_lot::Mutex;
use std::{sync::Arc, time::Duration};
use tokio::sync::Semaphore;

/// One named unit of a batch.
pub struct BatchItem<J> {
    pub filename: String,
    pub job: J,
}

impl<J> BatchItem<J> {
    pub fn new(filename: impl Into<String>, job: J) -> Self {
        Self {
            filename: filename.into(),
            job,
        }
    }
}

#[derive(Debug)]
pub struct BatchSuccess<T> {
    pub filename: String,
    pub output: T,
    pub latency: Duration,
}

/// A per-item failure, tagged with the item's filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchError {
    pub filename: String,
    pub error: Error,
}

/// Outcome of a batch. Every item lands in exactly one of the two lists, in
/// completion order.
#[derive(Debug)]
pub struct BatchResponse<T> {
    pub results: Vec<BatchSuccess<T>>,
    pub errors: Vec<BatchError>,
}

impl<T> BatchResponse<T> {
    pub fn len(&self) -> usize {
        self.results.len() + self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Fans a batch out over the pool and collects per-item outcomes.
///
/// Every item runs as its own task:
///
/// 1. Wait for one of `worker_count` batch permits.
/// 2. If the batch context is already done, record its error for the item
///    without submitting.
/// 3. Otherwise run [`submit_and_wait`] under a child context limited to
///    `item_timeout` (and never past the batch deadline).
///
/// The permit is held until the item's outcome is known, so at most
/// `worker_count` items of one batch are submitting or waiting at a time.
/// The pool's queue bound still applies on top of that.
///
/// [`run`](Self::run) waits for every item and never fails as a whole.
pub struct BatchOrchestrator<J: Job> {
    pool: Arc<WorkerPool<J>>,
    item_timeout: Duration,
}

impl<J: Job> BatchOrchestrator<J> {
    pub const fn new(pool: Arc<WorkerPool<J>>, item_timeout: Duration) -> Self {
        Self { pool, item_timeout }
    }

    pub const fn item_timeout(&self) -> Duration {
        self.item_timeout
    }

    pub async fn run(
        &self,
        items: Vec<BatchItem<J>>,
        parent: &RequestContext,
    ) -> BatchResponse<J::Output> {
        let total = items.len();
        record_batch_items(total as f64);

        let permits = Arc::new(Semaphore::new(self.pool.worker_count()));
        let results = Arc::new(Mutex::new(Vec::with_capacity(total)));
        let errors = Arc::new(Mutex::new(Vec::new()));

        let (filenames, tasks): (Vec<_>, Vec<_>) = items
            .into_iter()
            .map(|BatchItem { filename, job }| {
                let pool = Arc::clone(&self.pool);
                let permits = Arc::clone(&permits);
                let results = Arc::clone(&results);
                let errors = Arc::clone(&errors);
                let parent = parent.clone();
                let item_timeout = self.item_timeout;
                let task_filename = filename.clone();

                let task = tokio::spawn(async move {
                    // The semaphore is local and never closed.
                    let Ok(_permit) = permits.acquire_owned().await else {
                        return;
                    };

                    if let Some(error) = parent.err() {
                        errors.lock().push(BatchError { filename, error });
                        return;
                    }

                    let ctx = parent.child(item_timeout);
                    match submit_and_wait(&pool, job, &ctx).await {
                        Ok(submission) => results.lock().push(BatchSuccess {
                            filename,
                            output: submission.output,
                            latency: submission.latency,
                        }),
                        Err(error) => errors.lock().push(BatchError { filename, error }),
                    }
                });
                (task_filename, task)
            })
            .unzip();

        for (filename, joined) in filenames.into_iter().zip(join_all(tasks).await) {
            if let Err(e) = joined {
                errors.lock().push(BatchError {
                    filename,
                    error: Error::ChannelError {
                        context: format!("batch task failed: {e}"),
                    },
                });
            }
        }

        let response = BatchResponse {
            results: std::mem::take(&mut *results.lock()),
            errors: std::mem::take(&mut *errors.lock()),
        };

        #[cfg(feature = "tracing")]
        tracing::debug!(
            "Batch of {total} finished: {} ok, {} failed",
            response.results.len(),
            response.errors.len()
        );

        response
    }
}
