//! Bounded worker pool for CPU-bound jobs.
//!
//! This module defines the [`WorkerPool`] struct, which owns a fixed set of
//! Tokio worker tasks consuming one shared, bounded [`mpsc`] queue. Each
//! submission carries its own reply channel, so the pool never needs to know
//! who is waiting for what.
//!
//! ## Backpressure
//!
//! [`WorkerPool::submit`] waits for queue space when every slot is taken. It
//! never fails because the queue is full; callers that need a bound on that
//! wait race it against their own deadline.
//!
//! ## Lifecycle
//!
//! `Running` → [`WorkerPool::shutdown`] → `Draining` (submissions rejected,
//! queued jobs still execute) → `Stopped` (every worker exited). There is no
//! way back to `Running`.

use super::{
    request::{Reply, WorkRequest},
    worker::worker_loop,
};
use imgpress_core::{Error, Job, Result};
use parking_lot::Mutex;
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};
use tokio::sync::mpsc;
use tokio_util::task::TaskTracker;

/// Observable lifecycle state of a [`WorkerPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    Running,
    Draining,
    Stopped,
}

/// A fixed-size pool of workers fed by a bounded queue.
pub struct WorkerPool<J: Job> {
    // `None` once shutdown has begun. The mutex doubles as the shutdown
    // flag: a submitter either clones the sender before shutdown takes it,
    // or sees `None` and is rejected.
    sender: Mutex<Option<mpsc::Sender<WorkRequest<J>>>>,
    workers: TaskTracker,
    busy: Arc<AtomicUsize>,
    worker_count: usize,
    queue_capacity: usize,
}

impl<J: Job> WorkerPool<J> {
    /// Spawns `worker_count` workers on the current Tokio runtime.
    ///
    /// A `worker_count` of 0 is coerced to 1 and a `queue_capacity` of 0
    /// defaults to twice the worker count.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn new(worker_count: usize, queue_capacity: usize) -> Self {
        let worker_count = worker_count.max(1);
        let queue_capacity = if queue_capacity == 0 {
            worker_count * 2
        } else {
            queue_capacity
        };

        let (tx, rx) = mpsc::channel(queue_capacity);
        let queue = Arc::new(tokio::sync::Mutex::new(rx));
        let busy = Arc::new(AtomicUsize::new(0));
        let workers = TaskTracker::new();

        for worker_id in 0..worker_count {
            workers.spawn(worker_loop(worker_id, Arc::clone(&queue), Arc::clone(&busy)));
        }

        #[cfg(feature = "tracing")]
        tracing::debug!("Started {worker_count} workers with queue capacity {queue_capacity}");

        Self {
            sender: Mutex::new(Some(tx)),
            workers,
            busy,
            worker_count,
            queue_capacity,
        }
    }

    /// Enqueues `job`; its outcome is delivered on `reply`.
    ///
    /// Waits while the queue is full.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ServiceShutdown`] once [`shutdown`](Self::shutdown)
    /// has been called.
    pub async fn submit(&self, job: J, reply: Reply<J::Output>) -> Result<()> {
        let sender = self
            .sender
            .lock()
            .as_ref()
            .cloned()
            .ok_or(Error::ServiceShutdown)?;

        sender
            .send(WorkRequest { job, reply })
            .await
            .map_err(|_| Error::ServiceShutdown)
    }

    /// Stops accepting submissions, lets the workers drain every queued job
    /// and waits for all of them to exit.
    ///
    /// Idempotent: later calls wait for the same workers and return once
    /// they are gone.
    pub async fn shutdown(&self) {
        let sender = self.sender.lock().take();
        if sender.is_some() {
            #[cfg(feature = "tracing")]
            tracing::info!(
                "Refusing new jobs, draining {} queued",
                self.queued_jobs_of(sender.as_ref())
            );
        }
        // Dropping the last sender closes the queue once in-flight
        // submissions have landed.
        drop(sender);

        self.workers.close();
        self.workers.wait().await;

        #[cfg(feature = "tracing")]
        tracing::info!("Worker pool shutdown complete");
    }

    pub fn state(&self) -> PoolState {
        if self.sender.lock().is_some() {
            PoolState::Running
        } else if self.workers.is_empty() {
            PoolState::Stopped
        } else {
            PoolState::Draining
        }
    }

    pub fn is_accepting(&self) -> bool {
        self.state() == PoolState::Running
    }

    /// Number of workers currently executing a job.
    pub fn busy_workers(&self) -> usize {
        self.busy.load(Ordering::Acquire)
    }

    pub const fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub const fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    /// Approximate number of jobs waiting in the queue. Zero once draining.
    pub fn queued_jobs(&self) -> usize {
        self.queued_jobs_of(self.sender.lock().as_ref())
    }

    fn queued_jobs_of(&self, sender: Option<&mpsc::Sender<WorkRequest<J>>>) -> usize {
        sender.map_or(0, |tx| tx.max_capacity() - tx.capacity())
    }
}
