use super::request::WorkRequest;
use crate::server::telemetry::{decrement_workers_busy, increment_workers_busy, record_job_duration};
use imgpress_core::{Error, Job};
use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Instant,
};
use tokio::sync::{Mutex, mpsc};

/// Receiving end of the job queue, shared by every worker.
pub type SharedQueue<J> = Arc<Mutex<mpsc::Receiver<WorkRequest<J>>>>;

/// Worker task responsible for executing queued jobs.
///
/// Each worker takes the next [`WorkRequest`] off the shared queue, runs
/// [`Job::process`] on Tokio's blocking pool and answers on the request's
/// reply channel. The loop ends once the queue is closed and empty, which
/// only happens after [`WorkerPool::shutdown`] dropped the last sender.
///
/// A job that has been dequeued always runs to completion. If the submitter
/// stopped waiting in the meantime the outcome is discarded.
///
/// # Arguments
///
/// - `worker_id`: Identifier for this worker (used for logs/tracing).
/// - `queue`: The pool's shared receiver.
/// - `busy`: Pool-wide count of workers currently inside a job.
///
/// [`WorkerPool::shutdown`]: super::manager::WorkerPool::shutdown
pub async fn worker_loop<J: Job>(worker_id: usize, queue: SharedQueue<J>, busy: Arc<AtomicUsize>) {
    #[cfg(feature = "tracing")]
    tracing::trace!("Worker {worker_id} started");

    loop {
        // The lock is only held while waiting for the next request, never
        // while a job runs.
        let next = queue.lock().await.recv().await;
        let Some(WorkRequest { job, reply }) = next else {
            break;
        };

        let _job_id = job.id().to_string();
        let _busy_now = busy.fetch_add(1, Ordering::AcqRel) + 1;
        increment_workers_busy();

        #[cfg(feature = "tracing")]
        tracing::trace!("Worker {worker_id} picked up job {_job_id} ({_busy_now} busy)");

        let start = Instant::now();
        let outcome = match tokio::task::spawn_blocking(move || job.process()).await {
            Ok(outcome) => outcome,
            Err(e) => Err(Error::ChannelError {
                context: format!("worker {worker_id} lost job: {e}"),
            }),
        };

        busy.fetch_sub(1, Ordering::AcqRel);
        decrement_workers_busy();
        record_job_duration(start.elapsed().as_secs_f64() * 1000.0);

        if reply.send(outcome).is_err() {
            #[cfg(feature = "tracing")]
            tracing::debug!("Worker {worker_id} finished job {_job_id} after its submitter left");
        }
    }

    #[cfg(feature = "tracing")]
    tracing::trace!("Worker {worker_id} stopped");
}
