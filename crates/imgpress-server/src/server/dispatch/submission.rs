use super::context::RequestContext;
use crate::server::pool::WorkerPool;
use imgpress_core::{Error, Job, Result};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

/// A job output together with its end-to-end latency (enqueue to reply).
#[derive(Debug)]
pub struct Submission<T> {
    pub output: T,
    pub latency: Duration,
}

/// Submits `job` to `pool` and waits for its outcome or for `ctx` to end.
///
/// Enqueueing is not raced against `ctx`: a full queue delays the submitter
/// before the deadline race starts.
///
/// When `ctx` ends first the caller gets [`Error::Timeout`] or
/// [`Error::RequestCancelled`], but the job itself is not withdrawn. The pool
/// still runs it and its outcome is discarded.
///
/// # Errors
///
/// - [`Error::ServiceShutdown`] if the pool is draining.
/// - Whatever [`Job::process`] returned.
/// - [`Error::Timeout`] / [`Error::RequestCancelled`] from `ctx`.
/// - [`Error::ChannelError`] if the reply was dropped without a value.
pub async fn submit_and_wait<J: Job>(
    pool: &WorkerPool<J>,
    job: J,
    ctx: &RequestContext,
) -> Result<Submission<J::Output>> {
    let start = Instant::now();
    let (tx, rx) = oneshot::channel();
    pool.submit(job, tx).await?;

    tokio::select! {
        biased;
        reply = rx => match reply {
            Ok(Ok(output)) => Ok(Submission {
                output,
                latency: start.elapsed(),
            }),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(Error::ChannelError {
                context: "reply dropped without a value".to_string(),
            }),
        },
        err = ctx.done() => {
            #[cfg(feature = "tracing")]
            tracing::debug!("Stopped waiting for job: {err}");
            Err(err)
        }
    }
}
