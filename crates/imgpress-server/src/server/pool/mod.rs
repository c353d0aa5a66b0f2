//! Bounded worker pool executing [`Job`](imgpress_core::Job)s.
//!
//! - [`manager`] - the [`WorkerPool`] handle: submission, backpressure and
//!   graceful shutdown.
//! - [`worker`] - the loop each worker task runs.
//! - [`request`] - the queued (job, reply) pair.

pub mod manager;
pub mod request;
pub mod worker;

pub use manager::{PoolState, WorkerPool};
pub use request::{Reply, WorkRequest};
