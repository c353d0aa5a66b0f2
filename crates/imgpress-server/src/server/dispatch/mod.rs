//! Deadline-aware dispatch on top of the [`WorkerPool`](super::pool::WorkerPool).
//!
//! - [`context`]: request deadlines and cancellation.
//! - [`submission`]: one submit raced against its context.
//! - [`batch`]: concurrent fan-out of many submissions with per-item errors.

pub mod batch;
pub mod context;
pub mod submission;

pub use batch::{BatchError, BatchItem, BatchOrchestrator, BatchResponse, BatchSuccess};
pub use context::RequestContext;
pub use submission::{Submission, submit_and_wait};
