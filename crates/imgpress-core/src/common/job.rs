//! The contract between the worker pool and a unit of work.
//!
//! The pool knows nothing about images. It dequeues values implementing
//! [`Job`], calls [`Job::process`] exactly once on a blocking thread, and
//! hands the outcome back to whoever submitted it. Taking `self` by value is
//! what enforces the single invocation: a processed job no longer exists.

use crate::Result;

/// A unit of work executed by the worker pool.
///
/// `process` is synchronous and may block for as long as the work takes. It
/// must only consume its own input and produce its output; the pool never
/// interrupts it once started.
pub trait Job: Send + 'static {
    /// The value produced on success.
    type Output: JobOutput + Send + 'static;

    /// Opaque identifier used to correlate the job with its output and logs.
    fn id(&self) -> &str;

    /// Runs the job to completion.
    ///
    /// # Errors
    ///
    /// Returns an error when the input cannot be read or transformed.
    fn process(self) -> Result<Self::Output>;
}

/// The result side of the [`Job`] contract.
pub trait JobOutput {
    /// Identifier of the job that produced this output.
    fn job_id(&self) -> &str;
}

/// Generates a fresh, time-ordered job identifier.
pub fn new_job_id() -> String {
    uuid::Uuid::now_v7().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn job_ids_are_unique() {
        let ids: HashSet<_> = (0..1024).map(|_| new_job_id()).collect();
        assert_eq!(ids.len(), 1024);
    }
}
