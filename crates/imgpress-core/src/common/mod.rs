//! Types shared by every layer of the service.
//!
//! - [`error`] - the unified [`Error`] taxonomy.
//! - [`job`] - the contract between the worker pool and a unit of work.
//! - [`types`] - output formats, quality and compression results.

pub mod error;
pub mod job;
pub mod types;

pub use error::{Error, Result};
pub use job::{Job, JobOutput, new_job_id};
pub use types::{CompressionResult, OutputFormat, Quality, compression_ratio};
