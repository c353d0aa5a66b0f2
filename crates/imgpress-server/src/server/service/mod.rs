//! HTTP service implementation.
//!
//! ## Structure
//!
//! - [`handler`] - Service entry point ([`CompressionService`]) and routes.
//! - [`multipart`] - Upload parsing.
//! - [`archive`] - Zip packaging of batch results.
//! - [`error`] - Error to status code mapping.
//! - [`stats`] - Counters behind `GET /stats`.

pub mod archive;
pub mod error;
pub mod handler;
pub mod multipart;
pub mod stats;

pub use handler::CompressionService;
