//! Error types for the compression service.
//!
//! This module defines the central `Error` enum shared by the compression
//! pipeline, the worker pool, the dispatch protocols and the transport
//! adapters. Every variant is cheap to clone so a single failure can be
//! recorded in a batch response and logged at the same time.
//!
//! ## Error Cases
//! - `Input`: The job's input stream could not be read.
//! - `Decode`: The input bytes are not a decodable image.
//! - `UnsupportedFormat`: The requested output format is not supported.
//! - `Encode`: The encoder rejected the transformed image.
//! - `InvalidRequest`: A transport-level request was malformed.
//! - `ServiceShutdown`: A submission arrived after the pool began draining.
//! - `Timeout`: The caller's deadline elapsed before a result arrived.
//! - `RequestCancelled`: The caller stopped waiting before the deadline.
//! - `ChannelError`: A reply channel closed without delivering a value.

use core::time::Duration;

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the compression service.
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
pub enum Error {
    /// Reading the job's input failed.
    #[error("Input error: {context}")]
    Input { context: String },

    /// The input is not a valid image.
    #[error("Decode error: {context}")]
    Decode { context: String },

    /// The requested output format is outside the supported set.
    #[error("Unsupported output format: {format}")]
    UnsupportedFormat { format: String },

    /// Encoding the transformed image failed.
    #[error("Encode error: {context}")]
    Encode { context: String },

    /// The request was malformed before any job was created.
    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },

    /// The worker pool no longer accepts submissions.
    #[error("Service is shutting down")]
    ServiceShutdown,

    /// No result arrived before the caller's deadline.
    #[error("Request timed out after {}ms", .after.as_millis())]
    Timeout { after: Duration },

    /// The caller cancelled the wait.
    #[error("Request cancelled")]
    RequestCancelled,

    /// Internal channel failure (the reply was dropped without a value).
    #[error("Channel error: {context}")]
    ChannelError { context: String },
}

impl Error {
    /// Short, stable label for logs, metrics attributes and JSON bodies.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Input { .. } => "input",
            Self::Decode { .. } => "decode",
            Self::UnsupportedFormat { .. } => "unsupported_format",
            Self::Encode { .. } => "encode",
            Self::InvalidRequest { .. } => "invalid_request",
            Self::ServiceShutdown => "shutdown",
            Self::Timeout { .. } => "timeout",
            Self::RequestCancelled => "cancelled",
            Self::ChannelError { .. } => "internal",
        }
    }

    /// Returns `true` when the caller gave up waiting rather than the job
    /// failing on its own.
    pub const fn is_abandoned(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::RequestCancelled)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Input {
            context: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_message_reports_millis() {
        let err = Error::Timeout {
            after: Duration::from_millis(1500),
        };
        assert_eq!(err.to_string(), "Request timed out after 1500ms");
        assert!(err.is_abandoned());
    }

    #[test]
    fn io_errors_are_input_errors() {
        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "truncated upload");
        let err = Error::from(io);
        assert_eq!(err.kind(), "input");
        assert!(!err.is_abandoned());
    }
}
