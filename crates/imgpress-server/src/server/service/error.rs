use crate::server::{dispatch::BatchError, telemetry::increment_request_errors};
use axum::{
    Json,
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use imgpress_core::Error;
use serde::Serialize;

/// HTTP-facing error for the compression handlers.
///
/// Wraps [`imgpress_core::Error`] for pipeline failures and adds the
/// transport-level cases. Renders as a JSON body with `error` and `kind`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Core(#[from] Error),

    /// The multipart body could not be read (includes exceeding the body
    /// limit, which axum reports as 413).
    #[error("Malformed upload: {0}")]
    Multipart(#[from] MultipartError),

    /// Every file of a batch failed; carries the per-file errors.
    #[error("All {} files failed", .0.len())]
    BatchFailed(Vec<BatchError>),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

/// One failed file, as reported in JSON bodies and batch manifests.
#[derive(Debug, Clone, Serialize)]
pub struct FileError {
    pub filename: String,
    pub kind: &'static str,
    pub error: String,
}

impl From<&BatchError> for FileError {
    fn from(failed: &BatchError) -> Self {
        Self {
            filename: failed.filename.clone(),
            kind: failed.error.kind(),
            error: failed.error.to_string(),
        }
    }
}

/// Maps a pipeline error to the status code a client should see.
pub const fn status_for(error: &Error) -> StatusCode {
    match error {
        Error::Input { .. } | Error::Decode { .. } | Error::InvalidRequest { .. } => {
            StatusCode::BAD_REQUEST
        }
        Error::UnsupportedFormat { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        Error::ServiceShutdown => StatusCode::SERVICE_UNAVAILABLE,
        Error::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        Error::RequestCancelled => StatusCode::REQUEST_TIMEOUT,
        Error::Encode { .. } | Error::ChannelError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl ApiError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Core(e) => e.kind(),
            Self::Multipart(_) => "invalid_request",
            Self::BatchFailed(_) => "batch_failed",
            Self::Internal(_) => "internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Core(e) => status_for(e),
            Self::Multipart(e) => e.status(),
            Self::BatchFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    kind: &'static str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    errors: Vec<FileError>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let kind = self.kind();
        increment_request_errors(kind);

        // Internal details stay in the logs.
        let error = if kind == "internal" {
            #[cfg(feature = "tracing")]
            tracing::error!("Request failed: {self}");
            "An internal error occurred".to_string()
        } else {
            self.to_string()
        };

        let errors = match &self {
            Self::BatchFailed(failed) => failed.iter().map(FileError::from).collect(),
            _ => Vec::new(),
        };

        (status, Json(ErrorBody { error, kind, errors })).into_response()
    }
}
