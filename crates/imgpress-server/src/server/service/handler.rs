//! HTTP service for single and batch image compression.
//!
//! This module defines [`CompressionService`], which owns the worker pool and
//! the batch orchestrator and exposes them through an axum [`Router`].
//!
//! ## Responsibilities
//!
//! - Spawn the worker pool and build jobs with the configured defaults.
//! - Parse multipart uploads and enforce upload limits.
//! - Run single requests through [`submit_and_wait`] and batches through the
//!   [`BatchOrchestrator`], each under its configured deadline.
//! - Translate outcomes into responses, headers and status codes.
//! - Report health and throughput, and drain the pool on shutdown.

use super::{
    archive,
    error::{ApiError, ApiResult},
    multipart::{CompressParams, UploadForm},
    stats::{ServiceStats, StatsSnapshot},
};
use crate::server::{
    config::ServerConfig,
    dispatch::{BatchItem, BatchOrchestrator, RequestContext, Submission, submit_and_wait},
    pool::WorkerPool,
    telemetry::{
        increment_requests, record_compression, record_item_latency, record_request_duration,
    },
};
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Query, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use imgpress_core::{
    CompressionResult, Error,
    compression::{CompressionJob, Processor},
};
use serde::Serialize;
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub const X_ORIGINAL_SIZE: HeaderName = HeaderName::from_static("x-original-size");
pub const X_COMPRESSED_SIZE: HeaderName = HeaderName::from_static("x-compressed-size");
pub const X_COMPRESSION_RATIO: HeaderName = HeaderName::from_static("x-compression-ratio");
pub const X_STRATEGY: HeaderName = HeaderName::from_static("x-strategy");
pub const X_PROCESSING_TIME_MS: HeaderName = HeaderName::from_static("x-processing-time-ms");
pub const X_LATENCY_MS: HeaderName = HeaderName::from_static("x-latency-ms");
pub const X_JOB_ID: HeaderName = HeaderName::from_static("x-job-id");
pub const X_PROCESSED_FILES: HeaderName = HeaderName::from_static("x-processed-files");
pub const X_FAILED_FILES: HeaderName = HeaderName::from_static("x-failed-files");

/// Image compression service backed by a bounded worker pool.
///
/// Cloning is cheap; every clone shares the same pool, so the service can be
/// used directly as axum router state.
#[derive(Clone)]
pub struct CompressionService {
    config: Arc<ServerConfig>,
    processor: Processor,
    pool: Arc<WorkerPool<CompressionJob>>,
    orchestrator: Arc<BatchOrchestrator<CompressionJob>>,
    stats: Arc<ServiceStats>,
}

impl CompressionService {
    /// Creates the service with the built-in strategies and spawns
    /// `config.num_workers` workers.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: ServerConfig) -> Self {
        let processor = Processor::new(config.processor_defaults());
        Self::with_processor(config, processor)
    }

    /// Like [`new`](Self::new) with a caller-supplied processor, e.g. one
    /// built over a custom strategy registry.
    pub fn with_processor(config: ServerConfig, processor: Processor) -> Self {
        let pool = Arc::new(WorkerPool::new(config.num_workers, config.queue_capacity));
        let orchestrator = BatchOrchestrator::new(Arc::clone(&pool), config.item_timeout);

        Self {
            config: Arc::new(config),
            processor,
            pool,
            orchestrator: Arc::new(orchestrator),
            stats: Arc::new(ServiceStats::new()),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/compress", post(compress))
            .route("/compress/batch", post(compress_batch))
            .route("/health", get(health))
            .route("/stats", get(stats))
            .layer(DefaultBodyLimit::max(self.config.max_upload_bytes))
            .layer(TraceLayer::new_for_http())
            .layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any)
                    .expose_headers(Any),
            )
            .with_state(self.clone())
    }

    /// Stops accepting work and waits for every queued job to finish.
    pub async fn shutdown(&self) {
        self.pool.shutdown().await;
    }

    pub fn is_accepting(&self) -> bool {
        self.pool.is_accepting()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot(
            self.pool.busy_workers(),
            self.pool.worker_count(),
            self.pool.queue_capacity(),
        )
    }

    /// Compresses one upload under the request deadline.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    async fn compress_one(
        &self,
        query: CompressParams,
        multipart: Multipart,
    ) -> ApiResult<Response> {
        let mut form = UploadForm::read(multipart, 1).await?;
        let params = std::mem::take(&mut form.params).or(query);
        let Some(upload) = form.take_first() else {
            return Err(Error::InvalidRequest {
                reason: "Missing file part".to_string(),
            }
            .into());
        };

        let outcome = match self.processor.job(
            upload.filename,
            upload.data,
            params.format(),
            params.quality(),
            params.strategy(),
        ) {
            Ok(job) => {
                let ctx = RequestContext::with_timeout(self.config.request_timeout);
                submit_and_wait(&self.pool, job, &ctx).await
            }
            Err(e) => Err(e),
        };

        match outcome {
            Ok(Submission { output, latency }) => {
                self.record_success(&output, latency);
                single_response(output, latency)
            }
            Err(e) => {
                self.stats.record_failure();
                Err(e.into())
            }
        }
    }

    /// Compresses every upload of a batch and packs the successes.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    async fn compress_many(
        &self,
        query: CompressParams,
        multipart: Multipart,
    ) -> ApiResult<Response> {
        let mut form = UploadForm::read(multipart, self.config.max_batch_files).await?;
        if form.files.is_empty() {
            return Err(Error::InvalidRequest {
                reason: "No files provided".to_string(),
            }
            .into());
        }

        let params = std::mem::take(&mut form.params).or(query);
        let options = self
            .processor
            .options(params.format(), params.quality(), params.strategy())
            .inspect_err(|_| self.stats.record_failure())?;
        let items = form
            .files
            .into_iter()
            .map(|upload| {
                let job = self.processor.job_with_options(
                    upload.filename.clone(),
                    upload.data,
                    options.clone(),
                );
                BatchItem::new(upload.filename, job)
            })
            .collect();

        let ctx = RequestContext::with_timeout(self.config.batch_timeout);
        let response = self.orchestrator.run(items, &ctx).await;

        for success in &response.results {
            self.record_success(&success.output, success.latency);
        }
        for _failed in &response.errors {
            self.stats.record_failure();
            #[cfg(feature = "tracing")]
            tracing::warn!("Error processing {}: {}", _failed.filename, _failed.error);
        }

        if response.results.is_empty() {
            return Err(ApiError::BatchFailed(response.errors));
        }

        let zip = archive::build(&response.results, &response.errors)
            .map_err(|e| ApiError::Internal(format!("Error creating zip file: {e}")))?;

        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/zip"));
        headers.insert(
            header::CONTENT_DISPOSITION,
            HeaderValue::from_static("attachment; filename=\"compressed_images.zip\""),
        );
        headers.insert(X_PROCESSED_FILES, HeaderValue::from(response.results.len()));
        headers.insert(X_FAILED_FILES, HeaderValue::from(response.errors.len()));

        Ok((headers, zip).into_response())
    }

    fn record_success(&self, result: &CompressionResult, latency: Duration) {
        self.stats
            .record_success(result.original_size, result.compressed_size, latency);
        record_item_latency(latency.as_secs_f64() * 1000.0);
        record_compression(
            result.original_size as u64,
            result.compressed_size as u64,
            result.compression_ratio,
        );
    }

    fn finish_request(&self, start: Instant) {
        let elapsed = start.elapsed();
        self.stats.record_request(elapsed);
        record_request_duration(elapsed.as_secs_f64() * 1000.0);
    }
}

fn single_response(result: CompressionResult, latency: Duration) -> ApiResult<Response> {
    let download = archive::download_name(&result.filename, result.format.extension());
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(result.format.mime_type()),
    );
    headers.insert(
        header::CONTENT_DISPOSITION,
        text_header(&format!("attachment; filename=\"{download}\""))?,
    );
    headers.insert(X_ORIGINAL_SIZE, HeaderValue::from(result.original_size));
    headers.insert(X_COMPRESSED_SIZE, HeaderValue::from(result.compressed_size));
    headers.insert(
        X_COMPRESSION_RATIO,
        text_header(&format!("{:.4}", result.compression_ratio))?,
    );
    headers.insert(X_STRATEGY, text_header(&result.strategy)?);
    headers.insert(
        X_PROCESSING_TIME_MS,
        text_header(&result.processing_time.as_millis().to_string())?,
    );
    headers.insert(X_LATENCY_MS, text_header(&latency.as_millis().to_string())?);
    headers.insert(X_JOB_ID, text_header(&result.job_id)?);

    Ok((headers, result.data).into_response())
}

fn text_header(value: &str) -> ApiResult<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| ApiError::Internal(format!("invalid header {value:?}: {e}")))
}

/// `POST /compress`
///
/// Multipart upload of one image plus optional `quality`, `format` and
/// `strategy` parts (also accepted as query parameters). Responds with the
/// compressed bytes.
pub async fn compress(
    State(service): State<CompressionService>,
    Query(query): Query<CompressParams>,
    multipart: Multipart,
) -> ApiResult<Response> {
    let start = Instant::now();
    increment_requests();
    let outcome = service.compress_one(query, multipart).await;
    service.finish_request(start);
    outcome
}

/// `POST /compress/batch`
///
/// Multipart upload of several images sharing one set of parameters.
/// Responds with a zip archive of every file that compressed, or 422 with
/// the per-file errors when none did.
pub async fn compress_batch(
    State(service): State<CompressionService>,
    Query(query): Query<CompressParams>,
    multipart: Multipart,
) -> ApiResult<Response> {
    let start = Instant::now();
    increment_requests();
    let outcome = service.compress_many(query, multipart).await;
    service.finish_request(start);
    outcome
}

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub version: &'static str,
}

/// `GET /health`
pub async fn health(State(service): State<CompressionService>) -> impl IntoResponse {
    let (code, status) = if service.is_accepting() {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "shutting_down")
    };
    (
        code,
        Json(HealthStatus {
            status,
            version: env!("CARGO_PKG_VERSION"),
        }),
    )
}

/// `GET /stats`
pub async fn stats(State(service): State<CompressionService>) -> Json<StatsSnapshot> {
    Json(service.stats())
}
