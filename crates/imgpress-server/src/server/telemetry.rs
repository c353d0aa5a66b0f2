//! # Telemetry Features
//!
//! Logging is always routed through `tracing_subscriber`; exporting spans and
//! metrics through OpenTelemetry is opt-in.
//!
//! ## Feature matrix
//!
//! - `tracing`: Compiles in log statements and OpenTelemetry span export.
//! - `metrics`: Enables OpenTelemetry instruments (counters, histograms).
//! - `stdout`: Periodically prints spans and metrics to stdout.
//!
//! `stdout` requires at least one of `tracing` or `metrics`.
//!
//! ## Instruments
//!
//! | name | kind | recorded by |
//! |---|---|---|
//! | `requests` | counter | every compression request |
//! | `request_errors` | counter (`kind` attribute) | failed requests and batch items |
//! | `workers_busy` | up/down counter | worker loop around each job |
//! | `job_duration` | histogram (ms) | worker loop |
//! | `item_latency` | histogram (ms) | each successful file, enqueue to reply |
//! | `request_duration` | histogram (ms) | HTTP handlers |
//! | `bytes_in` / `bytes_out` | counters | successful compressions |
//! | `compression_ratio` | histogram | successful compressions |
//! | `batch_items` | histogram | batch requests |
//!
//! Every recording function compiles to a no-op without `metrics`.
//!
//! ```bash
//! cargo run -p imgpress-server --features tracing,metrics,stdout
//! ```

#[cfg(all(feature = "stdout", not(any(feature = "tracing", feature = "metrics"))))]
compile_error!(
    "The 'stdout' feature requires at least one of 'tracing' or 'metrics' to be enabled."
);

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[cfg(feature = "metrics")]
use opentelemetry::metrics::{Counter, Histogram, Meter, UpDownCounter};
#[cfg(feature = "metrics")]
use opentelemetry_sdk::metrics as sdkmetrics;
#[cfg(feature = "metrics")]
use std::sync::OnceLock;

#[cfg(any(feature = "metrics", feature = "tracing"))]
use opentelemetry::{InstrumentationScope, KeyValue};
#[cfg(any(feature = "metrics", feature = "tracing"))]
use opentelemetry_sdk::Resource;
#[cfg(any(feature = "metrics", feature = "tracing"))]
use opentelemetry_semantic_conventions as semvcns;

#[cfg(feature = "tracing")]
use opentelemetry::trace::TracerProvider;
#[cfg(feature = "tracing")]
use opentelemetry_sdk::propagation::TraceContextPropagator;
#[cfg(feature = "tracing")]
use opentelemetry_sdk::trace as sdktrace;

#[cfg(any(feature = "metrics", feature = "tracing"))]
const SERVICE_NAME: &str = "imgpress";

pub struct TelemetryProviders {
    #[cfg(feature = "tracing")]
    pub tracer_provider: sdktrace::SdkTracerProvider,
    #[cfg(feature = "metrics")]
    pub meter_provider: sdkmetrics::SdkMeterProvider,
}

impl TelemetryProviders {
    /// Flushes and shuts down the exporters. Errors are printed rather than
    /// logged since the subscriber may already be gone.
    pub fn shutdown(&self) {
        #[cfg(feature = "tracing")]
        {
            if let Err(err) = self.tracer_provider.force_flush() {
                eprintln!("Error flushing traces: {err:#?}");
            }
            if let Err(err) = self.tracer_provider.shutdown() {
                eprintln!("Error shutting down tracer: {err:#?}");
            }
        }

        #[cfg(feature = "metrics")]
        {
            if let Err(err) = self.meter_provider.force_flush() {
                eprintln!("Error flushing metrics: {err:#?}");
            }
            if let Err(err) = self.meter_provider.shutdown() {
                eprintln!("Error shutting down meter: {err:#?}");
            }
        }
    }
}

pub fn init_telemetry() -> anyhow::Result<TelemetryProviders> {
    #[cfg(feature = "tracing")]
    opentelemetry::global::set_text_map_propagator(TraceContextPropagator::new());

    #[cfg(feature = "tracing")]
    let tracer_provider = init_tracer();

    #[cfg(feature = "metrics")]
    let meter_provider = init_metrics();

    #[cfg(any(feature = "metrics", feature = "tracing"))]
    let scope = InstrumentationScope::builder(SERVICE_NAME)
        .with_version(env!("CARGO_PKG_VERSION"))
        .with_schema_url(semvcns::SCHEMA_URL)
        .build();

    // Console logging is independent of the OpenTelemetry stdout exporter.
    let registry = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_thread_ids(true)
                .with_line_number(true)
                .with_target(false)
                .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
                .with_file(true)
                .pretty(),
        );

    #[cfg(feature = "tracing")]
    let registry = {
        opentelemetry::global::set_tracer_provider(tracer_provider.clone());
        registry.with(
            tracing_opentelemetry::layer()
                .with_tracer(tracer_provider.tracer_with_scope(scope.clone()))
                .with_error_records_to_exceptions(true),
        )
    };

    #[cfg(feature = "metrics")]
    let registry = {
        opentelemetry::global::set_meter_provider(meter_provider.clone());
        let meter = opentelemetry::global::meter_with_scope(scope);
        init_metric_handles(meter);

        registry.with(tracing_opentelemetry::MetricsLayer::new(
            meter_provider.clone(),
        ))
    };

    registry.try_init()?;

    Ok(TelemetryProviders {
        #[cfg(feature = "tracing")]
        tracer_provider,
        #[cfg(feature = "metrics")]
        meter_provider,
    })
}

#[cfg(any(feature = "metrics", feature = "tracing"))]
fn resource() -> Resource {
    Resource::builder()
        .with_service_name(SERVICE_NAME)
        .with_schema_url(
            [KeyValue::new(
                semvcns::resource::SERVICE_VERSION,
                env!("CARGO_PKG_VERSION"),
            )],
            semvcns::SCHEMA_URL,
        )
        .build()
}

#[cfg(feature = "metrics")]
fn init_metrics() -> sdkmetrics::SdkMeterProvider {
    let builder = sdkmetrics::SdkMeterProvider::builder().with_resource(resource());

    #[cfg(feature = "stdout")]
    let builder = {
        use opentelemetry_stdout::MetricExporter;
        let exporter = MetricExporter::default();
        let reader = opentelemetry_sdk::metrics::PeriodicReader::builder(exporter)
            .with_interval(std::time::Duration::from_secs(5))
            .build();

        builder.with_reader(reader)
    };

    builder.build()
}

#[cfg(feature = "tracing")]
fn init_tracer() -> sdktrace::SdkTracerProvider {
    let builder = sdktrace::SdkTracerProvider::builder().with_resource(resource());

    #[cfg(feature = "stdout")]
    let builder = {
        use opentelemetry_stdout::SpanExporter;
        let exporter = SpanExporter::default();
        let batch = sdktrace::BatchSpanProcessor::builder(exporter)
            .with_batch_config(
                sdktrace::BatchConfigBuilder::default()
                    .with_scheduled_delay(std::time::Duration::from_secs(5))
                    .with_max_queue_size(2048)
                    .build(),
            )
            .build();
        builder.with_span_processor(batch)
    };

    builder.build()
}

#[cfg(feature = "metrics")]
static REQUESTS: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static REQUEST_ERRORS: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static WORKERS_BUSY: OnceLock<UpDownCounter<i64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static JOB_DURATION_MS: OnceLock<Histogram<f64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static ITEM_LATENCY_MS: OnceLock<Histogram<f64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static REQUEST_DURATION_MS: OnceLock<Histogram<f64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static BYTES_IN: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static BYTES_OUT: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static COMPRESSION_RATIO: OnceLock<Histogram<f64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static BATCH_ITEMS: OnceLock<Histogram<f64>> = OnceLock::new();

#[cfg(feature = "metrics")]
fn init_metric_handles(meter: Meter) {
    let _ = REQUESTS.set(
        meter
            .u64_counter("requests")
            .with_description("Total compression requests")
            .build(),
    );

    let _ = REQUEST_ERRORS.set(
        meter
            .u64_counter("request_errors")
            .with_description("Failed requests and batch items")
            .build(),
    );

    let _ = WORKERS_BUSY.set(
        meter
            .i64_up_down_counter("workers_busy")
            .with_description("Workers currently executing a job")
            .build(),
    );

    let _ = JOB_DURATION_MS.set(
        meter
            .f64_histogram("job_duration")
            .with_unit("ms")
            .with_description("Time a worker spends on one job")
            .build(),
    );

    let _ = ITEM_LATENCY_MS.set(
        meter
            .f64_histogram("item_latency")
            .with_unit("ms")
            .with_description("Enqueue-to-reply latency of one successful file")
            .build(),
    );

    let _ = REQUEST_DURATION_MS.set(
        meter
            .f64_histogram("request_duration")
            .with_unit("ms")
            .with_description("End-to-end request latency")
            .build(),
    );

    let _ = BYTES_IN.set(
        meter
            .u64_counter("bytes_in")
            .with_unit("By")
            .with_description("Input bytes of successful compressions")
            .build(),
    );

    let _ = BYTES_OUT.set(
        meter
            .u64_counter("bytes_out")
            .with_unit("By")
            .with_description("Output bytes of successful compressions")
            .build(),
    );

    let _ = COMPRESSION_RATIO.set(
        meter
            .f64_histogram("compression_ratio")
            .with_description("Compressed size over original size")
            .build(),
    );

    let _ = BATCH_ITEMS.set(
        meter
            .f64_histogram("batch_items")
            .with_description("Files per batch request")
            .build(),
    );
}

#[cfg(feature = "metrics")]
pub fn increment_requests() {
    if let Some(counter) = REQUESTS.get() {
        counter.add(1, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_requests() {}

#[cfg(feature = "metrics")]
pub fn increment_request_errors(kind: &'static str) {
    if let Some(counter) = REQUEST_ERRORS.get() {
        counter.add(1, &[KeyValue::new("kind", kind)]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_request_errors(_kind: &'static str) {}

#[cfg(feature = "metrics")]
pub fn increment_workers_busy() {
    if let Some(counter) = WORKERS_BUSY.get() {
        counter.add(1, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_workers_busy() {}

#[cfg(feature = "metrics")]
pub fn decrement_workers_busy() {
    if let Some(counter) = WORKERS_BUSY.get() {
        counter.add(-1, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn decrement_workers_busy() {}

#[cfg(feature = "metrics")]
pub fn record_job_duration(duration_ms: f64) {
    if let Some(histogram) = JOB_DURATION_MS.get() {
        histogram.record(duration_ms, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn record_job_duration(_duration_ms: f64) {}

#[cfg(feature = "metrics")]
pub fn record_item_latency(latency_ms: f64) {
    if let Some(histogram) = ITEM_LATENCY_MS.get() {
        histogram.record(latency_ms, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn record_item_latency(_latency_ms: f64) {}

#[cfg(feature = "metrics")]
pub fn record_request_duration(duration_ms: f64) {
    if let Some(histogram) = REQUEST_DURATION_MS.get() {
        histogram.record(duration_ms, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn record_request_duration(_duration_ms: f64) {}

/// Records byte counts and the ratio of one successful compression.
#[cfg(feature = "metrics")]
pub fn record_compression(bytes_in: u64, bytes_out: u64, ratio: f64) {
    if let Some(counter) = BYTES_IN.get() {
        counter.add(bytes_in, &[]);
    }
    if let Some(counter) = BYTES_OUT.get() {
        counter.add(bytes_out, &[]);
    }
    if let Some(histogram) = COMPRESSION_RATIO.get() {
        histogram.record(ratio, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn record_compression(_bytes_in: u64, _bytes_out: u64, _ratio: f64) {}

#[cfg(feature = "metrics")]
pub fn record_batch_items(count: f64) {
    if let Some(histogram) = BATCH_ITEMS.get() {
        histogram.record(count, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn record_batch_items(_count: f64) {}
