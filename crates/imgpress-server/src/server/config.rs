use anyhow::bail;
use clap::Parser;
use imgpress_core::{
    OutputFormat, Quality,
    compression::{DEFAULT_STRATEGY, ProcessorDefaults, StrategyRegistry},
};
use std::time::Duration;

const DEFAULT_SERVER_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_BATCH_TIMEOUT_MS: u64 = 120_000;
const DEFAULT_ITEM_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;
const DEFAULT_MAX_BATCH_FILES: usize = 100;

/// Runtime configuration for the `imgpress-server` binary.
///
/// All values are parsed from CLI arguments or environment variables (a
/// `.env` file is loaded first), with defaults suitable for a single-node
/// deployment.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "imgpress-server",
    version,
    about = "An HTTP service that compresses images on a bounded worker pool"
)]
pub struct CliArgs {
    /// Address to listen on.
    ///
    /// Environment variable: `SERVER_ADDR`
    #[arg(long, env = "SERVER_ADDR", default_value_t = String::from(DEFAULT_SERVER_ADDR))]
    pub server_addr: String,

    /// Number of pool workers. Each worker runs one compression at a time on
    /// the blocking thread pool. `0` uses the available parallelism.
    ///
    /// Environment variable: `NUM_WORKERS`
    #[arg(long, env = "NUM_WORKERS", default_value_t = 0)]
    pub num_workers: usize,

    /// Number of jobs that may wait for a worker before submitters are held
    /// back. `0` means twice the worker count.
    ///
    /// Environment variable: `QUEUE_CAPACITY`
    #[arg(long, env = "QUEUE_CAPACITY", default_value_t = 0)]
    pub queue_capacity: usize,

    /// Deadline for a single `/compress` request, in milliseconds.
    ///
    /// Environment variable: `REQUEST_TIMEOUT_MS`
    #[arg(long, env = "REQUEST_TIMEOUT_MS", default_value_t = DEFAULT_REQUEST_TIMEOUT_MS)]
    pub request_timeout_ms: u64,

    /// Overall deadline for a `/compress/batch` request, in milliseconds.
    ///
    /// Environment variable: `BATCH_TIMEOUT_MS`
    #[arg(long, env = "BATCH_TIMEOUT_MS", default_value_t = DEFAULT_BATCH_TIMEOUT_MS)]
    pub batch_timeout_ms: u64,

    /// Deadline for each file of a batch, in milliseconds. Never extends past
    /// the batch deadline.
    ///
    /// Environment variable: `ITEM_TIMEOUT_MS`
    #[arg(long, env = "ITEM_TIMEOUT_MS", default_value_t = DEFAULT_ITEM_TIMEOUT_MS)]
    pub item_timeout_ms: u64,

    /// Quality used when a request omits it or sends a non-numeric value.
    ///
    /// Environment variable: `DEFAULT_QUALITY`
    #[arg(long, env = "DEFAULT_QUALITY", default_value_t = 80)]
    pub default_quality: u8,

    /// Output format used when a request omits it or leaves it blank.
    ///
    /// Environment variable: `DEFAULT_FORMAT`
    #[arg(long, env = "DEFAULT_FORMAT", default_value_t = String::from("webp"))]
    pub default_format: String,

    /// Strategy unknown strategy names fall back to.
    ///
    /// Environment variable: `DEFAULT_STRATEGY`
    #[arg(long, env = "DEFAULT_STRATEGY", default_value_t = String::from(DEFAULT_STRATEGY))]
    pub default_strategy: String,

    /// Maximum request body size in bytes.
    ///
    /// Environment variable: `MAX_UPLOAD_BYTES`
    #[arg(long, env = "MAX_UPLOAD_BYTES", default_value_t = DEFAULT_MAX_UPLOAD_BYTES)]
    pub max_upload_bytes: usize,

    /// Maximum number of files in one batch request.
    ///
    /// Environment variable: `MAX_BATCH_FILES`
    #[arg(long, env = "MAX_BATCH_FILES", default_value_t = DEFAULT_MAX_BATCH_FILES)]
    pub max_batch_files: usize,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub server_addr: String,
    pub num_workers: usize,
    pub queue_capacity: usize,
    pub request_timeout: Duration,
    pub batch_timeout: Duration,
    pub item_timeout: Duration,
    pub default_quality: Quality,
    pub default_format: OutputFormat,
    pub default_strategy: String,
    pub max_upload_bytes: usize,
    pub max_batch_files: usize,
}

impl ServerConfig {
    pub fn processor_defaults(&self) -> ProcessorDefaults {
        ProcessorDefaults {
            format: self.default_format,
            quality: self.default_quality,
            strategy: self.default_strategy.clone(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        let num_workers = available_workers();
        Self {
            server_addr: DEFAULT_SERVER_ADDR.to_string(),
            num_workers,
            queue_capacity: num_workers * 2,
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            batch_timeout: Duration::from_millis(DEFAULT_BATCH_TIMEOUT_MS),
            item_timeout: Duration::from_millis(DEFAULT_ITEM_TIMEOUT_MS),
            default_quality: Quality::default(),
            default_format: OutputFormat::WebP,
            default_strategy: DEFAULT_STRATEGY.to_string(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            max_batch_files: DEFAULT_MAX_BATCH_FILES,
        }
    }
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        let num_workers = if args.num_workers == 0 {
            available_workers()
        } else {
            args.num_workers
        };
        let queue_capacity = if args.queue_capacity == 0 {
            num_workers
                .checked_mul(2)
                .ok_or_else(|| anyhow::anyhow!("Overflow in queue capacity computation"))?
        } else {
            args.queue_capacity
        };

        for (name, value) in [
            ("REQUEST_TIMEOUT_MS", args.request_timeout_ms),
            ("BATCH_TIMEOUT_MS", args.batch_timeout_ms),
            ("ITEM_TIMEOUT_MS", args.item_timeout_ms),
        ] {
            if value == 0 {
                bail!("{name} must be greater than 0");
            }
        }

        let Some(default_quality) = Quality::new(args.default_quality) else {
            bail!(
                "DEFAULT_QUALITY ({}) must be between {} and {}",
                args.default_quality,
                Quality::MIN,
                Quality::MAX
            );
        };

        let default_format: OutputFormat = match args.default_format.parse() {
            Ok(format) => format,
            Err(e) => bail!("DEFAULT_FORMAT: {e}"),
        };

        let registry = StrategyRegistry::builtin();
        if !registry.contains(&args.default_strategy) {
            bail!(
                "DEFAULT_STRATEGY ({}) is not registered; available: {}",
                args.default_strategy,
                registry.names().join(", ")
            );
        }

        if args.max_upload_bytes == 0 {
            bail!("MAX_UPLOAD_BYTES must be greater than 0");
        }
        if args.max_batch_files == 0 {
            bail!("MAX_BATCH_FILES must be greater than 0");
        }

        Ok(Self {
            server_addr: args.server_addr,
            num_workers,
            queue_capacity,
            request_timeout: Duration::from_millis(args.request_timeout_ms),
            batch_timeout: Duration::from_millis(args.batch_timeout_ms),
            item_timeout: Duration::from_millis(args.item_timeout_ms),
            default_quality,
            default_format,
            default_strategy: args.default_strategy,
            max_upload_bytes: args.max_upload_bytes,
            max_batch_files: args.max_batch_files,
        })
    }
}

fn available_workers() -> usize {
    std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> anyhow::Result<ServerConfig> {
        let argv = std::iter::once("imgpress-server").chain(args.iter().copied());
        ServerConfig::try_from(CliArgs::try_parse_from(argv)?)
    }

    #[test]
    fn explicit_values_are_kept() {
        let config = parse(&[
            "--num-workers",
            "3",
            "--queue-capacity",
            "5",
            "--default-quality",
            "55",
            "--default-format",
            "JPG",
            "--default-strategy",
            "fast",
            "--item-timeout-ms",
            "250",
        ])
        .unwrap();
        assert_eq!(config.num_workers, 3);
        assert_eq!(config.queue_capacity, 5);
        assert_eq!(config.default_quality.get(), 55);
        assert_eq!(config.default_format, OutputFormat::Jpeg);
        assert_eq!(config.default_strategy, "fast");
        assert_eq!(config.item_timeout, Duration::from_millis(250));
        assert_eq!(config.processor_defaults().strategy, "fast");
    }

    #[test]
    fn zero_queue_capacity_is_twice_the_workers() {
        let config = parse(&["--num-workers", "4", "--queue-capacity", "0"]).unwrap();
        assert_eq!(config.queue_capacity, 8);
    }

    #[test]
    fn zero_workers_uses_available_parallelism() {
        let config = parse(&["--num-workers", "0"]).unwrap();
        assert!(config.num_workers >= 1);
    }

    #[test]
    fn item_timeout_may_exceed_batch_timeout() {
        let config = parse(&["--batch-timeout-ms", "100", "--item-timeout-ms", "500"]).unwrap();
        assert!(config.item_timeout > config.batch_timeout);
    }

    #[test]
    fn rejects_invalid_values() {
        for args in [
            &["--request-timeout-ms", "0"][..],
            &["--batch-timeout-ms", "0"],
            &["--item-timeout-ms", "0"],
            &["--default-quality", "0"],
            &["--default-quality", "101"],
            &["--default-format", "tiff"],
            &["--default-strategy", "quantum"],
            &["--max-batch-files", "0"],
            &["--max-upload-bytes", "0"],
        ] {
            assert!(parse(args).is_err(), "accepted {args:?}");
        }
    }
}
