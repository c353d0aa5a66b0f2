use super::{StrategyRegistry, codec, strategy::DEFAULT_STRATEGY};
use crate::{
    CompressionResult, Job, OutputFormat, Quality, Result, compression_ratio, new_job_id,
};
use bytes::{Buf, Bytes};
use image::GenericImageView;
use std::{io::Read, sync::Arc, time::Instant};

/// Parameters a single compression job runs with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressionOptions {
    pub format: OutputFormat,
    pub quality: Quality,
    /// Requested strategy name. Unknown names fall back to the registry
    /// default when the job runs.
    pub strategy: String,
}

impl CompressionOptions {
    /// Strict constructor: an unsupported `format` is an error regardless of
    /// the other parameters.
    pub fn parse(format: &str, quality: Quality, strategy: impl Into<String>) -> Result<Self> {
        Ok(Self {
            format: format.parse()?,
            quality,
            strategy: strategy.into(),
        })
    }
}

/// A compression job: read → decode → strategy → encode.
///
/// The input is read once, inside [`Job::process`], so a failing reader
/// surfaces as an input error from the worker rather than from the caller.
pub struct CompressionJob {
    id: String,
    filename: String,
    input: Box<dyn Read + Send>,
    options: CompressionOptions,
    registry: Arc<StrategyRegistry>,
}

impl CompressionJob {
    pub fn new(
        filename: impl Into<String>,
        input: impl Read + Send + 'static,
        options: CompressionOptions,
        registry: Arc<StrategyRegistry>,
    ) -> Self {
        Self {
            id: new_job_id(),
            filename: filename.into(),
            input: Box::new(input),
            options,
            registry,
        }
    }

    pub fn from_bytes(
        filename: impl Into<String>,
        bytes: Bytes,
        options: CompressionOptions,
        registry: Arc<StrategyRegistry>,
    ) -> Self {
        Self::new(filename, bytes.reader(), options, registry)
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn options(&self) -> &CompressionOptions {
        &self.options
    }
}

impl core::fmt::Debug for CompressionJob {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CompressionJob")
            .field("id", &self.id)
            .field("filename", &self.filename)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Job for CompressionJob {
    type Output = CompressionResult;

    fn id(&self) -> &str {
        &self.id
    }

    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(skip_all, fields(job_id = %self.id, filename = %self.filename))
    )]
    fn process(mut self) -> Result<CompressionResult> {
        let start = Instant::now();

        let mut input = Vec::new();
        self.input.read_to_end(&mut input)?;
        let original_size = input.len();

        let decoded = codec::decode(&input)?;
        drop(input);

        let strategy = self.registry.resolve(&self.options.strategy);
        let transformed = strategy.compress(decoded, self.options.quality);
        let (width, height) = transformed.dimensions();

        let data = codec::encode(&transformed, self.options.format, self.options.quality)?;
        let compressed_size = data.len();

        #[cfg(feature = "tracing")]
        tracing::debug!(
            "Compressed {original_size} -> {compressed_size} bytes with {:?}",
            strategy.name()
        );

        Ok(CompressionResult {
            job_id: self.id,
            filename: self.filename,
            data: Bytes::from(data),
            format: self.options.format,
            original_size,
            compressed_size,
            compression_ratio: compression_ratio(original_size, compressed_size),
            strategy: strategy.name().to_string(),
            processing_time: start.elapsed(),
            width,
            height,
        })
    }
}

/// Fallback values applied to lenient transport parameters.
#[derive(Debug, Clone)]
pub struct ProcessorDefaults {
    pub format: OutputFormat,
    pub quality: Quality,
    pub strategy: String,
}

impl Default for ProcessorDefaults {
    fn default() -> Self {
        Self {
            format: OutputFormat::WebP,
            quality: Quality::default(),
            strategy: DEFAULT_STRATEGY.to_string(),
        }
    }
}

/// Builds [`CompressionJob`]s against an owned strategy registry.
///
/// The registry is injected at construction time; there is no process-wide
/// strategy table.
#[derive(Debug, Clone)]
pub struct Processor {
    registry: Arc<StrategyRegistry>,
    defaults: ProcessorDefaults,
}

impl Processor {
    /// Uses the built-in strategies with `defaults.strategy` as fallback
    /// when it names one of them.
    pub fn new(defaults: ProcessorDefaults) -> Self {
        let mut registry = StrategyRegistry::builtin();
        registry.set_default(&defaults.strategy);
        Self::with_registry(registry, defaults)
    }

    pub fn with_registry(registry: StrategyRegistry, defaults: ProcessorDefaults) -> Self {
        Self {
            registry: Arc::new(registry),
            defaults,
        }
    }

    pub fn registry(&self) -> &StrategyRegistry {
        &self.registry
    }

    pub fn defaults(&self) -> &ProcessorDefaults {
        &self.defaults
    }

    /// Resolves transport parameters into options. Missing values and
    /// unparseable qualities take the configured defaults.
    ///
    /// # Errors
    ///
    /// [`Error::UnsupportedFormat`](crate::Error::UnsupportedFormat) when
    /// `format` is present but not one of the supported encodings.
    pub fn options(
        &self,
        format: Option<&str>,
        quality: Option<&str>,
        strategy: Option<&str>,
    ) -> Result<CompressionOptions> {
        Ok(CompressionOptions {
            format: OutputFormat::parse_or(format, self.defaults.format)?,
            quality: Quality::parse_or(quality, self.defaults.quality),
            strategy: strategy
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .unwrap_or(self.defaults.strategy.as_str())
                .to_string(),
        })
    }

    pub fn job_with_options(
        &self,
        filename: impl Into<String>,
        bytes: Bytes,
        options: CompressionOptions,
    ) -> CompressionJob {
        CompressionJob::from_bytes(filename, bytes, options, Arc::clone(&self.registry))
    }

    /// Creates a job from raw transport parameters.
    ///
    /// # Errors
    ///
    /// See [`options`](Self::options).
    pub fn job(
        &self,
        filename: impl Into<String>,
        bytes: Bytes,
        format: Option<&str>,
        quality: Option<&str>,
        strategy: Option<&str>,
    ) -> Result<CompressionJob> {
        let options = self.options(format, quality, strategy)?;
        Ok(self.job_with_options(filename, bytes, options))
    }
}

impl Default for Processor {
    fn default() -> Self {
        Self::new(ProcessorDefaults::default())
    }
}
