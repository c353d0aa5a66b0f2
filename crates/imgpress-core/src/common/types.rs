//! # Request Parameters and Results
//!
//! - [`OutputFormat`] - the closed set of encodable formats.
//! - [`Quality`] - a quality value guaranteed to lie in `1..=100`.
//! - [`CompressionResult`] - what a successful compression job produces.
//!
//! Transport adapters are lenient about absence: a missing or blank value
//! takes a configured default. An unparseable quality also takes the
//! default, but a format that is present and unknown fails with
//! [`Error::UnsupportedFormat`](crate::Error::UnsupportedFormat).

use crate::{Error, JobOutput};
use bytes::Bytes;
use core::{fmt, str::FromStr, time::Duration};

/// Output encodings supported by the compression pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    WebP,
    Jpeg,
    Png,
}

impl OutputFormat {
    /// Canonical lowercase name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::WebP => "webp",
            Self::Jpeg => "jpeg",
            Self::Png => "png",
        }
    }

    /// File extension used when naming outputs.
    pub const fn extension(self) -> &'static str {
        match self {
            Self::WebP => "webp",
            Self::Jpeg => "jpg",
            Self::Png => "png",
        }
    }

    pub const fn mime_type(self) -> &'static str {
        match self {
            Self::WebP => "image/webp",
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
        }
    }

    /// Parses `raw`, falling back to `default` only when it is missing or
    /// blank.
    ///
    /// # Errors
    ///
    /// [`Error::UnsupportedFormat`] when `raw` names anything else.
    pub fn parse_or(raw: Option<&str>, default: Self) -> Result<Self, Error> {
        match raw.map(str::trim) {
            None | Some("") => Ok(default),
            Some(s) => s.parse(),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "webp" => Ok(Self::WebP),
            "jpeg" | "jpg" => Ok(Self::Jpeg),
            "png" => Ok(Self::Png),
            _ => Err(Error::UnsupportedFormat {
                format: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compression quality in the inclusive range `1..=100`.
///
/// `100` means "keep the original dimensions"; lower values shrink the image
/// proportionally and tune format-specific encoder settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Quality(u8);

impl Quality {
    pub const MIN: Self = Self(1);
    pub const MAX: Self = Self(100);

    /// Returns `None` when `value` is outside `1..=100`.
    pub const fn new(value: u8) -> Option<Self> {
        if value >= Self::MIN.0 && value <= Self::MAX.0 {
            Some(Self(value))
        } else {
            None
        }
    }

    /// Clamps any integer into `1..=100`.
    pub fn clamped(value: i64) -> Self {
        Self(value.clamp(i64::from(Self::MIN.0), i64::from(Self::MAX.0)) as u8)
    }

    pub const fn get(self) -> u8 {
        self.0
    }

    pub const fn is_max(self) -> bool {
        self.0 == Self::MAX.0
    }

    /// Scale factor applied to image dimensions (`quality / 100`).
    pub fn scale(self) -> f64 {
        f64::from(self.0) / 100.0
    }

    /// Parses `raw` as an integer and clamps it into range. Missing or
    /// non-numeric input yields `default`.
    pub fn parse_or(raw: Option<&str>, default: Self) -> Self {
        raw.and_then(|s| s.trim().parse::<i64>().ok())
            .map_or(default, Self::clamped)
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(80)
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Ratio of compressed to original size. Zero when the original is empty.
pub fn compression_ratio(original_size: usize, compressed_size: usize) -> f64 {
    if original_size == 0 {
        return 0.0;
    }
    compressed_size as f64 / original_size as f64
}

/// Output of a successful compression job.
#[derive(Clone, Debug)]
pub struct CompressionResult {
    pub job_id: String,
    /// Name of the uploaded file the job was created for.
    pub filename: String,
    pub data: Bytes,
    pub format: OutputFormat,
    pub original_size: usize,
    pub compressed_size: usize,
    /// `compressed_size / original_size`, see [`compression_ratio`].
    pub compression_ratio: f64,
    /// Strategy that actually ran, which may be the fallback default.
    pub strategy: String,
    /// Wall-clock time spent inside the job (read, decode, transform,
    /// encode).
    pub processing_time: Duration,
    pub width: u32,
    pub height: u32,
}

impl JobOutput for CompressionResult {
    fn job_id(&self) -> &str {
        &self.job_id
    }
}
