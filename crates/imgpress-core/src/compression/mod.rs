//! The compression pipeline the worker pool executes.
//!
//! - [`strategy`] - the [`CompressionStrategy`] trait, the proportional
//!   scale implementation and the [`StrategyRegistry`].
//! - [`codec`] - decoding and format-specific encoding.
//! - [`processor`] - [`CompressionJob`] and the [`Processor`] that builds
//!   jobs from transport parameters.

pub mod codec;
pub mod processor;
pub mod strategy;

pub use processor::{CompressionJob, CompressionOptions, Processor, ProcessorDefaults};
pub use strategy::{
    CompressionStrategy, DEFAULT_STRATEGY, MIN_DIMENSION, ProportionalScale, StrategyRegistry,
    scaled_dimensions,
};
