use crate::Quality;
use image::{DynamicImage, GenericImageView, imageops::FilterType};
use std::{collections::HashMap, sync::Arc};

/// Smallest width or height a strategy will produce.
pub const MIN_DIMENSION: u32 = 10;

/// Name of the strategy used when a request does not name one, or names one
/// that is not registered.
pub const DEFAULT_STRATEGY: &str = "scale";

/// A pluggable image transformation run between decode and encode.
pub trait CompressionStrategy: Send + Sync {
    fn name(&self) -> &str;

    fn compress(&self, image: DynamicImage, quality: Quality) -> DynamicImage;
}

/// Computes the target dimensions for a proportional resize.
///
/// Quality `100` keeps the original size. Anything lower scales both sides by
/// `quality / 100`, truncating, and never goes below [`MIN_DIMENSION`].
pub fn scaled_dimensions(width: u32, height: u32, quality: Quality) -> (u32, u32) {
    if quality.is_max() {
        return (width, height);
    }
    let scale = quality.scale();
    let scale_side = |side: u32| ((f64::from(side) * scale) as u32).max(MIN_DIMENSION);
    (scale_side(width), scale_side(height))
}

/// Shrinks both dimensions by `quality / 100` and resamples.
#[derive(Debug, Clone)]
pub struct ProportionalScale {
    name: String,
    filter: FilterType,
}

impl ProportionalScale {
    /// The default strategy: Lanczos resampling registered as `scale`.
    pub fn new() -> Self {
        Self::with_filter(DEFAULT_STRATEGY, FilterType::Lanczos3)
    }

    pub fn with_filter(name: impl Into<String>, filter: FilterType) -> Self {
        Self {
            name: name.into(),
            filter,
        }
    }
}

impl Default for ProportionalScale {
    fn default() -> Self {
        Self::new()
    }
}

impl CompressionStrategy for ProportionalScale {
    fn name(&self) -> &str {
        &self.name
    }

    fn compress(&self, image: DynamicImage, quality: Quality) -> DynamicImage {
        let (width, height) = image.dimensions();
        let (target_width, target_height) = scaled_dimensions(width, height, quality);
        if (target_width, target_height) == (width, height) {
            return image;
        }
        image.resize_exact(target_width, target_height, self.filter)
    }
}

/// Name → strategy lookup owned by a processor instance.
///
/// Lookups never fail: an unknown name resolves to the default strategy.
#[derive(Clone)]
pub struct StrategyRegistry {
    strategies: HashMap<String, Arc<dyn CompressionStrategy>>,
    default: Arc<dyn CompressionStrategy>,
}

impl StrategyRegistry {
    /// Creates a registry containing only `default`.
    pub fn new(default: Arc<dyn CompressionStrategy>) -> Self {
        let mut strategies = HashMap::new();
        strategies.insert(default.name().to_string(), Arc::clone(&default));
        Self {
            strategies,
            default,
        }
    }

    /// The built-in strategies: `scale` (Lanczos3, default) and `fast`
    /// (bilinear).
    pub fn builtin() -> Self {
        Self::new(Arc::new(ProportionalScale::new())).with_strategy(Arc::new(
            ProportionalScale::with_filter("fast", FilterType::Triangle),
        ))
    }

    #[must_use]
    pub fn with_strategy(mut self, strategy: Arc<dyn CompressionStrategy>) -> Self {
        self.register(strategy);
        self
    }

    /// Adds or replaces a strategy under its own name.
    pub fn register(&mut self, strategy: Arc<dyn CompressionStrategy>) {
        self.strategies.insert(strategy.name().to_string(), strategy);
    }

    /// Makes an already registered strategy the fallback.
    ///
    /// Returns `false` and leaves the default untouched when `name` is not
    /// registered.
    pub fn set_default(&mut self, name: &str) -> bool {
        match self.strategies.get(name) {
            Some(strategy) => {
                self.default = Arc::clone(strategy);
                true
            }
            None => false,
        }
    }

    /// Looks up `name`, silently falling back to the default strategy.
    pub fn resolve(&self, name: &str) -> Arc<dyn CompressionStrategy> {
        match self.strategies.get(name) {
            Some(strategy) => Arc::clone(strategy),
            None => {
                #[cfg(feature = "tracing")]
                tracing::debug!(
                    "Unknown strategy {name:?}, using {:?}",
                    self.default.name()
                );
                Arc::clone(&self.default)
            }
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.strategies.contains_key(name)
    }

    pub fn default_name(&self) -> &str {
        self.default.name()
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.strategies.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl core::fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("StrategyRegistry")
            .field("strategies", &self.names())
            .field("default", &self.default_name())
            .finish()
    }
}
