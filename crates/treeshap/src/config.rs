//! Configuration with builder pattern.
//!
//! Two configuration types cover the two phases of the crate:
//!
//! - [`BuildConfig`]: limits applied when validating adapter arrays into trees
//! - [`ExplainOptions`]: what to compute for a batch of samples
//!
//! Both use the `bon` crate for builder generation and validate on `build()`.
//!
//! # Example
//!
//! ```
//! use treeshap::{ExplainOptions, OutputTransform};
//!
//! // All defaults: attributions only, additivity checked at 1e-6
//! let options = ExplainOptions::builder().build().unwrap();
//! assert!(options.check_additivity);
//!
//! // Interactions on the first 10 trees, reported in probability space
//! let options = ExplainOptions::builder()
//!     .interactions(true)
//!     .tree_limit(10)
//!     .output_transform(OutputTransform::Logistic)
//!     .n_threads(4)
//!     .build()
//!     .unwrap();
//! ```

use bon::Builder;

use crate::repr::OutputTransform;

/// Default maximum tree depth accepted at construction.
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Hard limit on tree depth. Traversal recursion is bounded by this.
pub const MAX_SUPPORTED_DEPTH: usize = 512;

/// Default relative tolerance for `cover(node) == cover(left) + cover(right)`.
pub const DEFAULT_COVER_TOLERANCE: f64 = 1e-4;

/// Default additivity tolerance, relative to `max(1, |prediction|)`.
pub const DEFAULT_ADDITIVITY_TOLERANCE: f64 = 1e-6;

// =============================================================================
// ConfigError
// =============================================================================

/// Errors that can occur during configuration validation.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Maximum depth above [`MAX_SUPPORTED_DEPTH`].
    InvalidMaxDepth(usize),
    /// A tolerance that is negative or not finite.
    InvalidTolerance { field: &'static str, value: f64 },
    /// `tree_limit` must be at least 1 when set.
    InvalidTreeLimit,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidMaxDepth(v) => {
                write!(f, "max_depth must be at most {}, got {}", MAX_SUPPORTED_DEPTH, v)
            }
            Self::InvalidTolerance { field, value } => {
                write!(f, "{} must be finite and non-negative, got {}", field, value)
            }
            Self::InvalidTreeLimit => write!(f, "tree_limit must be at least 1"),
        }
    }
}

impl std::error::Error for ConfigError {}

fn check_tolerance(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidTolerance { field, value })
    }
}

// =============================================================================
// BuildConfig
// =============================================================================

/// Limits applied while validating a tree.
///
/// # Example
///
/// ```
/// use treeshap::BuildConfig;
///
/// let config = BuildConfig::builder().max_depth(128).build().unwrap();
/// assert_eq!(config.max_depth, 128);
/// ```
#[derive(Debug, Clone, Builder)]
#[builder(
    derive(Clone, Debug),
    finish_fn(vis = "", name = __build_internal)
)]
pub struct BuildConfig {
    /// Deepest accepted tree (root at depth 0). Default: 64.
    #[builder(default = DEFAULT_MAX_DEPTH)]
    pub max_depth: usize,

    /// Relative tolerance for the cover consistency check. Default: 1e-4.
    ///
    /// A node passes when `|cover - (left + right)| <= tol * max(cover, left + right)`.
    #[builder(default = DEFAULT_COVER_TOLERANCE)]
    pub cover_tolerance: f64,
}

impl<S: build_config_builder::IsComplete> BuildConfigBuilder<S> {
    /// Build and validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `max_depth` exceeds [`MAX_SUPPORTED_DEPTH`]
    /// or `cover_tolerance` is negative or non-finite.
    pub fn build(self) -> Result<BuildConfig, ConfigError> {
        let config = self.__build_internal();
        config.validate()?;
        Ok(config)
    }
}

impl BuildConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_depth > MAX_SUPPORTED_DEPTH {
            return Err(ConfigError::InvalidMaxDepth(self.max_depth));
        }
        check_tolerance("cover_tolerance", self.cover_tolerance)
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            cover_tolerance: DEFAULT_COVER_TOLERANCE,
        }
    }
}

// =============================================================================
// ExplainOptions
// =============================================================================

/// What to compute for a batch of samples.
///
/// Attributions are always exact in margin space. `output_transform` only
/// affects the reported predictions and expected output.
#[derive(Debug, Clone, Builder)]
#[builder(
    derive(Clone, Debug),
    finish_fn(vis = "", name = __build_internal)
)]
pub struct ExplainOptions {
    /// Also compute the `(M+1) x (M+1)` interaction matrix per sample. Default: false.
    #[builder(default)]
    pub interactions: bool,

    /// Verify `sum(attributions) + base == prediction` per sample. Default: true.
    #[builder(default = true)]
    pub check_additivity: bool,

    /// Relative additivity tolerance. Default: 1e-6.
    #[builder(default = DEFAULT_ADDITIVITY_TOLERANCE)]
    pub additivity_tolerance: f64,

    /// Override the ensemble's output transform. `None` uses the ensemble's.
    pub output_transform: Option<OutputTransform>,

    /// Only use the first `n` trees. `None` uses all of them.
    pub tree_limit: Option<usize>,

    /// Number of worker threads. 0 = all cores, 1 = sequential. Default: 0.
    #[builder(default)]
    pub n_threads: usize,
}

impl<S: explain_options_builder::IsComplete> ExplainOptionsBuilder<S> {
    /// Build and validate the options.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for a negative or non-finite tolerance or a
    /// `tree_limit` of zero.
    pub fn build(self) -> Result<ExplainOptions, ConfigError> {
        let options = self.__build_internal();
        options.validate()?;
        Ok(options)
    }
}

impl ExplainOptions {
    fn validate(&self) -> Result<(), ConfigError> {
        check_tolerance("additivity_tolerance", self.additivity_tolerance)?;
        if self.tree_limit == Some(0) {
            return Err(ConfigError::InvalidTreeLimit);
        }
        Ok(())
    }
}

impl Default for ExplainOptions {
    fn default() -> Self {
        Self {
            interactions: false,
            check_additivity: true,
            additivity_tolerance: DEFAULT_ADDITIVITY_TOLERANCE,
            output_transform: None,
            tree_limit: None,
            n_threads: 0,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_build_config_is_valid() {
        let config = BuildConfig::builder().build().unwrap();
        assert_eq!(config.max_depth, DEFAULT_MAX_DEPTH);
        assert!((config.cover_tolerance - 1e-4).abs() < 1e-12);
    }

    #[test]
    fn test_max_depth_above_limit() {
        let result = BuildConfig::builder().max_depth(MAX_SUPPORTED_DEPTH + 1).build();
        assert!(matches!(result, Err(ConfigError::InvalidMaxDepth(_))));
    }

    #[test]
    fn test_negative_cover_tolerance() {
        let result = BuildConfig::builder().cover_tolerance(-1.0).build();
        assert!(matches!(
            result,
            Err(ConfigError::InvalidTolerance {
                field: "cover_tolerance",
                ..
            })
        ));
    }

    #[test]
    fn test_default_options_match_builder() {
        let built = ExplainOptions::builder().build().unwrap();
        let default = ExplainOptions::default();
        assert_eq!(built.interactions, default.interactions);
        assert_eq!(built.check_additivity, default.check_additivity);
        assert_eq!(built.additivity_tolerance, default.additivity_tolerance);
        assert_eq!(built.output_transform, default.output_transform);
        assert_eq!(built.tree_limit, default.tree_limit);
        assert_eq!(built.n_threads, default.n_threads);
    }

    #[test]
    fn test_zero_tree_limit_rejected() {
        let result = ExplainOptions::builder().tree_limit(0).build();
        assert!(matches!(result, Err(ConfigError::InvalidTreeLimit)));
    }

    #[test]
    fn test_nan_additivity_tolerance_rejected() {
        let result = ExplainOptions::builder().additivity_tolerance(f64::NAN).build();
        assert!(matches!(result, Err(ConfigError::InvalidTolerance { .. })));
    }

    #[test]
    fn test_error_display() {
        let err = ConfigError::InvalidTreeLimit;
        assert_eq!(err.to_string(), "tree_limit must be at least 1");
    }
}
