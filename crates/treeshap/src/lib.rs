//! treeshap: exact Shapley-value attributions for tree ensembles.
//!
//! Implements the path-dependent Tree SHAP algorithm: per-feature attributions
//! (and optional pairwise interaction values) for single trees, random forests
//! and gradient-boosted ensembles, in time proportional to tree depth and leaf
//! count instead of the number of feature coalitions.
//!
//! # Key Types
//!
//! - [`TreeArrays`] / [`TreeRecord`] - Flat adapter arrays and the validated tree built from them
//! - [`Ensemble`] - Ordered trees with a base offset and an output transform
//! - [`TreeExplainer`] / [`explain`] - Batch attribution with additivity checking
//! - [`Attributions`] - Per-sample attributions, interactions and warnings
//! - [`ExplainOptions`] / [`BuildConfig`] - Configuration builders
//!
//! # Example
//!
//! ```
//! use ndarray::array;
//! use treeshap::{explain, Ensemble, ExplainOptions, OutputTransform, TreeArrays, BuildConfig};
//!
//! // x0 <= 0.5 -> -1.0 else 1.0, covers 60/40
//! let mut arrays = TreeArrays::new();
//! arrays.push_split(0, 0.5, 1, 2, 100.0);
//! arrays.push_leaf(-1.0, 60.0);
//! arrays.push_leaf(1.0, 40.0);
//!
//! let ensemble = Ensemble::from_arrays(
//!     vec![arrays],
//!     2,
//!     0.0,
//!     OutputTransform::Identity,
//!     &BuildConfig::default(),
//! )
//! .unwrap();
//!
//! let samples = array![[0.3, 7.0], [0.9, 1.0]];
//! let shap = explain(&ensemble, samples.view(), &ExplainOptions::default()).unwrap();
//!
//! // The split feature takes all of (prediction - expected value).
//! assert!((shap.get(0, 0) - (-1.0 - (-0.2))).abs() < 1e-12);
//! assert_eq!(shap.get(0, 1), 0.0);
//! ```

// Re-export approx traits for users who want to compare attributions
pub use approx;

pub mod config;
pub mod explain;
pub mod persist;
pub mod repr;
pub mod testing;
pub mod utils;

// =============================================================================
// Convenience Re-exports
// =============================================================================

// Representation
pub use repr::{
    Ensemble, EnsembleError, FeatureRow, NodeId, OutputTransform, RawEnsemble, SplitComparison,
    ToTreeRecords, TreeArrays, TreeRecord, TreeValidationError, NO_CHILD,
};

// Configuration
pub use config::{BuildConfig, ConfigError, ExplainOptions};

// Explanation
pub use explain::{
    explain, tree_contributions, AdditivityFailure, AdditivityViolation, Attributions,
    ExplainError, ExplainWarning, TreeExplainer,
};

// Persistence
pub use persist::{ReadError, WriteError};

// Shared utilities
pub use utils::{run_with_threads, Parallelism};
