//! Schema types for ensemble serialization.
//!
//! These types provide a stable serialization format independent of runtime
//! types, so the on-disk layout can evolve separately and every load goes
//! through validation. The same schema is written as JSON and as the postcard
//! payload of the binary format, so it avoids serde features that need a
//! self-describing format.

use serde::{Deserialize, Serialize};

/// Version of the JSON document layout.
pub const FORMAT_VERSION: u32 = 1;

/// Output transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputTransformSchema {
    Identity,
    Logistic,
}

/// Split comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitComparisonSchema {
    LessOrEqual,
    Less,
}

/// Tree schema (SoA layout).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeSchema {
    /// Number of nodes (internal + leaves).
    pub num_nodes: u32,
    /// Split feature index per node (ignored on leaves).
    pub split_features: Vec<u32>,
    /// Split threshold per node (ignored on leaves).
    pub thresholds: Vec<f64>,
    /// Left child per node (`u32::MAX` on leaves).
    pub children_left: Vec<u32>,
    /// Right child per node (`u32::MAX` on leaves).
    pub children_right: Vec<u32>,
    /// Missing-value direction per node (true = left).
    pub default_left: Vec<bool>,
    /// Leaf value per node (ignored on internal nodes).
    pub leaf_values: Vec<f64>,
    /// Training cover per node.
    pub covers: Vec<f64>,
    pub comparison: SplitComparisonSchema,
}

/// Ensemble schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleSchema {
    pub n_features: usize,
    pub base_offset: f64,
    pub output_transform: OutputTransformSchema,
    pub trees: Vec<TreeSchema>,
}

/// Top-level JSON document: a version tag around the ensemble.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleDocument {
    pub format_version: u32,
    pub ensemble: EnsembleSchema,
}
