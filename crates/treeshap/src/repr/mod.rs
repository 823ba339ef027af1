//! Canonical tree and ensemble representations.

use ndarray::{ArrayBase, Data, Ix1};

/// Node identifier: an index into a tree's SoA arrays.
pub type NodeId = u32;

/// Child sentinel marking a leaf.
pub const NO_CHILD: NodeId = NodeId::MAX;

pub mod adapter;
pub mod ensemble;
pub mod transform;
pub mod tree;

pub use adapter::{RawEnsemble, ToTreeRecords};
pub use ensemble::{Ensemble, EnsembleError};
pub use transform::OutputTransform;
pub use tree::{SplitComparison, TreeArrays, TreeRecord, TreeValidationError};

// ============================================================================
// FeatureRow
// ============================================================================

/// Read access to the feature values of one sample.
///
/// NaN is treated as missing and routed by the node's default direction.
pub trait FeatureRow {
    /// Number of feature values available.
    fn n_features(&self) -> usize;

    /// Value of feature `index`. Panics when out of range.
    fn feature(&self, index: usize) -> f64;
}

impl FeatureRow for [f64] {
    #[inline]
    fn n_features(&self) -> usize {
        self.len()
    }

    #[inline]
    fn feature(&self, index: usize) -> f64 {
        self[index]
    }
}

impl<const N: usize> FeatureRow for [f64; N] {
    #[inline]
    fn n_features(&self) -> usize {
        N
    }

    #[inline]
    fn feature(&self, index: usize) -> f64 {
        self[index]
    }
}

impl FeatureRow for Vec<f64> {
    #[inline]
    fn n_features(&self) -> usize {
        self.len()
    }

    #[inline]
    fn feature(&self, index: usize) -> f64 {
        self[index]
    }
}

impl<S: Data<Elem = f64>> FeatureRow for ArrayBase<S, Ix1> {
    #[inline]
    fn n_features(&self) -> usize {
        self.len()
    }

    #[inline]
    fn feature(&self, index: usize) -> f64 {
        self[index]
    }
}
