//! Ensemble of validated trees.

use ndarray::{Array1, ArrayView2};
use thiserror::Error;
use tracing::debug;

use crate::config::BuildConfig;

use super::adapter::ToTreeRecords;
use super::transform::OutputTransform;
use super::tree::{TreeArrays, TreeRecord, TreeValidationError};
use super::{FeatureRow, NodeId};

/// Validation errors for [`Ensemble`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EnsembleError {
    #[error("tree {tree} is malformed: {error}")]
    MalformedTree {
        tree: usize,
        #[source]
        error: TreeValidationError,
    },
    #[error(
        "tree {tree} node {node} splits on feature {feature}, but the ensemble has {n_features} features"
    )]
    FeatureIndexOutOfRange {
        tree: usize,
        node: NodeId,
        feature: u32,
        n_features: usize,
    },
    #[error("base offset must be finite, got {0}")]
    NonFiniteBaseOffset(f64),
}

/// Ordered trees whose outputs are summed with a base offset.
///
/// The raw margin of a sample is `base_offset + sum(tree(x))`. The output
/// transform maps that margin to the reported prediction.
#[derive(Debug, Clone)]
pub struct Ensemble {
    trees: Vec<TreeRecord>,
    n_features: usize,
    base_offset: f64,
    output_transform: OutputTransform,
}

impl Ensemble {
    /// Create an ensemble from validated trees.
    ///
    /// Checks that every split feature is below `n_features` and that the
    /// base offset is finite.
    pub fn new(
        trees: Vec<TreeRecord>,
        n_features: usize,
        base_offset: f64,
        output_transform: OutputTransform,
    ) -> Result<Self, EnsembleError> {
        if !base_offset.is_finite() {
            return Err(EnsembleError::NonFiniteBaseOffset(base_offset));
        }

        for (tree_idx, tree) in trees.iter().enumerate() {
            let Some(&feature) = tree.used_features().last() else {
                continue;
            };
            if (feature as usize) < n_features {
                continue;
            }
            // Report the first node that splits on an out-of-range feature
            let node = (0..tree.n_nodes() as NodeId)
                .find(|&n| !tree.is_leaf(n) && tree.split_feature(n) as usize >= n_features)
                .unwrap_or(0);
            return Err(EnsembleError::FeatureIndexOutOfRange {
                tree: tree_idx,
                node,
                feature: tree.split_feature(node),
                n_features,
            });
        }

        debug!(
            n_trees = trees.len(),
            n_features,
            base_offset,
            ?output_transform,
            "built ensemble"
        );

        Ok(Self {
            trees,
            n_features,
            base_offset,
            output_transform,
        })
    }

    /// Validate adapter arrays into trees and build an ensemble.
    pub fn from_arrays(
        arrays: impl IntoIterator<Item = TreeArrays>,
        n_features: usize,
        base_offset: f64,
        output_transform: OutputTransform,
        config: &BuildConfig,
    ) -> Result<Self, EnsembleError> {
        let trees = arrays
            .into_iter()
            .enumerate()
            .map(|(tree, arrays)| {
                TreeRecord::from_arrays_with(arrays, config)
                    .map_err(|error| EnsembleError::MalformedTree { tree, error })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(trees, n_features, base_offset, output_transform)
    }

    /// Build an ensemble from any model adapter.
    pub fn from_model<M: ToTreeRecords + ?Sized>(
        model: &M,
        config: &BuildConfig,
    ) -> Result<Self, EnsembleError> {
        Self::from_arrays(
            model.tree_arrays(),
            model.n_features(),
            model.base_offset(),
            model.output_transform(),
            config,
        )
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    #[inline]
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    #[inline]
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    #[inline]
    pub fn base_offset(&self) -> f64 {
        self.base_offset
    }

    #[inline]
    pub fn output_transform(&self) -> OutputTransform {
        self.output_transform
    }

    #[inline]
    pub fn trees(&self) -> &[TreeRecord] {
        &self.trees
    }

    #[inline]
    pub fn tree(&self, idx: usize) -> &TreeRecord {
        &self.trees[idx]
    }

    /// Leading trees kept by `tree_limit`. `None` keeps all of them.
    #[inline]
    pub fn trees_limited(&self, tree_limit: Option<usize>) -> &[TreeRecord] {
        let n = tree_limit.map_or(self.trees.len(), |limit| limit.min(self.trees.len()));
        &self.trees[..n]
    }

    /// Deepest tree in the ensemble.
    pub fn max_depth(&self) -> usize {
        self.trees.iter().map(TreeRecord::max_depth).max().unwrap_or(0)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Expected raw margin: base offset plus each tree's cover-weighted mean.
    pub fn expected_value(&self) -> f64 {
        expected_value(self.base_offset, &self.trees)
    }

    /// Raw margin for one sample.
    #[inline]
    pub fn predict_raw<R: FeatureRow + ?Sized>(&self, row: &R) -> f64 {
        raw_prediction(self.base_offset, &self.trees, row)
    }

    /// Transformed prediction for one sample.
    #[inline]
    pub fn predict<R: FeatureRow + ?Sized>(&self, row: &R) -> f64 {
        self.output_transform.apply(self.predict_raw(row))
    }

    /// Raw margins for a batch of samples (one row per sample).
    pub fn predict_raw_batch(&self, samples: ArrayView2<'_, f64>) -> Array1<f64> {
        samples
            .rows()
            .into_iter()
            .map(|row| self.predict_raw(&row))
            .collect()
    }
}

/// Expected value of `trees` on top of `base_offset`.
pub(crate) fn expected_value(base_offset: f64, trees: &[TreeRecord]) -> f64 {
    base_offset + trees.iter().map(TreeRecord::expected_value).sum::<f64>()
}

/// Raw margin of `row` through `trees`.
#[inline]
pub(crate) fn raw_prediction<R: FeatureRow + ?Sized>(
    base_offset: f64,
    trees: &[TreeRecord],
    row: &R,
) -> f64 {
    base_offset + trees.iter().map(|tree| tree.predict(row)).sum::<f64>()
}
