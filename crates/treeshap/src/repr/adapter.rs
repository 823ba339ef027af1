//! Model adapter seam.
//!
//! Anything that can describe itself as flat per-tree arrays can be explained.
//! Adapters for concrete libraries implement [`ToTreeRecords`]; [`RawEnsemble`]
//! is the in-memory form used by tests and by callers that already hold arrays.

use super::transform::OutputTransform;
use super::tree::TreeArrays;

/// Conversion from a trained model into the canonical tree arrays.
pub trait ToTreeRecords {
    /// Number of input features the model expects.
    fn n_features(&self) -> usize;

    /// Constant added to the summed tree outputs.
    fn base_offset(&self) -> f64;

    /// Mapping from raw margin to reported output.
    fn output_transform(&self) -> OutputTransform {
        OutputTransform::Identity
    }

    /// Per-tree arrays, in ensemble order.
    fn tree_arrays(&self) -> Vec<TreeArrays>;
}

/// An ensemble held as plain arrays.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawEnsemble {
    pub n_features: usize,
    pub base_offset: f64,
    pub output_transform: OutputTransform,
    pub trees: Vec<TreeArrays>,
}

impl RawEnsemble {
    pub fn new(n_features: usize, base_offset: f64) -> Self {
        Self {
            n_features,
            base_offset,
            ..Default::default()
        }
    }

    /// Set the output transform (builder pattern).
    pub fn with_output_transform(mut self, output_transform: OutputTransform) -> Self {
        self.output_transform = output_transform;
        self
    }

    /// Append a tree (builder pattern).
    pub fn with_tree(mut self, tree: TreeArrays) -> Self {
        self.trees.push(tree);
        self
    }
}

impl ToTreeRecords for RawEnsemble {
    fn n_features(&self) -> usize {
        self.n_features
    }

    fn base_offset(&self) -> f64 {
        self.base_offset
    }

    fn output_transform(&self) -> OutputTransform {
        self.output_transform
    }

    fn tree_arrays(&self) -> Vec<TreeArrays> {
        self.trees.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BuildConfig;
    use crate::repr::Ensemble;

    #[test]
    fn raw_ensemble_builds_ensemble() {
        let mut tree = TreeArrays::new();
        tree.push_split(1, 0.0, 1, 2, 2.0);
        tree.push_leaf(-1.0, 1.0);
        tree.push_leaf(1.0, 1.0);

        let raw = RawEnsemble::new(2, 0.25)
            .with_output_transform(OutputTransform::Logistic)
            .with_tree(tree);
        let ensemble = Ensemble::from_model(&raw, &BuildConfig::default()).unwrap();

        assert_eq!(ensemble.n_trees(), 1);
        assert_eq!(ensemble.n_features(), 2);
        assert_eq!(ensemble.base_offset(), 0.25);
        assert_eq!(ensemble.output_transform(), OutputTransform::Logistic);
        assert_eq!(ensemble.tree(0).to_arrays(), raw.trees[0]);
    }
}
