//! Conversion between runtime types and schema types.
//!
//! Runtime to schema is lossless and infallible (`From`). Schema to runtime
//! re-runs full tree and ensemble validation, so a hand-edited or corrupted
//! file can never produce an ensemble that construction would have rejected.

use crate::config::BuildConfig;
use crate::repr::{Ensemble, OutputTransform, SplitComparison, TreeArrays, TreeRecord};

use super::error::ReadError;
use super::schema::{EnsembleSchema, OutputTransformSchema, SplitComparisonSchema, TreeSchema};

// =============================================================================
// Enums
// =============================================================================

impl From<OutputTransform> for OutputTransformSchema {
    fn from(transform: OutputTransform) -> Self {
        match transform {
            OutputTransform::Identity => Self::Identity,
            OutputTransform::Logistic => Self::Logistic,
        }
    }
}

impl From<OutputTransformSchema> for OutputTransform {
    fn from(schema: OutputTransformSchema) -> Self {
        match schema {
            OutputTransformSchema::Identity => Self::Identity,
            OutputTransformSchema::Logistic => Self::Logistic,
        }
    }
}

impl From<SplitComparison> for SplitComparisonSchema {
    fn from(comparison: SplitComparison) -> Self {
        match comparison {
            SplitComparison::LessOrEqual => Self::LessOrEqual,
            SplitComparison::Less => Self::Less,
        }
    }
}

impl From<SplitComparisonSchema> for SplitComparison {
    fn from(schema: SplitComparisonSchema) -> Self {
        match schema {
            SplitComparisonSchema::LessOrEqual => Self::LessOrEqual,
            SplitComparisonSchema::Less => Self::Less,
        }
    }
}

// =============================================================================
// Trees
// =============================================================================

impl From<&TreeRecord> for TreeSchema {
    fn from(tree: &TreeRecord) -> Self {
        let arrays = tree.to_arrays();
        Self {
            num_nodes: arrays.n_nodes() as u32,
            split_features: arrays.split_features,
            thresholds: arrays.thresholds,
            children_left: arrays.children_left,
            children_right: arrays.children_right,
            default_left: arrays.default_left,
            leaf_values: arrays.leaf_values,
            covers: arrays.covers,
            comparison: arrays.comparison.into(),
        }
    }
}

impl TryFrom<TreeSchema> for TreeArrays {
    type Error = ReadError;

    fn try_from(schema: TreeSchema) -> Result<Self, Self::Error> {
        if schema.num_nodes as usize != schema.children_left.len() {
            return Err(ReadError::CorruptPayload(format!(
                "tree declares {} nodes but stores {}",
                schema.num_nodes,
                schema.children_left.len()
            )));
        }

        Ok(Self {
            split_features: schema.split_features,
            thresholds: schema.thresholds,
            children_left: schema.children_left,
            children_right: schema.children_right,
            default_left: schema.default_left,
            leaf_values: schema.leaf_values,
            covers: schema.covers,
            comparison: schema.comparison.into(),
        })
    }
}

// =============================================================================
// Ensembles
// =============================================================================

impl From<&Ensemble> for EnsembleSchema {
    fn from(ensemble: &Ensemble) -> Self {
        Self {
            n_features: ensemble.n_features(),
            base_offset: ensemble.base_offset(),
            output_transform: ensemble.output_transform().into(),
            trees: ensemble.trees().iter().map(TreeSchema::from).collect(),
        }
    }
}

impl EnsembleSchema {
    /// Validate the schema into an ensemble.
    pub fn into_ensemble(self, config: &BuildConfig) -> Result<Ensemble, ReadError> {
        let arrays = self
            .trees
            .into_iter()
            .map(TreeArrays::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Ensemble::from_arrays(
            arrays,
            self.n_features,
            self.base_offset,
            self.output_transform.into(),
            config,
        )?)
    }
}

impl TryFrom<EnsembleSchema> for Ensemble {
    type Error = ReadError;

    fn try_from(schema: EnsembleSchema) -> Result<Self, Self::Error> {
        schema.into_ensemble(&BuildConfig::default())
    }
}
