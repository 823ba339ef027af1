//! Tree SHAP explanations.
//!
//! - [`TreeExplainer`] / [`explain`]: batch attributions for an [`Ensemble`](crate::Ensemble)
//! - [`tree_contributions`]: attributions of a single tree for one sample
//! - [`Attributions`]: results, with additivity checks and warnings

mod accumulator;
mod explainer;
mod path;
mod values;

pub use accumulator::tree_contributions;
pub use explainer::{explain, TreeExplainer};
pub use values::Attributions;

use thiserror::Error;

use crate::repr::NodeId;

// =============================================================================
// Warnings
// =============================================================================

/// Non-fatal conditions met while explaining.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExplainWarning {
    /// The sample's route passes through a node without training cover,
    /// either an empty leaf or a split whose children carry no cover.
    DegenerateCover {
        sample: usize,
        tree: usize,
        node: NodeId,
    },
}

// =============================================================================
// Errors
// =============================================================================

/// One sample whose attributions do not sum to its prediction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdditivityViolation {
    pub sample: usize,
    /// Raw margin of the sample.
    pub prediction: f64,
    /// `sum(attributions) + base - prediction`.
    pub residual: f64,
}

/// Failed additivity check, carrying the best-effort attributions.
#[derive(Debug, Clone, Error)]
#[error(
    "additivity check failed for {} of {} samples (worst residual {worst_residual:e})",
    .violations.len(),
    .attributions.n_samples()
)]
pub struct AdditivityFailure {
    pub violations: Vec<AdditivityViolation>,
    pub attributions: Attributions,
    pub worst_residual: f64,
}

impl AdditivityFailure {
    pub(crate) fn new(violations: Vec<AdditivityViolation>, attributions: Attributions) -> Self {
        let worst_residual = violations
            .iter()
            .map(|v| v.residual.abs())
            .fold(0.0, f64::max);
        Self {
            violations,
            attributions,
            worst_residual,
        }
    }
}

/// Errors from [`TreeExplainer::explain`].
#[derive(Debug, Error)]
pub enum ExplainError {
    #[error("samples have {actual} feature columns, but the ensemble expects {expected}")]
    FeatureCountMismatch { expected: usize, actual: usize },

    #[error(transparent)]
    AdditivityCheckFailed(Box<AdditivityFailure>),

    #[error("failed to build thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl ExplainError {
    /// Recover the attributions from a failed additivity check.
    pub fn into_attributions(self) -> Option<Attributions> {
        match self {
            ExplainError::AdditivityCheckFailed(failure) => Some(failure.attributions),
            _ => None,
        }
    }
}
