//! TreeSHAP explainer for tree ensembles.
//!
//! Implements the path-dependent TreeSHAP algorithm from Lundberg et al. (2020):
//! "From local explanations to global understanding with explainable AI for trees"
//!
//! Samples are independent, so a batch is split across worker threads. Each
//! worker owns one set of scratch buffers and reuses it for every sample and
//! tree it processes.

use ndarray::{Array1, Array2, Array3, ArrayView1, ArrayView2, Axis};
use tracing::{debug, warn};

use crate::config::ExplainOptions;
use crate::repr::ensemble::{expected_value, raw_prediction};
use crate::repr::{Ensemble, NodeId, OutputTransform, TreeRecord};
use crate::utils::run_with_threads;

use super::accumulator::{Condition, PathAccumulator};
use super::path::PathStack;
use super::{AdditivityFailure, Attributions, ExplainError, ExplainWarning};

/// Per-worker buffers reused across samples.
struct Scratch {
    path: PathStack,
    present: Vec<f64>,
    absent: Vec<f64>,
    uncovered: Vec<NodeId>,
}

impl Scratch {
    fn new(n_features: usize, max_depth: usize) -> Self {
        Self {
            path: PathStack::with_max_depth(max_depth),
            present: vec![0.0; n_features],
            absent: vec![0.0; n_features],
            uncovered: Vec::new(),
        }
    }
}

/// Everything computed for one sample.
struct SampleOutcome {
    phi: Vec<f64>,
    interactions: Option<Vec<f64>>,
    raw_prediction: f64,
    degenerate: Vec<(usize, NodeId)>,
}

/// TreeSHAP explainer for tree ensembles.
///
/// Computes exact Shapley values in time polynomial in tree depth. Holds the
/// ensemble by reference; explaining never mutates it, so one explainer can be
/// shared across threads.
pub struct TreeExplainer<'a> {
    ensemble: &'a Ensemble,
    options: ExplainOptions,
    trees: &'a [TreeRecord],
    expected_value: f64,
    output_transform: OutputTransform,
}

impl<'a> TreeExplainer<'a> {
    /// Create an explainer for `ensemble`.
    ///
    /// The expected value is computed once here, over the trees kept by
    /// `options.tree_limit`.
    pub fn new(ensemble: &'a Ensemble, options: ExplainOptions) -> Self {
        let trees = ensemble.trees_limited(options.tree_limit);
        let expected_value = expected_value(ensemble.base_offset(), trees);
        let output_transform = options
            .output_transform
            .unwrap_or(ensemble.output_transform());

        Self {
            ensemble,
            options,
            trees,
            expected_value,
            output_transform,
        }
    }

    pub fn ensemble(&self) -> &'a Ensemble {
        self.ensemble
    }

    pub fn options(&self) -> &ExplainOptions {
        &self.options
    }

    /// Number of trees being explained.
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Expected raw margin (the base value of every sample).
    pub fn expected_value(&self) -> f64 {
        self.expected_value
    }

    /// Expected value mapped through the output transform.
    pub fn expected_output(&self) -> f64 {
        self.output_transform.apply(self.expected_value)
    }

    /// Compute attributions for a batch of samples.
    ///
    /// # Arguments
    /// * `samples` - Feature matrix with shape `[n_samples, n_features]`; NaN marks a missing value.
    ///   Extra trailing columns are ignored.
    ///
    /// # Errors
    /// - [`ExplainError::FeatureCountMismatch`] if `samples` has fewer columns than the ensemble has features
    /// - [`ExplainError::AdditivityCheckFailed`] if checking is enabled and a sample's
    ///   attributions miss its prediction; the attributions are kept inside the error
    /// - [`ExplainError::ThreadPool`] if a worker pool cannot be created
    pub fn explain(&self, samples: ArrayView2<'_, f64>) -> Result<Attributions, ExplainError> {
        let n_features = self.ensemble.n_features();
        if samples.ncols() < n_features {
            return Err(ExplainError::FeatureCountMismatch {
                expected: n_features,
                actual: samples.ncols(),
            });
        }

        let n_samples = samples.nrows();
        let max_depth = self.trees.iter().map(TreeRecord::max_depth).max().unwrap_or(0);
        debug!(
            n_samples,
            n_features,
            n_trees = self.trees.len(),
            interactions = self.options.interactions,
            "explaining batch"
        );

        let outcomes = run_with_threads(self.options.n_threads, |parallelism| {
            parallelism.maybe_par_map_init(
                0..n_samples,
                || Scratch::new(n_features, max_depth),
                |scratch, sample| self.explain_sample(samples.row(sample), scratch),
            )
        })?;

        let attributions = self.assemble(outcomes, n_features);
        if attributions.has_warnings() {
            warn!(
                n_warnings = attributions.warnings().len(),
                "samples reached nodes without training cover"
            );
        }

        check_additivity(attributions, &self.options)
    }

    fn explain_sample(&self, row: ArrayView1<'_, f64>, scratch: &mut Scratch) -> SampleOutcome {
        let n_features = self.ensemble.n_features();
        let mut phi = vec![0.0; n_features + 1];
        let mut degenerate = Vec::new();

        for (tree_idx, tree) in self.trees.iter().enumerate() {
            PathAccumulator::new(
                tree,
                &row,
                Condition::None,
                &mut phi[..n_features],
                &mut scratch.path,
            )
            .run();

            scratch.uncovered.clear();
            tree.uncovered_route(&row, &mut scratch.uncovered);
            degenerate.extend(scratch.uncovered.iter().map(|&node| (tree_idx, node)));
        }
        phi[n_features] = self.expected_value;

        let interactions = self
            .options
            .interactions
            .then(|| self.interactions(&row, &phi, scratch));

        SampleOutcome {
            phi,
            interactions,
            raw_prediction: raw_prediction(self.ensemble.base_offset(), self.trees, &row),
            degenerate,
        }
    }

    /// Interaction matrix for one sample, flattened row-major `(M+1) x (M+1)`.
    ///
    /// Off-diagonal entries are half the change in `phi_k` between feature `j`
    /// being always known and never known. The diagonal holds what remains of
    /// `phi_j` after its interactions are removed.
    fn interactions(
        &self,
        row: &ArrayView1<'_, f64>,
        phi: &[f64],
        scratch: &mut Scratch,
    ) -> Vec<f64> {
        let n_features = self.ensemble.n_features();
        let width = n_features + 1;
        let mut matrix = vec![0.0; width * width];
        for j in 0..n_features {
            matrix[j * width + j] = phi[j];
        }
        matrix[n_features * width + n_features] = phi[n_features];

        for j in 0..n_features {
            let feature = j as u32;
            scratch.present.fill(0.0);
            scratch.absent.fill(0.0);

            let mut used = false;
            for tree in self.trees {
                if !tree.uses_feature(feature) {
                    continue;
                }
                used = true;
                for (condition, out) in [
                    (Condition::Present(feature), &mut scratch.present),
                    (Condition::Absent(feature), &mut scratch.absent),
                ] {
                    PathAccumulator::new(tree, row, condition, out, &mut scratch.path).run();
                }
            }
            if !used {
                continue;
            }

            for k in (0..n_features).filter(|&k| k != j) {
                let value = (scratch.present[k] - scratch.absent[k]) / 2.0;
                matrix[j * width + k] = value;
                matrix[j * width + j] -= value;
            }
        }

        matrix
    }

    fn assemble(&self, outcomes: Vec<SampleOutcome>, n_features: usize) -> Attributions {
        let n_samples = outcomes.len();
        let width = n_features + 1;
        let mut values = Array2::<f64>::zeros((n_samples, width));
        let mut raw_predictions = Array1::<f64>::zeros(n_samples);
        let mut interactions = self
            .options
            .interactions
            .then(|| Array3::<f64>::zeros((n_samples, width, width)));
        let mut warnings = Vec::new();

        for (sample, outcome) in outcomes.into_iter().enumerate() {
            values
                .row_mut(sample)
                .assign(&ArrayView1::from(outcome.phi.as_slice()));
            raw_predictions[sample] = outcome.raw_prediction;

            if let (Some(tensor), Some(matrix)) = (interactions.as_mut(), outcome.interactions) {
                for (dst, src) in tensor
                    .index_axis_mut(Axis(0), sample)
                    .iter_mut()
                    .zip(matrix)
                {
                    *dst = src;
                }
            }

            warnings.extend(outcome.degenerate.into_iter().map(|(tree, node)| {
                ExplainWarning::DegenerateCover { sample, tree, node }
            }));
        }

        Attributions::from_parts(
            values,
            interactions,
            raw_predictions,
            self.expected_value,
            self.output_transform,
            warnings,
        )
    }
}

/// Compute attributions with a one-off [`TreeExplainer`].
///
/// # Example
///
/// ```
/// use ndarray::array;
/// use treeshap::{explain, BuildConfig, Ensemble, ExplainOptions, OutputTransform, TreeArrays};
///
/// let mut tree = TreeArrays::new();
/// tree.push_split(0, 0.5, 1, 2, 2.0);
/// tree.push_leaf(0.0, 1.0);
/// tree.push_leaf(1.0, 1.0);
/// let ensemble =
///     Ensemble::from_arrays(vec![tree], 1, 0.0, OutputTransform::Identity, &BuildConfig::default())
///         .unwrap();
///
/// let options = ExplainOptions::builder().interactions(true).build().unwrap();
/// let shap = explain(&ensemble, array![[1.0]].view(), &options).unwrap();
/// assert_eq!(shap.get(0, 0), 0.5);
/// assert_eq!(shap.interaction(0, 0, 0), Some(0.5));
/// assert_eq!(shap.interaction(0, 1, 1), Some(0.5));
/// ```
pub fn explain(
    ensemble: &Ensemble,
    samples: ArrayView2<'_, f64>,
    options: &ExplainOptions,
) -> Result<Attributions, ExplainError> {
    TreeExplainer::new(ensemble, options.clone()).explain(samples)
}

/// Apply the additivity check configured in `options`.
fn check_additivity(
    attributions: Attributions,
    options: &ExplainOptions,
) -> Result<Attributions, ExplainError> {
    if !options.check_additivity {
        return Ok(attributions);
    }

    let violations = attributions.additivity_violations(options.additivity_tolerance);
    if violations.is_empty() {
        return Ok(attributions);
    }

    let failure = AdditivityFailure::new(violations, attributions);
    warn!(
        n_violations = failure.violations.len(),
        worst_residual = failure.worst_residual,
        "additivity check failed"
    );
    Err(ExplainError::AdditivityCheckFailed(Box::new(failure)))
}
