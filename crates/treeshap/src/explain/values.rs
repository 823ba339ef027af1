//! Attribution container.
//!
//! Stores Shapley attributions for a batch of samples together with the raw
//! predictions they explain, optional interaction matrices and the warnings
//! raised while computing them.

use ndarray::{s, Array1, Array2, Array3, ArrayView1, ArrayView2, ArrayView3, Axis};

use crate::repr::OutputTransform;

use super::{AdditivityViolation, ExplainWarning};

/// Attributions for a batch of samples.
///
/// Layout of `values` is `[samples x (features + 1)]` where the last column
/// holds the base value (the expected raw margin). Interactions, when
/// requested, are `[samples x (features + 1) x (features + 1)]` with the base
/// value at `[s, M, M]`.
#[derive(Clone, Debug)]
pub struct Attributions {
    values: Array2<f64>,
    interactions: Option<Array3<f64>>,
    raw_predictions: Array1<f64>,
    expected_value: f64,
    output_transform: OutputTransform,
    warnings: Vec<ExplainWarning>,
}

impl Attributions {
    pub(crate) fn from_parts(
        values: Array2<f64>,
        interactions: Option<Array3<f64>>,
        raw_predictions: Array1<f64>,
        expected_value: f64,
        output_transform: OutputTransform,
        warnings: Vec<ExplainWarning>,
    ) -> Self {
        debug_assert_eq!(values.nrows(), raw_predictions.len());
        debug_assert!(values.ncols() >= 1);
        Self {
            values,
            interactions,
            raw_predictions,
            expected_value,
            output_transform,
            warnings,
        }
    }

    /// Number of samples.
    #[inline]
    pub fn n_samples(&self) -> usize {
        self.values.nrows()
    }

    /// Number of features (not including base value).
    #[inline]
    pub fn n_features(&self) -> usize {
        self.values.ncols() - 1
    }

    // =========================================================================
    // Attributions
    // =========================================================================

    /// Attribution of `feature` for `sample`. `feature == n_features` is the base value.
    #[inline]
    pub fn get(&self, sample: usize, feature: usize) -> f64 {
        self.values[[sample, feature]]
    }

    /// Base value (expected raw margin) for a sample.
    #[inline]
    pub fn base_value(&self, sample: usize) -> f64 {
        self.values[[sample, self.n_features()]]
    }

    /// All values for one sample, base value last.
    pub fn sample(&self, sample: usize) -> ArrayView1<'_, f64> {
        self.values.row(sample)
    }

    /// Full `[samples x (features + 1)]` matrix.
    pub fn values(&self) -> ArrayView2<'_, f64> {
        self.values.view()
    }

    /// Feature columns only, without the base value.
    pub fn feature_values(&self) -> ArrayView2<'_, f64> {
        self.values.slice(s![.., ..self.n_features()])
    }

    /// Consume into the owned `[samples x (features + 1)]` matrix.
    pub fn into_values(self) -> Array2<f64> {
        self.values
    }

    // =========================================================================
    // Interactions
    // =========================================================================

    /// Interaction tensor, if it was requested.
    pub fn interactions(&self) -> Option<ArrayView3<'_, f64>> {
        self.interactions.as_ref().map(|i| i.view())
    }

    /// Interaction between `i` and `j` for `sample`, if interactions were requested.
    #[inline]
    pub fn interaction(&self, sample: usize, i: usize, j: usize) -> Option<f64> {
        self.interactions.as_ref().map(|m| m[[sample, i, j]])
    }

    /// `(M+1) x (M+1)` interaction matrix for one sample.
    pub fn sample_interactions(&self, sample: usize) -> Option<ArrayView2<'_, f64>> {
        self.interactions
            .as_ref()
            .map(|m| m.index_axis(Axis(0), sample))
    }

    // =========================================================================
    // Predictions
    // =========================================================================

    /// Expected raw margin over the trees that were explained.
    #[inline]
    pub fn expected_value(&self) -> f64 {
        self.expected_value
    }

    /// Expected value mapped through the output transform.
    #[inline]
    pub fn expected_output(&self) -> f64 {
        self.output_transform.apply(self.expected_value)
    }

    #[inline]
    pub fn output_transform(&self) -> OutputTransform {
        self.output_transform
    }

    /// Raw margin of a sample.
    #[inline]
    pub fn raw_prediction(&self, sample: usize) -> f64 {
        self.raw_predictions[sample]
    }

    /// Transformed prediction of a sample.
    #[inline]
    pub fn prediction(&self, sample: usize) -> f64 {
        self.output_transform.apply(self.raw_predictions[sample])
    }

    pub fn raw_predictions(&self) -> ArrayView1<'_, f64> {
        self.raw_predictions.view()
    }

    pub fn predictions(&self) -> Array1<f64> {
        self.raw_predictions.mapv(|m| self.output_transform.apply(m))
    }

    // =========================================================================
    // Additivity
    // =========================================================================

    /// `sum(attributions) + base - raw prediction` for one sample.
    pub fn residual(&self, sample: usize) -> f64 {
        self.values.row(sample).sum() - self.raw_predictions[sample]
    }

    /// Residual of every sample.
    pub fn residuals(&self) -> Array1<f64> {
        Array1::from_shape_fn(self.n_samples(), |s| self.residual(s))
    }

    /// Largest absolute residual, 0.0 for an empty batch.
    pub fn max_abs_residual(&self) -> f64 {
        (0..self.n_samples())
            .map(|s| self.residual(s).abs())
            .fold(0.0, f64::max)
    }

    /// Samples whose residual exceeds `tolerance * max(1, |prediction|)`.
    pub fn additivity_violations(&self, tolerance: f64) -> Vec<AdditivityViolation> {
        (0..self.n_samples())
            .filter_map(|sample| {
                let prediction = self.raw_predictions[sample];
                let residual = self.residual(sample);
                // NaN residuals count as violations
                let within = residual.abs() <= tolerance * prediction.abs().max(1.0);
                (!within).then_some(AdditivityViolation {
                    sample,
                    prediction,
                    residual,
                })
            })
            .collect()
    }

    /// Whether every sample satisfies the sum property within `tolerance`.
    pub fn verify(&self, tolerance: f64) -> bool {
        self.additivity_violations(tolerance).is_empty()
    }

    // =========================================================================
    // Warnings
    // =========================================================================

    pub fn warnings(&self) -> &[ExplainWarning] {
        &self.warnings
    }

    #[inline]
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn sample_attributions() -> Attributions {
        // Two samples, two features, base value 0.5
        Attributions::from_parts(
            array![[1.0, -0.5, 0.5], [0.25, 0.25, 0.5]],
            None,
            array![1.0, 1.0],
            0.5,
            OutputTransform::Identity,
            Vec::new(),
        )
    }

    #[test]
    fn test_shape() {
        let shap = sample_attributions();
        assert_eq!(shap.n_samples(), 2);
        assert_eq!(shap.n_features(), 2);
        assert_eq!(shap.values().dim(), (2, 3));
        assert_eq!(shap.feature_values().dim(), (2, 2));
    }

    #[test]
    fn test_get_and_base_value() {
        let shap = sample_attributions();
        assert_eq!(shap.get(0, 0), 1.0);
        assert_eq!(shap.get(1, 1), 0.25);
        assert_eq!(shap.base_value(0), 0.5);
        assert_eq!(shap.base_value(1), shap.get(1, 2));
        assert_eq!(shap.sample(0).to_vec(), vec![1.0, -0.5, 0.5]);
    }

    #[test]
    fn test_verify_correct() {
        let shap = sample_attributions();
        assert!(shap.verify(1e-10));
        assert_abs_diff_eq!(shap.max_abs_residual(), 0.0);
    }

    #[test]
    fn test_verify_incorrect() {
        let mut parts = sample_attributions();
        parts.values[[1, 0]] = 0.75;
        assert!(!parts.verify(1e-6));

        let violations = parts.additivity_violations(1e-6);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].sample, 1);
        assert_abs_diff_eq!(violations[0].residual, 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(parts.residuals()[1], 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_tolerance_scales_with_prediction() {
        let shap = Attributions::from_parts(
            array![[1000.0 + 5e-4, 0.0]],
            None,
            array![1000.0],
            0.0,
            OutputTransform::Identity,
            Vec::new(),
        );
        // |residual| = 5e-4 <= 1e-6 * 1000
        assert!(shap.verify(1e-6));
        assert!(!shap.verify(1e-7));
    }

    #[test]
    fn test_logistic_predictions() {
        let shap = Attributions::from_parts(
            array![[0.0, 0.0]],
            None,
            array![0.0],
            0.0,
            OutputTransform::Logistic,
            Vec::new(),
        );
        assert_abs_diff_eq!(shap.prediction(0), 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(shap.expected_output(), 0.5, epsilon = 1e-12);
        assert_eq!(shap.raw_prediction(0), 0.0);
    }

    #[test]
    fn test_missing_interactions() {
        let shap = sample_attributions();
        assert!(shap.interactions().is_none());
        assert!(shap.interaction(0, 0, 1).is_none());
        assert!(shap.sample_interactions(0).is_none());
    }
}
