//! Output transformation for reported predictions.
//!
//! The [`OutputTransform`] enum defines how an ensemble's raw margin is mapped
//! to the value a user sees. Attributions are always computed on the margin;
//! the transform only applies to reported predictions and expected outputs.
//!
//! # Variants
//!
//! - [`Identity`](OutputTransform::Identity): No transformation (regression, raw margins)
//! - [`Logistic`](OutputTransform::Logistic): Logistic sigmoid for binary classification

/// Mapping from raw margin to reported output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OutputTransform {
    /// No transformation; output = margin.
    #[default]
    Identity,

    /// Logistic sigmoid: output = 1 / (1 + exp(-margin)).
    Logistic,
}

impl OutputTransform {
    /// Apply the transformation to a single margin.
    ///
    /// # NaN/Inf Behavior
    ///
    /// NaN propagates. Infinities saturate to 0 or 1 under `Logistic`.
    #[inline]
    pub fn apply(self, margin: f64) -> f64 {
        match self {
            OutputTransform::Identity => margin,
            OutputTransform::Logistic => sigmoid(margin),
        }
    }

    /// Apply the transformation in-place to a buffer of margins.
    #[inline]
    pub fn transform_inplace(self, margins: &mut [f64]) {
        if self == OutputTransform::Identity {
            return;
        }
        for x in margins.iter_mut() {
            *x = self.apply(*x);
        }
    }
}

/// Numerically stable sigmoid.
/// Clamps input to [-500, 500] to prevent overflow.
#[inline]
fn sigmoid(x: f64) -> f64 {
    let clamped = x.clamp(-500.0, 500.0);
    if clamped >= 0.0 {
        1.0 / (1.0 + (-clamped).exp())
    } else {
        let e = clamped.exp();
        e / (1.0 + e)
    }
}
