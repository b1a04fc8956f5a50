//! Calibration transforms from raw detector statistics to `[0, 1]` scores.
//!
//! Both transforms are logistic curves whose constants come from
//! configuration ([`PerplexityCalibration`], [`CurvatureCalibration`]); only
//! the shape and direction are fixed here.

use aitint_core::{CurvatureCalibration, PerplexityCalibration};

/// Numerically stable logistic function.
pub(crate) fn logistic(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

/// Map a perplexity to a score. Monotonically non-increasing in `perplexity`.
///
/// Perplexity 0 maps to 1.0 and infinite perplexity to 0.0.
pub fn perplexity_score(cal: &PerplexityCalibration, perplexity: f64) -> f64 {
    if perplexity <= 0.0 {
        return 1.0;
    }
    if perplexity.is_infinite() {
        return 0.0;
    }
    logistic((cal.center - perplexity.ln()) / cal.scale)
}

/// Map a curvature z-statistic to a score. Monotonically non-decreasing,
/// with `z = 0` mapping to exactly 0.5.
pub fn curvature_score(cal: &CurvatureCalibration, z: f64) -> f64 {
    logistic(z / cal.scale)
}
