//! Score to overlay color mapping.
//!
//! Scores run green (0.0, human-like) through yellow (0.5) to red (1.0,
//! AI-like), interpolating each channel linearly within each half. Unscored
//! segments are fully transparent.

use aitint_core::{AitintError, DetectionResult, Result, Rgba};

pub const GREEN: [f32; 3] = [0.0, 1.0, 0.0];
pub const YELLOW: [f32; 3] = [1.0, 1.0, 0.0];
pub const RED: [f32; 3] = [1.0, 0.0, 0.0];

/// Stateless score → RGBA mapping with a fixed overlay opacity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorMapper {
    opacity: f32,
}

impl ColorMapper {
    /// Full opacity, used for legend swatches.
    pub const OPAQUE: Self = Self { opacity: 1.0 };

    /// # Errors
    ///
    /// Returns [`AitintError::Config`] if `opacity` is outside `[0, 1]`.
    pub fn new(opacity: f32) -> Result<Self> {
        if !(0.0..=1.0).contains(&opacity) {
            return Err(AitintError::Config(format!(
                "opacity must be within [0, 1], got {opacity}"
            )));
        }
        Ok(Self { opacity })
    }

    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    /// RGB for a score; values outside `[0, 1]` are clamped.
    pub fn rgb(score: f64) -> [f32; 3] {
        let s = if score.is_nan() { 0.5 } else { score.clamp(0.0, 1.0) } as f32;
        if s <= 0.5 {
            lerp(GREEN, YELLOW, s / 0.5)
        } else {
            lerp(YELLOW, RED, (s - 0.5) / 0.5)
        }
    }

    /// Overlay color: the configured opacity when scored, transparent otherwise.
    pub fn color(&self, score: Option<f64>) -> Rgba {
        match score {
            Some(s) => {
                let [r, g, b] = Self::rgb(s);
                Rgba::new(r, g, b, self.opacity)
            }
            None => Rgba::TRANSPARENT,
        }
    }

    pub fn color_for(&self, result: &DetectionResult) -> Rgba {
        self.color(result.score())
    }
}

fn lerp(from: [f32; 3], to: [f32; 3], t: f32) -> [f32; 3] {
    [
        from[0] + (to[0] - from[0]) * t,
        from[1] + (to[1] - from[1]) * t,
        from[2] + (to[2] - from[2]) * t,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use aitint_core::{DetectionMethod, UnscoredReason};

    const TOL: f32 = 1e-6;

    fn assert_rgb(actual: [f32; 3], expected: [f32; 3]) {
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < TOL, "{actual:?} != {expected:?}");
        }
    }

    #[test]
    fn test_anchor_colors() {
        assert_rgb(ColorMapper::rgb(0.0), GREEN);
        assert_rgb(ColorMapper::rgb(0.5), YELLOW);
        assert_rgb(ColorMapper::rgb(1.0), RED);
    }

    #[test]
    fn test_quarter_points() {
        assert_rgb(ColorMapper::rgb(0.25), [0.5, 1.0, 0.0]);
        assert_rgb(ColorMapper::rgb(0.75), [1.0, 0.5, 0.0]);
    }

    #[test]
    fn test_continuous_across_midpoint() {
        let below = ColorMapper::rgb(0.5 - 1e-7);
        let above = ColorMapper::rgb(0.5 + 1e-7);
        for (b, a) in below.iter().zip(above) {
            assert!((b - a).abs() < 1e-5);
        }
    }

    #[test]
    fn test_channels_monotone_within_halves() {
        let mut prev = ColorMapper::rgb(0.0);
        for i in 1..=100 {
            let s = f64::from(i) / 100.0;
            let cur = ColorMapper::rgb(s);
            if s <= 0.5 {
                assert!(cur[0] >= prev[0] && cur[1] == 1.0);
            } else {
                assert!(cur[0] == 1.0 && cur[1] <= prev[1]);
            }
            assert_eq!(cur[2], 0.0);
            prev = cur;
        }
    }

    #[test]
    fn test_out_of_range_scores_clamped() {
        assert_rgb(ColorMapper::rgb(-3.0), GREEN);
        assert_rgb(ColorMapper::rgb(7.0), RED);
    }

    #[test]
    fn test_alpha_follows_scoring() {
        let mapper = ColorMapper::new(0.3).unwrap();
        assert!((mapper.color(Some(0.9)).a - 0.3).abs() < TOL);
        assert!((mapper.color(Some(0.0)).a - 0.3).abs() < TOL);
        assert!(mapper.color(None).is_transparent());

        let unscored = DetectionResult::unscored(DetectionMethod::Simple, UnscoredReason::TooShort);
        assert_eq!(mapper.color_for(&unscored), Rgba::TRANSPARENT);
    }

    #[test]
    fn test_invalid_opacity_rejected() {
        assert!(ColorMapper::new(-0.1).is_err());
        assert!(ColorMapper::new(1.01).is_err());
        assert!(ColorMapper::new(1.0).is_ok());
    }
}
