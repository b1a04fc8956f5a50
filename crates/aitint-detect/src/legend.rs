//! Reference swatches explaining the overlay colors.

use aitint_core::{Rgba, ScoreBand};
use serde::Serialize;

use crate::color::ColorMapper;

/// One legend entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegendSwatch {
    pub score: f64,
    pub label: String,
    pub color: Rgba,
}

/// Evenly spaced swatches from 0.0 to 1.0, drawn with the overlay palette.
#[derive(Debug, Clone, Copy)]
pub struct LegendGenerator {
    steps: usize,
}

impl LegendGenerator {
    /// `steps` intervals produce `steps + 1` swatches; zero is treated as one.
    pub fn new(steps: usize) -> Self {
        Self {
            steps: steps.max(1),
        }
    }

    pub fn swatches(&self) -> Vec<LegendSwatch> {
        let mapper = ColorMapper::OPAQUE;
        let precision = if 10 % self.steps == 0 { 1 } else { 2 };
        (0..=self.steps)
            .map(|i| {
                let score = i as f64 / self.steps as f64;
                LegendSwatch {
                    score,
                    label: format!("{score:.precision$} - {}", ScoreBand::of(score)),
                    color: mapper.color(Some(score)),
                }
            })
            .collect()
    }
}

impl Default for LegendGenerator {
    fn default() -> Self {
        Self::new(10)
    }
}
