//! Document-level score summary.

use aitint_core::{DetectionResult, ScoreBand};
use serde::Serialize;

/// Aggregate counts and score range over one document's segments.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScoreSummary {
    pub segments: usize,
    pub scored: usize,
    pub unscored: usize,
    /// `None` when nothing was scored.
    pub mean: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub human_like: usize,
    pub mixed: usize,
    pub ai_like: usize,
}

impl ScoreSummary {
    pub fn from_results<'a>(results: impl IntoIterator<Item = &'a DetectionResult>) -> Self {
        let mut summary = Self::default();
        let mut total = 0.0;
        for result in results {
            summary.segments += 1;
            let Some(score) = result.score() else {
                summary.unscored += 1;
                continue;
            };
            summary.scored += 1;
            total += score;
            summary.min = Some(summary.min.map_or(score, |m| m.min(score)));
            summary.max = Some(summary.max.map_or(score, |m| m.max(score)));
            match ScoreBand::of(score) {
                ScoreBand::Human => summary.human_like += 1,
                ScoreBand::Mixed => summary.mixed += 1,
                ScoreBand::AiGenerated => summary.ai_like += 1,
            }
        }
        if summary.scored > 0 {
            summary.mean = Some(total / summary.scored as f64);
        }
        summary
    }
}
