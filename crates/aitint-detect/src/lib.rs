//! Detection engines for aitint
//!
//! This crate turns extracted document text into per-region scores of how
//! likely the text is machine-generated, and into colored overlays for a
//! renderer. It provides:
//!
//! - [`merge`]: grouping of text units into page-local scoring segments
//! - [`simple`]: a perplexity detector
//! - [`curvature`]: a Fast-DetectGPT style probability-curvature detector
//! - [`color`] and [`legend`]: score to color mapping and legend swatches
//! - [`pipeline`]: concurrent scoring of a whole document with per-segment
//!   timeouts
//!
//! Language models sit behind the [`model::LanguageModel`] trait; the
//! production backend runs a Qwen2-family causal LM with Candle.

pub mod calibration;
pub mod color;
pub mod curvature;
pub mod detector;
pub mod device;
pub mod inference_stats;
pub mod legend;
pub mod merge;
pub mod model;
pub mod pipeline;
pub mod simple;
pub mod summary;

#[cfg(test)]
mod testing;

pub use color::ColorMapper;
pub use curvature::CurvatureDetector;
pub use detector::Detector;
pub use inference_stats::{LatencyStats, LatencyTracker};
pub use legend::{LegendGenerator, LegendSwatch};
pub use merge::merge_units;
pub use model::{CandleLanguageModel, LanguageModel, ModelSource};
pub use pipeline::{DocumentOverlay, Overlay, PageOverlays, ScoringPipeline};
pub use simple::SimpleDetector;
pub use summary::ScoreSummary;
