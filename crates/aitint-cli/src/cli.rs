//! Command-line arguments and their mapping onto [`AitintConfig`].

use aitint_core::{AitintConfig, DetectionMethod};
use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "aitint",
    version,
    about = "Score document text for AI-generated passages and emit color overlays"
)]
pub struct Cli {
    /// JSON array of text units (text, bbox, page) in reading order.
    pub input: PathBuf,

    /// Where to write the JSON overlay document.
    pub output: PathBuf,

    /// YAML configuration file. Command-line flags override its values.
    #[arg(long, env = "AITINT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Scoring model: HuggingFace model ID or local directory.
    #[arg(long)]
    pub model: Option<String>,

    /// Sampling model for the curvature detector (defaults to --model).
    #[arg(long)]
    pub sampling_model: Option<String>,

    /// Detector: simple (perplexity) or curvature (Fast-DetectGPT).
    #[arg(long)]
    pub detector: Option<DetectionMethod>,

    /// Number of consecutive text units merged into one scored segment.
    #[arg(long)]
    pub merge_boxes: Option<usize>,

    /// Overlay opacity in [0, 1].
    #[arg(long)]
    pub opacity: Option<f32>,

    /// Segments with fewer trimmed characters are left unscored.
    #[arg(long)]
    pub min_text_length: Option<usize>,

    /// Sampled variants per segment (curvature only).
    #[arg(long)]
    pub samples: Option<usize>,

    /// Include a color legend in the output.
    #[arg(long)]
    pub create_legend: bool,

    /// Directory for downloaded model files.
    #[arg(long)]
    pub cache_dir: Option<String>,
}

impl Cli {
    /// Overwrite config values with any flags given on the command line.
    pub fn apply_overrides(&self, config: &mut AitintConfig) {
        if let Some(model) = &self.model {
            config.detector.model_id.clone_from(model);
        }
        if let Some(sampling) = &self.sampling_model {
            config.detector.sampling_model_id = Some(sampling.clone());
        }
        if let Some(kind) = self.detector {
            config.detector.kind = kind;
        }
        if let Some(window) = self.merge_boxes {
            config.merge.window = window;
        }
        if let Some(opacity) = self.opacity {
            config.overlay.opacity = opacity;
        }
        if let Some(min) = self.min_text_length {
            config.detector.min_text_length = min;
        }
        if let Some(samples) = self.samples {
            config.detector.sample_count = samples;
        }
        if self.create_legend {
            config.overlay.emit_legend = true;
        }
        if let Some(dir) = &self.cache_dir {
            config.detector.cache_dir = Some(dir.clone());
        }
    }
}
