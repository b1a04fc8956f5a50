//! Core types, configuration, and errors for aitint
//!
//! This crate contains the data model shared by every aitint component: the
//! extracted [`TextUnit`]s, the [`MergedSegment`]s they are grouped into, the
//! [`DetectionResult`] a detector produces for a segment, and the overlay
//! colors handed to the renderer. It also defines the YAML-loadable
//! [`AitintConfig`] and the crate-wide [`AitintError`].

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Geometry
// ---------------------------------------------------------------------------

/// Axis-aligned rectangle in page coordinates.
///
/// Always satisfies `x0 < x1` and `y0 < y1`. Serialized as
/// `[x0, y0, x1, y1]`; deserialization applies the same validation as
/// [`BoundingBox::new`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "[f64; 4]", into = "[f64; 4]")]
pub struct BoundingBox {
    x0: f64,
    y0: f64,
    x1: f64,
    y1: f64,
}

impl BoundingBox {
    /// Create a bounding box from its corner coordinates.
    ///
    /// # Errors
    ///
    /// Returns [`AitintError::Contract`] if any coordinate is not finite or
    /// the box is empty or inverted.
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Result<Self> {
        if ![x0, y0, x1, y1].iter().all(|v| v.is_finite()) {
            return Err(AitintError::Contract(format!(
                "bounding box has non-finite coordinates: ({x0}, {y0}, {x1}, {y1})"
            )));
        }
        if x0 >= x1 || y0 >= y1 {
            return Err(AitintError::Contract(format!(
                "bounding box must satisfy x0 < x1 and y0 < y1: ({x0}, {y0}, {x1}, {y1})"
            )));
        }
        Ok(Self { x0, y0, x1, y1 })
    }

    pub fn x0(&self) -> f64 {
        self.x0
    }

    pub fn y0(&self) -> f64 {
        self.y0
    }

    pub fn x1(&self) -> f64 {
        self.x1
    }

    pub fn y1(&self) -> f64 {
        self.y1
    }

    /// Smallest box enclosing both `self` and `other`.
    #[must_use]
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }
}

impl TryFrom<[f64; 4]> for BoundingBox {
    type Error = AitintError;

    fn try_from(v: [f64; 4]) -> Result<Self> {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

impl From<BoundingBox> for [f64; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.x0, b.y0, b.x1, b.y1]
    }
}

// ---------------------------------------------------------------------------
// Text units and segments
// ---------------------------------------------------------------------------

/// Smallest extracted text fragment, as produced by the document parser.
///
/// Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextUnit {
    text: String,
    bbox: BoundingBox,
    /// 0-indexed page number.
    page: u32,
    /// Score assigned upstream, if any.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_unit_score"
    )]
    score: Option<f64>,
}

impl TextUnit {
    /// Create an unscored text unit.
    pub fn new(text: impl Into<String>, bbox: BoundingBox, page: u32) -> Self {
        Self {
            text: text.into(),
            bbox,
            page,
            score: None,
        }
    }

    /// Attach an upstream score.
    ///
    /// # Errors
    ///
    /// Returns [`AitintError::Contract`] if `score` is outside `[0, 1]`.
    pub fn with_score(mut self, score: f64) -> Result<Self> {
        check_unit_interval("text unit score", score)?;
        self.score = Some(score);
        Ok(self)
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn bbox(&self) -> &BoundingBox {
        &self.bbox
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn score(&self) -> Option<f64> {
        self.score
    }
}

fn deserialize_unit_score<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let score = Option::<f64>::deserialize(deserializer)?;
    if let Some(s) = score {
        check_unit_interval("text unit score", s).map_err(serde::de::Error::custom)?;
    }
    Ok(score)
}

fn check_unit_interval(what: &str, value: f64) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(AitintError::Contract(format!(
            "{what} must be within [0, 1], got {value}"
        )))
    }
}

/// Separator placed between member texts of a [`MergedSegment`].
pub const SEGMENT_TEXT_SEPARATOR: &str = " ";

/// A contiguous run of [`TextUnit`]s from a single page, scored as one unit.
///
/// Borrows its members; the bounding box and text are derived on demand.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MergedSegment<'a> {
    units: &'a [TextUnit],
}

impl<'a> MergedSegment<'a> {
    /// Wrap a run of units as a segment.
    ///
    /// # Errors
    ///
    /// Returns [`AitintError::Contract`] if `units` is empty or spans more
    /// than one page.
    pub fn new(units: &'a [TextUnit]) -> Result<Self> {
        let first = units
            .first()
            .ok_or_else(|| AitintError::Contract("merged segment must not be empty".to_string()))?;
        if let Some(stray) = units.iter().find(|u| u.page != first.page) {
            return Err(AitintError::Contract(format!(
                "merged segment spans pages {} and {}",
                first.page, stray.page
            )));
        }
        Ok(Self { units })
    }

    pub fn units(&self) -> &'a [TextUnit] {
        self.units
    }

    pub fn page(&self) -> u32 {
        self.units[0].page
    }

    /// Number of member units (always at least one).
    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Union of the member bounding boxes.
    pub fn bbox(&self) -> BoundingBox {
        self.units[1..]
            .iter()
            .fold(self.units[0].bbox, |acc, u| acc.union(&u.bbox))
    }

    /// Member texts joined with [`SEGMENT_TEXT_SEPARATOR`], in reading order.
    pub fn text(&self) -> String {
        self.units
            .iter()
            .map(|u| u.text.as_str())
            .collect::<Vec<_>>()
            .join(SEGMENT_TEXT_SEPARATOR)
    }
}

// ---------------------------------------------------------------------------
// Detection results
// ---------------------------------------------------------------------------

/// Which detector produced a [`DetectionResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionMethod {
    /// Calibrated perplexity under a single causal language model.
    Simple,
    /// Conditional probability curvature (Fast-DetectGPT).
    Curvature,
}

impl fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Simple => write!(f, "simple"),
            Self::Curvature => write!(f, "curvature"),
        }
    }
}

impl std::str::FromStr for DetectionMethod {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "simple" | "perplexity" => Ok(Self::Simple),
            "curvature" | "fast-detect-gpt" | "fastdetectgpt" => Ok(Self::Curvature),
            _ => Err(format!("unknown detector: {s}")),
        }
    }
}

/// Why a segment carries no score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnscoredReason {
    /// Trimmed text shorter than the configured minimum length.
    TooShort,
    /// Tokenization left nothing to predict.
    TooFewTokens,
    /// Scoring exceeded the per-segment timeout.
    Timeout,
    /// Inference failed for this segment.
    Failed,
}

impl fmt::Display for UnscoredReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooShort => write!(f, "too_short"),
            Self::TooFewTokens => write!(f, "too_few_tokens"),
            Self::Timeout => write!(f, "timeout"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Raw statistic behind a score, kept for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RawStatistic {
    Perplexity {
        perplexity: f64,
        mean_log_likelihood: f64,
        tokens: usize,
    },
    Curvature {
        z: f64,
        log_likelihood: f64,
        sample_mean: f64,
        sample_std: f64,
        samples: usize,
        tokens: usize,
    },
}

/// Outcome of scoring one segment. Never mutated; re-scoring yields a new one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    score: Option<f64>,
    method: DetectionMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    statistic: Option<RawStatistic>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    unscored_reason: Option<UnscoredReason>,
}

impl DetectionResult {
    /// A scored result. The score is clamped into `[0, 1]`.
    pub fn scored(method: DetectionMethod, score: f64, statistic: RawStatistic) -> Self {
        Self {
            score: Some(score.clamp(0.0, 1.0)),
            method,
            statistic: Some(statistic),
            unscored_reason: None,
        }
    }

    pub fn unscored(method: DetectionMethod, reason: UnscoredReason) -> Self {
        Self {
            score: None,
            method,
            statistic: None,
            unscored_reason: Some(reason),
        }
    }

    pub fn score(&self) -> Option<f64> {
        self.score
    }

    pub fn method(&self) -> DetectionMethod {
        self.method
    }

    pub fn statistic(&self) -> Option<&RawStatistic> {
        self.statistic.as_ref()
    }

    pub fn unscored_reason(&self) -> Option<UnscoredReason> {
        self.unscored_reason
    }

    pub fn is_scored(&self) -> bool {
        self.score.is_some()
    }
}

/// Coarse interpretation of a score, used for legend labels and summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreBand {
    /// Score below 0.3.
    Human,
    /// Score in `[0.3, 0.7]`.
    Mixed,
    /// Score above 0.7.
    AiGenerated,
}

impl ScoreBand {
    pub const HUMAN_BELOW: f64 = 0.3;
    pub const AI_ABOVE: f64 = 0.7;

    #[must_use]
    pub fn of(score: f64) -> Self {
        if score < Self::HUMAN_BELOW {
            Self::Human
        } else if score > Self::AI_ABOVE {
            Self::AiGenerated
        } else {
            Self::Mixed
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Human => "Human",
            Self::Mixed => "Mixed",
            Self::AiGenerated => "AI-generated",
        }
    }
}

impl fmt::Display for ScoreBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ---------------------------------------------------------------------------
// Colors
// ---------------------------------------------------------------------------

/// RGBA color with every channel in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rgba {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Rgba {
    pub const TRANSPARENT: Rgba = Rgba::new(0.0, 0.0, 0.0, 0.0);

    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub fn is_transparent(&self) -> bool {
        self.a == 0.0
    }

    /// 8-bit channel values, rounded.
    pub fn to_rgba8(&self) -> [u8; 4] {
        let q = |c: f32| (c.clamp(0.0, 1.0) * 255.0).round() as u8;
        [q(self.r), q(self.g), q(self.b), q(self.a)]
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Top-level configuration, loadable from YAML. Every field has a default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AitintConfig {
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub merge: MergeConfig,
    #[serde(default)]
    pub overlay: OverlayConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AitintConfig {
    /// Check cross-field constraints that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`AitintError::Config`] describing the first violation found.
    pub fn validate(&self) -> Result<()> {
        if self.merge.window == 0 {
            return Err(AitintError::Config(
                "merge.window must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.overlay.opacity) {
            return Err(AitintError::Config(format!(
                "overlay.opacity must be within [0, 1], got {}",
                self.overlay.opacity
            )));
        }
        if self.overlay.legend_steps == 0 {
            return Err(AitintError::Config(
                "overlay.legend_steps must be at least 1".to_string(),
            ));
        }
        if self.scoring.concurrency == 0 {
            return Err(AitintError::Config(
                "scoring.concurrency must be at least 1".to_string(),
            ));
        }
        if self.scoring.segment_timeout_ms == 0 {
            return Err(AitintError::Config(
                "scoring.segment_timeout_ms must be positive".to_string(),
            ));
        }
        self.detector.validate()
    }
}

/// Language model and detector settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// HuggingFace model ID or local directory of the scoring model.
    #[serde(default = "default_model_id")]
    pub model_id: String,
    /// Sampling model for the curvature detector; defaults to the scoring model.
    #[serde(default)]
    pub sampling_model_id: Option<String>,
    /// Optional cache directory for downloaded model files.
    #[serde(default)]
    pub cache_dir: Option<String>,
    #[serde(default = "default_detector_kind")]
    pub kind: DetectionMethod,
    /// Minimum trimmed character count for a segment to be scored.
    #[serde(default = "default_min_text_length")]
    pub min_text_length: usize,
    /// Inputs are truncated to this many tokens.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    /// Number of sampled variants (curvature only).
    #[serde(default = "default_sample_count")]
    pub sample_count: usize,
    /// Seed for variant sampling (curvature only).
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default)]
    pub perplexity: PerplexityCalibration,
    #[serde(default)]
    pub curvature: CurvatureCalibration,
}

impl DetectorConfig {
    fn validate(&self) -> Result<()> {
        if self.model_id.trim().is_empty() {
            return Err(AitintError::Config(
                "detector.model_id must not be empty".to_string(),
            ));
        }
        if self.max_tokens < 2 {
            return Err(AitintError::Config(
                "detector.max_tokens must be at least 2".to_string(),
            ));
        }
        if self.kind == DetectionMethod::Curvature && self.sample_count < 2 {
            return Err(AitintError::Config(format!(
                "detector.sample_count must be at least 2, got {}",
                self.sample_count
            )));
        }
        self.perplexity.validate()?;
        self.curvature.validate()
    }

    /// The model used to draw curvature samples.
    pub fn sampling_model_id(&self) -> &str {
        self.sampling_model_id.as_deref().unwrap_or(&self.model_id)
    }
}

fn default_model_id() -> String {
    "Qwen/Qwen2.5-0.5B".to_string()
}

fn default_detector_kind() -> DetectionMethod {
    DetectionMethod::Simple
}

fn default_min_text_length() -> usize {
    10
}

fn default_max_tokens() -> usize {
    512
}

fn default_sample_count() -> usize {
    100
}

fn default_seed() -> u64 {
    42
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model_id: default_model_id(),
            sampling_model_id: None,
            cache_dir: None,
            kind: default_detector_kind(),
            min_text_length: default_min_text_length(),
            max_tokens: default_max_tokens(),
            sample_count: default_sample_count(),
            seed: default_seed(),
            perplexity: PerplexityCalibration::default(),
            curvature: CurvatureCalibration::default(),
        }
    }
}

/// Logistic calibration of log-perplexity into a score.
///
/// `score = 1 / (1 + exp((ln(ppl) - center) / scale))`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerplexityCalibration {
    /// Log-perplexity mapped to 0.5.
    #[serde(default = "default_perplexity_center")]
    pub center: f64,
    /// Width of the logistic transition, in log-perplexity units.
    #[serde(default = "default_perplexity_scale")]
    pub scale: f64,
}

impl PerplexityCalibration {
    fn validate(&self) -> Result<()> {
        if !self.center.is_finite() {
            return Err(AitintError::Config(
                "detector.perplexity.center must be finite".to_string(),
            ));
        }
        check_scale("detector.perplexity.scale", self.scale)
    }
}

fn default_perplexity_center() -> f64 {
    // AI text tends to sit around 10-50, human text around 50-200.
    50f64.ln()
}

fn default_perplexity_scale() -> f64 {
    0.5
}

impl Default for PerplexityCalibration {
    fn default() -> Self {
        Self {
            center: default_perplexity_center(),
            scale: default_perplexity_scale(),
        }
    }
}

/// Logistic calibration of the curvature z-statistic, anchored at z = 0 ↦ 0.5.
///
/// `score = 1 / (1 + exp(-z / scale))`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurvatureCalibration {
    #[serde(default = "default_curvature_scale")]
    pub scale: f64,
}

impl CurvatureCalibration {
    fn validate(&self) -> Result<()> {
        check_scale("detector.curvature.scale", self.scale)
    }
}

fn default_curvature_scale() -> f64 {
    1.0
}

impl Default for CurvatureCalibration {
    fn default() -> Self {
        Self {
            scale: default_curvature_scale(),
        }
    }
}

fn check_scale(name: &str, scale: f64) -> Result<()> {
    if scale.is_finite() && scale > 0.0 {
        Ok(())
    } else {
        Err(AitintError::Config(format!(
            "{name} must be finite and positive, got {scale}"
        )))
    }
}

/// Box merging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeConfig {
    /// Units per merged segment; 1 disables merging.
    #[serde(default = "default_merge_window")]
    pub window: usize,
}

fn default_merge_window() -> usize {
    5
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            window: default_merge_window(),
        }
    }
}

/// Overlay and legend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverlayConfig {
    /// Alpha applied to scored overlays.
    #[serde(default = "default_opacity")]
    pub opacity: f32,
    #[serde(default)]
    pub emit_legend: bool,
    /// Legend has `legend_steps + 1` swatches from 0.0 to 1.0.
    #[serde(default = "default_legend_steps")]
    pub legend_steps: usize,
}

fn default_opacity() -> f32 {
    0.3
}

fn default_legend_steps() -> usize {
    10
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            opacity: default_opacity(),
            emit_legend: false,
            legend_steps: default_legend_steps(),
        }
    }
}

/// Concurrency and per-segment timeout for scoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Maximum segments scored at once.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Per-segment scoring deadline in milliseconds.
    #[serde(default = "default_segment_timeout_ms")]
    pub segment_timeout_ms: u64,
}

fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn default_segment_timeout_ms() -> u64 {
    60_000
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            segment_timeout_ms: default_segment_timeout_ms(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format: `text` (human-readable) or `json` (structured).
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Core error types.
#[derive(thiserror::Error, Debug)]
pub enum AitintError {
    /// Invalid configuration value.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed input that violates a data-model contract.
    #[error("Contract violation: {0}")]
    Contract(String),

    /// Model or tokenizer could not be loaded.
    #[error("Model load error: {0}")]
    Model(String),

    /// Tokenization or forward-pass failure while scoring.
    #[error("Inference error: {0}")]
    Inference(String),

    /// Serialization / deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience alias for `std::result::Result<T, AitintError>`.
pub type Result<T> = std::result::Result<T, AitintError>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
