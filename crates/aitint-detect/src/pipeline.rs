//! Concurrent document scoring.
//!
//! [`ScoringPipeline`] merges a document's text units into segments, scores
//! every segment on the blocking thread pool with bounded concurrency, and
//! maps each result to an overlay color.
//!
//! A segment that times out, fails inference, or panics is reported as
//! unscored (transparent) and the run continues. Only malformed input
//! (pages out of order) aborts a run.

use std::sync::Arc;
use std::time::{Duration, Instant};

use aitint_core::{
    AitintConfig, BoundingBox, DetectionMethod, DetectionResult, MergedSegment, Result, Rgba,
    TextUnit, UnscoredReason,
};
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::color::ColorMapper;
use crate::detector::Detector;
use crate::inference_stats::{LatencyStats, LatencyTracker};
use crate::legend::{LegendGenerator, LegendSwatch};
use crate::merge::merge_units;
use crate::summary::ScoreSummary;

/// One colored rectangle for the renderer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Overlay {
    pub bbox: BoundingBox,
    pub text: String,
    /// Number of text units merged into this overlay.
    pub unit_count: usize,
    pub result: DetectionResult,
    pub color: Rgba,
}

/// Overlays for one page, in reading order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageOverlays {
    pub page: u32,
    pub overlays: Vec<Overlay>,
}

/// Everything the renderer needs for one document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentOverlay {
    pub method: DetectionMethod,
    pub pages: Vec<PageOverlays>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub legend: Option<Vec<LegendSwatch>>,
    pub summary: ScoreSummary,
}

impl DocumentOverlay {
    pub fn overlays(&self) -> impl Iterator<Item = &Overlay> {
        self.pages.iter().flat_map(|p| p.overlays.iter())
    }
}

/// Scores whole documents with a shared [`Detector`].
pub struct ScoringPipeline {
    detector: Arc<Detector>,
    mapper: ColorMapper,
    legend: Option<LegendGenerator>,
    window: usize,
    concurrency: usize,
    segment_timeout: Duration,
    latency: Arc<LatencyTracker>,
}

impl ScoringPipeline {
    /// # Errors
    ///
    /// Returns [`aitint_core::AitintError::Config`] if `config` fails
    /// validation.
    pub fn new(detector: Arc<Detector>, config: &AitintConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            mapper: ColorMapper::new(config.overlay.opacity)?,
            legend: config
                .overlay
                .emit_legend
                .then(|| LegendGenerator::new(config.overlay.legend_steps)),
            window: config.merge.window,
            concurrency: config
                .scoring
                .concurrency
                .min(detector.max_concurrent_passes()),
            segment_timeout: Duration::from_millis(config.scoring.segment_timeout_ms),
            latency: Arc::new(LatencyTracker::default()),
            detector,
        })
    }

    /// Segments scored at once: the configured concurrency, capped by what
    /// the detector's models can run in parallel.
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Latency of segments scored so far by this pipeline.
    pub fn latency_stats(&self) -> Option<LatencyStats> {
        self.latency.stats()
    }

    /// Score a document.
    ///
    /// # Errors
    ///
    /// Returns [`aitint_core::AitintError::Contract`] if `units` are not
    /// ordered by page.
    /// Per-segment failures never surface here.
    pub async fn run(&self, units: &[TextUnit]) -> Result<DocumentOverlay> {
        let segments = merge_units(units, self.window)?;
        let semaphore = Arc::new(Semaphore::new(self.concurrency));

        let handles: Vec<_> = segments
            .iter()
            .enumerate()
            .map(|(index, segment)| {
                tokio::spawn(score_segment(
                    Arc::clone(&self.detector),
                    Arc::clone(&semaphore),
                    Arc::clone(&self.latency),
                    segment.text(),
                    self.segment_timeout,
                    index,
                ))
            })
            .collect();

        let method = self.detector.method();
        let mut results = Vec::with_capacity(handles.len());
        for (index, handle) in handles.into_iter().enumerate() {
            let result = handle.await.unwrap_or_else(|e| {
                warn!(segment = index, error = %e, "Scoring task aborted");
                DetectionResult::unscored(method, UnscoredReason::Failed)
            });
            results.push(result);
        }

        let summary = ScoreSummary::from_results(&results);
        let pages = self.group_pages(&segments, results);

        info!(
            method = %method,
            units = units.len(),
            segments = summary.segments,
            scored = summary.scored,
            unscored = summary.unscored,
            mean_score = summary.mean,
            "Document scored"
        );

        Ok(DocumentOverlay {
            method,
            pages,
            legend: self.legend.map(|l| l.swatches()),
            summary,
        })
    }

    fn group_pages(
        &self,
        segments: &[MergedSegment<'_>],
        results: Vec<DetectionResult>,
    ) -> Vec<PageOverlays> {
        let mut pages: Vec<PageOverlays> = Vec::new();
        for (segment, result) in segments.iter().zip(results) {
            let overlay = Overlay {
                bbox: segment.bbox(),
                text: segment.text(),
                unit_count: segment.len(),
                color: self.mapper.color_for(&result),
                result,
            };
            match pages.last_mut() {
                Some(page) if page.page == segment.page() => page.overlays.push(overlay),
                _ => pages.push(PageOverlays {
                    page: segment.page(),
                    overlays: vec![overlay],
                }),
            }
        }
        pages
    }
}

/// Score one segment under the shared concurrency limit and its own deadline.
///
/// The deadline starts once the permit is held. Permits never exceed the
/// model's own parallelism, so the deadline covers inference rather than
/// queueing. The permit moves into the blocking task, so a segment that has
/// timed out keeps its slot until inference actually returns.
async fn score_segment(
    detector: Arc<Detector>,
    semaphore: Arc<Semaphore>,
    latency: Arc<LatencyTracker>,
    text: String,
    timeout: Duration,
    index: usize,
) -> DetectionResult {
    let method = detector.method();
    let Ok(permit) = semaphore.acquire_owned().await else {
        return DetectionResult::unscored(method, UnscoredReason::Failed);
    };

    let task = tokio::task::spawn_blocking(move || {
        let _permit = permit;
        let started = Instant::now();
        let result = detector.score(&text);
        latency.record(started.elapsed());
        result
    });

    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(Ok(result))) => {
            debug!(segment = index, score = result.score(), "Segment scored");
            result
        }
        Ok(Ok(Err(e))) => {
            warn!(segment = index, error = %e, "Segment scoring failed, leaving unscored");
            DetectionResult::unscored(method, UnscoredReason::Failed)
        }
        Ok(Err(e)) => {
            warn!(segment = index, error = %e, "Segment scoring panicked, leaving unscored");
            DetectionResult::unscored(method, UnscoredReason::Failed)
        }
        Err(_) => {
            warn!(
                segment = index,
                timeout_ms = timeout.as_millis() as u64,
                "Segment scoring timed out, leaving unscored"
            );
            DetectionResult::unscored(method, UnscoredReason::Timeout)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LanguageModel;
    use crate::testing::{
        FailingModel, RepeatModel, SerializedModel, SlowModel, UniformModel, HUMAN_PARAGRAPH,
        REPETITIVE_TEXT,
    };
    use aitint_core::{AitintError, DetectorConfig};

    fn unit(text: &str, page: u32, line: usize) -> TextUnit {
        let y = line as f64 * 12.0;
        TextUnit::new(text, BoundingBox::new(10.0, y, 200.0, y + 10.0).unwrap(), page)
    }

    fn config(window: usize) -> AitintConfig {
        let mut config = AitintConfig::default();
        config.merge.window = window;
        config.scoring.concurrency = 2;
        config
    }

    fn pipeline_with(model: Arc<dyn LanguageModel>, config: &AitintConfig) -> ScoringPipeline {
        let detector = Detector::from_models(&config.detector, model, None).unwrap();
        ScoringPipeline::new(Arc::new(detector), config).unwrap()
    }

    fn repeat_model() -> Arc<dyn LanguageModel> {
        Arc::new(RepeatModel::new(&[HUMAN_PARAGRAPH, REPETITIVE_TEXT], 0.6))
    }

    #[tokio::test]
    async fn test_empty_input_yields_no_overlays() {
        let pipeline = pipeline_with(repeat_model(), &config(5));
        let doc = pipeline.run(&[]).await.unwrap();
        assert!(doc.pages.is_empty());
        assert_eq!(doc.overlays().count(), 0);
        assert_eq!(doc.summary.segments, 0);
        assert!(doc.legend.is_none());
        assert!(pipeline.latency_stats().is_none());
    }

    #[tokio::test]
    async fn test_three_units_window_two() {
        let units = vec![
            unit("the the the the", 0, 0),
            unit("the the the the", 0, 1),
            unit("the the the the the.", 0, 2),
        ];
        let pipeline = pipeline_with(repeat_model(), &config(2));
        let doc = pipeline.run(&units).await.unwrap();

        assert_eq!(doc.pages.len(), 1);
        let overlays = &doc.pages[0].overlays;
        assert_eq!(overlays.len(), 2);
        assert_eq!(overlays[0].unit_count, 2);
        assert_eq!(overlays[1].unit_count, 1);
        assert_eq!(overlays[0].text, "the the the the the the the the");
        assert_eq!(
            overlays[0].bbox,
            units[0].bbox().union(units[1].bbox())
        );
        assert!(overlays.iter().all(|o| o.result.is_scored()));
        assert!(overlays.iter().all(|o| (o.color.a - 0.3).abs() < 1e-6));
        assert_eq!(pipeline.latency_stats().unwrap().count, 2);
    }

    #[tokio::test]
    async fn test_pages_never_merge() {
        let units = vec![
            unit("Grandma kept her buttons", 0, 0),
            unit("in a biscuit tin", 0, 1),
            unit("sorted by nothing anyone", 1, 0),
            unit("could explain", 1, 1),
        ];
        let pipeline = pipeline_with(repeat_model(), &config(5));
        let doc = pipeline.run(&units).await.unwrap();

        let pages: Vec<u32> = doc.pages.iter().map(|p| p.page).collect();
        assert_eq!(pages, vec![0, 1]);
        assert!(doc.pages.iter().all(|p| p.overlays.len() == 1));
        assert_eq!(doc.summary.segments, 2);
    }

    #[tokio::test]
    async fn test_short_segment_is_transparent() {
        let pipeline = pipeline_with(repeat_model(), &config(1));
        let doc = pipeline.run(&[unit("Hi.", 0, 0)]).await.unwrap();
        let overlay = &doc.pages[0].overlays[0];
        assert_eq!(overlay.result.score(), None);
        assert_eq!(overlay.result.unscored_reason(), Some(UnscoredReason::TooShort));
        assert!(overlay.color.is_transparent());
        assert_eq!(doc.summary.unscored, 1);
    }

    #[tokio::test]
    async fn test_repetitive_segment_colored_redder() {
        let units = vec![unit(REPETITIVE_TEXT, 0, 0), unit(HUMAN_PARAGRAPH, 0, 1)];
        let pipeline = pipeline_with(repeat_model(), &config(1));
        let doc = pipeline.run(&units).await.unwrap();
        let overlays = &doc.pages[0].overlays;
        let repetitive = overlays[0].result.score().unwrap();
        let human = overlays[1].result.score().unwrap();
        assert!(repetitive > human);
        // Redder means less green.
        assert!(overlays[0].color.g < overlays[1].color.g);
    }

    #[tokio::test]
    async fn test_inference_failure_degrades_segment() {
        let pipeline = pipeline_with(Arc::new(FailingModel), &config(1));
        let units = vec![unit(HUMAN_PARAGRAPH, 0, 0), unit("Hi.", 0, 1)];
        let doc = pipeline.run(&units).await.unwrap();
        let overlays = &doc.pages[0].overlays;
        assert_eq!(overlays[0].result.unscored_reason(), Some(UnscoredReason::Failed));
        assert!(overlays[0].color.is_transparent());
        assert_eq!(overlays[1].result.unscored_reason(), Some(UnscoredReason::TooShort));
    }

    #[tokio::test]
    async fn test_timeout_degrades_segment() {
        let model = SlowModel {
            inner: UniformModel { vocab_size: 32 },
            delay: Duration::from_millis(300),
        };
        let mut config = config(1);
        config.scoring.segment_timeout_ms = 20;
        let pipeline = pipeline_with(Arc::new(model), &config);

        let doc = pipeline.run(&[unit(HUMAN_PARAGRAPH, 0, 0)]).await.unwrap();
        let overlay = &doc.pages[0].overlays[0];
        assert_eq!(overlay.result.unscored_reason(), Some(UnscoredReason::Timeout));
        assert!(overlay.color.is_transparent());
    }

    #[tokio::test]
    async fn test_queueing_behind_serialized_model_does_not_time_out() {
        let model = SerializedModel::new(
            UniformModel { vocab_size: 32 },
            Duration::from_millis(100),
        );
        let mut config = config(1);
        config.scoring.concurrency = 8;
        config.scoring.segment_timeout_ms = 350;
        let pipeline = pipeline_with(Arc::new(model), &config);
        assert_eq!(pipeline.concurrency(), 1);

        let units: Vec<TextUnit> = (0..8).map(|i| unit(HUMAN_PARAGRAPH, 0, i)).collect();
        let doc = pipeline.run(&units).await.unwrap();

        let reasons: Vec<_> = doc
            .overlays()
            .map(|o| o.result.unscored_reason())
            .collect();
        assert_eq!(reasons, vec![None; 8]);
        assert_eq!(doc.summary.scored, 8);
    }

    #[test]
    fn test_concurrency_unbounded_model_keeps_configured_limit() {
        let mut config = config(1);
        config.scoring.concurrency = 6;
        let pipeline = pipeline_with(repeat_model(), &config);
        assert_eq!(pipeline.concurrency(), 6);
    }

    #[tokio::test]
    async fn test_out_of_order_pages_rejected() {
        let pipeline = pipeline_with(repeat_model(), &config(2));
        let units = vec![unit(HUMAN_PARAGRAPH, 1, 0), unit(HUMAN_PARAGRAPH, 0, 0)];
        let err = pipeline.run(&units).await.unwrap_err();
        assert!(matches!(err, AitintError::Contract(_)));
    }

    #[tokio::test]
    async fn test_legend_emitted_when_requested() {
        let mut config = config(5);
        config.overlay.emit_legend = true;
        let pipeline = pipeline_with(repeat_model(), &config);
        let doc = pipeline.run(&[]).await.unwrap();
        let legend = doc.legend.unwrap();
        assert_eq!(legend.len(), 11);
        assert_eq!(legend[0].label, "0.0 - Human");
    }

    #[tokio::test]
    async fn test_curvature_pipeline_on_uniform_model_is_midpoint() {
        let mut config = config(1);
        config.detector = DetectorConfig {
            kind: DetectionMethod::Curvature,
            sample_count: 8,
            ..DetectorConfig::default()
        };
        let pipeline = pipeline_with(Arc::new(UniformModel { vocab_size: 32 }), &config);
        let doc = pipeline.run(&[unit(HUMAN_PARAGRAPH, 0, 0)]).await.unwrap();
        assert_eq!(doc.method, DetectionMethod::Curvature);
        let score = doc.pages[0].overlays[0].result.score().unwrap();
        assert!((score - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = config(5);
        config.overlay.opacity = 2.0;
        let detector =
            Detector::from_models(&config.detector, repeat_model(), None).unwrap();
        assert!(ScoringPipeline::new(Arc::new(detector), &config).is_err());
    }
}
