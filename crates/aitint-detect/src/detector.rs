//! The detector capability: `score(text) -> DetectionResult`.
//!
//! [`Detector`] is a closed set of variants chosen at configuration time.
//! Both variants share the same short-text exclusion and token truncation
//! rules, implemented once here.

use std::sync::Arc;

use aitint_core::{DetectionMethod, DetectionResult, DetectorConfig, Result, UnscoredReason};

use crate::curvature::CurvatureDetector;
use crate::model::{CandleLanguageModel, LanguageModel, ModelSource};
use crate::simple::SimpleDetector;

/// A configured detector.
pub enum Detector {
    Simple(SimpleDetector),
    Curvature(CurvatureDetector),
}

impl Detector {
    /// Build a detector around already-loaded models.
    ///
    /// `sampling` is only used by the curvature variant; `None` samples
    /// from the scoring model.
    ///
    /// # Errors
    ///
    /// Propagates [`CurvatureDetector::new`] configuration errors.
    pub fn from_models(
        config: &DetectorConfig,
        scoring: Arc<dyn LanguageModel>,
        sampling: Option<Arc<dyn LanguageModel>>,
    ) -> Result<Self> {
        match config.kind {
            DetectionMethod::Simple => Ok(Self::Simple(SimpleDetector::new(scoring, config))),
            DetectionMethod::Curvature => Ok(Self::Curvature(CurvatureDetector::new(
                scoring, sampling, config,
            )?)),
        }
    }

    /// Load the configured model(s) and build the detector.
    ///
    /// Model load failures are fatal: nothing is scored without weights.
    ///
    /// # Errors
    ///
    /// Returns [`aitint_core::AitintError::Model`] if a model cannot be
    /// loaded.
    pub async fn load(config: &DetectorConfig) -> Result<Self> {
        let scoring: Arc<dyn LanguageModel> = Arc::new(
            CandleLanguageModel::load(&ModelSource::new(
                config.model_id.clone(),
                config.cache_dir.clone(),
            ))
            .await?,
        );

        let sampling: Option<Arc<dyn LanguageModel>> = match config.kind {
            DetectionMethod::Curvature if config.sampling_model_id() != config.model_id => {
                tracing::info!(
                    sampling_model_id = %config.sampling_model_id(),
                    "Loading separate sampling model"
                );
                Some(Arc::new(
                    CandleLanguageModel::load(&ModelSource::new(
                        config.sampling_model_id(),
                        config.cache_dir.clone(),
                    ))
                    .await?,
                ))
            }
            _ => None,
        };

        Self::from_models(config, scoring, sampling)
    }

    /// Score one segment's text.
    ///
    /// # Errors
    ///
    /// Returns an inference error for tokenization or numeric failures;
    /// callers scoring a whole document degrade these to unscored.
    pub fn score(&self, text: &str) -> Result<DetectionResult> {
        match self {
            Self::Simple(d) => d.score(text),
            Self::Curvature(d) => d.score(text),
        }
    }

    /// Segments that can be scored at once without queueing inside a model.
    pub fn max_concurrent_passes(&self) -> usize {
        match self {
            Self::Simple(d) => d.max_concurrent_passes(),
            Self::Curvature(d) => d.max_concurrent_passes(),
        }
    }

    pub fn method(&self) -> DetectionMethod {
        match self {
            Self::Simple(_) => DetectionMethod::Simple,
            Self::Curvature(_) => DetectionMethod::Curvature,
        }
    }
}

/// Tokens ready for scoring, or the reason the text is skipped.
pub(crate) enum Prepared {
    Tokens(Vec<u32>),
    Unscored(UnscoredReason),
}

/// Apply the shared exclusion rules and truncate to `max_tokens`.
pub(crate) fn prepare_tokens(
    model: &dyn LanguageModel,
    text: &str,
    min_text_length: usize,
    max_tokens: usize,
) -> Result<Prepared> {
    if text.trim().chars().count() < min_text_length {
        return Ok(Prepared::Unscored(UnscoredReason::TooShort));
    }
    let mut tokens = model.encode(text)?;
    if tokens.len() < 2 {
        return Ok(Prepared::Unscored(UnscoredReason::TooFewTokens));
    }
    tokens.truncate(max_tokens);
    Ok(Prepared::Tokens(tokens))
}
