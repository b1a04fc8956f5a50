//! Perplexity-based detector.
//!
//! Text that a language model finds highly predictable (low perplexity) is
//! treated as more likely machine-generated. Perplexity is
//! `exp(-mean log p(token | prefix))` under a single causal model, mapped to
//! a score through the configured [`PerplexityCalibration`].

use std::sync::Arc;

use aitint_core::{
    AitintError, DetectionMethod, DetectionResult, DetectorConfig, PerplexityCalibration,
    RawStatistic, Result,
};

use crate::calibration::perplexity_score;
use crate::detector::{prepare_tokens, Prepared};
use crate::model::{observed_log_likelihoods, LanguageModel};

/// Detector scoring text by calibrated perplexity.
pub struct SimpleDetector {
    model: Arc<dyn LanguageModel>,
    calibration: PerplexityCalibration,
    min_text_length: usize,
    max_tokens: usize,
}

impl SimpleDetector {
    pub fn new(model: Arc<dyn LanguageModel>, config: &DetectorConfig) -> Self {
        Self {
            model,
            calibration: config.perplexity,
            min_text_length: config.min_text_length,
            max_tokens: config.max_tokens,
        }
    }

    pub fn model(&self) -> &Arc<dyn LanguageModel> {
        &self.model
    }

    pub fn max_concurrent_passes(&self) -> usize {
        self.model.max_concurrent_passes()
    }

    /// Score `text`. Short text comes back unscored rather than as an error.
    ///
    /// # Errors
    ///
    /// Returns [`AitintError::Inference`] if tokenization or the forward
    /// pass fails, or the result is not a finite number.
    pub fn score(&self, text: &str) -> Result<DetectionResult> {
        let tokens = match prepare_tokens(
            self.model.as_ref(),
            text,
            self.min_text_length,
            self.max_tokens,
        )? {
            Prepared::Tokens(tokens) => tokens,
            Prepared::Unscored(reason) => {
                return Ok(DetectionResult::unscored(DetectionMethod::Simple, reason))
            }
        };

        let mean_log_likelihood = self.mean_log_likelihood(&tokens)?;
        let perplexity = (-mean_log_likelihood).exp();
        let score = perplexity_score(&self.calibration, perplexity);

        tracing::debug!(
            tokens = tokens.len(),
            perplexity,
            score,
            "Scored segment by perplexity"
        );

        Ok(DetectionResult::scored(
            DetectionMethod::Simple,
            score,
            RawStatistic::Perplexity {
                perplexity,
                mean_log_likelihood,
                tokens: tokens.len(),
            },
        ))
    }

    fn mean_log_likelihood(&self, tokens: &[u32]) -> Result<f64> {
        let log_probs = self.model.next_token_log_probs(tokens)?;
        let observed = observed_log_likelihoods(&log_probs, tokens)?;
        let mean = observed.iter().map(|&lp| f64::from(lp)).sum::<f64>() / observed.len() as f64;
        if mean.is_nan() {
            return Err(AitintError::Inference(
                "mean log-likelihood is NaN".to_string(),
            ));
        }
        Ok(mean)
    }
}
