//! Conditional probability curvature detector (Fast-DetectGPT).
//!
//! For a text `T` the detector compares the scoring model's log-likelihood
//! of `T` with the log-likelihood of alternative texts sampled, position by
//! position, from the sampling model's own conditional distribution given
//! `T`'s prefix. Machine-generated text tends to sit well above the
//! model's expected likelihood, so
//!
//! ```text
//! z = (L0 - mean(L_samples)) / std(L_samples)
//! ```
//!
//! is large and positive for it and near zero for human text.
//!
//! Because every sampled token is conditioned on the *original* prefix, a
//! single forward pass per model yields all the distributions needed for
//! any number of samples.

use std::sync::Arc;

use aitint_core::{
    AitintError, CurvatureCalibration, DetectionMethod, DetectionResult, DetectorConfig,
    RawStatistic, Result,
};
use candle_core::Tensor;
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::calibration::curvature_score;
use crate::detector::{prepare_tokens, Prepared};
use crate::model::{observed_log_likelihoods, LanguageModel};

/// Standard deviations at or below this are treated as zero.
pub const DEGENERATE_STD: f64 = 1e-9;

/// Detector scoring text by conditional probability curvature.
pub struct CurvatureDetector {
    scoring: Arc<dyn LanguageModel>,
    /// `None` when sampling uses the scoring model.
    sampling: Option<Arc<dyn LanguageModel>>,
    calibration: CurvatureCalibration,
    min_text_length: usize,
    max_tokens: usize,
    sample_count: usize,
    seed: u64,
}

impl CurvatureDetector {
    /// Create a detector. Pass `sampling = None` to sample from the scoring model.
    ///
    /// # Errors
    ///
    /// Returns [`AitintError::Config`] if fewer than two samples are
    /// configured or the two models disagree on vocabulary size.
    pub fn new(
        scoring: Arc<dyn LanguageModel>,
        sampling: Option<Arc<dyn LanguageModel>>,
        config: &DetectorConfig,
    ) -> Result<Self> {
        if config.sample_count < 2 {
            return Err(AitintError::Config(format!(
                "curvature detector needs at least 2 samples, got {}",
                config.sample_count
            )));
        }
        if let Some(sampler) = &sampling {
            if sampler.vocab_size() != scoring.vocab_size() {
                return Err(AitintError::Config(format!(
                    "sampling model {} (vocab {}) and scoring model {} (vocab {}) must share a vocabulary",
                    sampler.id(),
                    sampler.vocab_size(),
                    scoring.id(),
                    scoring.vocab_size()
                )));
            }
        }
        Ok(Self {
            scoring,
            sampling,
            calibration: config.curvature,
            min_text_length: config.min_text_length,
            max_tokens: config.max_tokens,
            sample_count: config.sample_count,
            seed: config.seed,
        })
    }

    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    /// The tighter of the two models' limits; every score uses both.
    pub fn max_concurrent_passes(&self) -> usize {
        let scoring = self.scoring.max_concurrent_passes();
        match &self.sampling {
            Some(sampler) => scoring.min(sampler.max_concurrent_passes()),
            None => scoring,
        }
    }

    /// Score `text`. Short text comes back unscored rather than as an error.
    ///
    /// # Errors
    ///
    /// Returns [`AitintError::Inference`] on tokenization, forward-pass or
    /// sampling failures.
    pub fn score(&self, text: &str) -> Result<DetectionResult> {
        let tokens = match prepare_tokens(
            self.scoring.as_ref(),
            text,
            self.min_text_length,
            self.max_tokens,
        )? {
            Prepared::Tokens(tokens) => tokens,
            Prepared::Unscored(reason) => {
                return Ok(DetectionResult::unscored(DetectionMethod::Curvature, reason))
            }
        };

        let score_lp = self.scoring.next_token_log_probs(&tokens)?;
        let sample_lp = match &self.sampling {
            Some(sampler) => Some(sampler.next_token_log_probs(&tokens)?),
            None => None,
        };

        let observed = observed_log_likelihoods(&score_lp, &tokens)?;
        let log_likelihood = mean_f64(observed.iter().map(|&v| f64::from(v)));

        let mut rng = StdRng::seed_from_u64(self.seed);
        let samples = sampled_log_likelihoods(
            &score_lp,
            sample_lp.as_ref(),
            self.sample_count,
            &mut rng,
        )?;

        let stat = CurvatureStatistic::compute(log_likelihood, &samples);
        if !stat.z.is_finite() {
            return Err(AitintError::Inference(format!(
                "curvature statistic is not finite (L0 = {log_likelihood}, mean = {}, std = {})",
                stat.mean, stat.std
            )));
        }
        let score = curvature_score(&self.calibration, stat.z);

        tracing::debug!(
            tokens = tokens.len(),
            z = stat.z,
            log_likelihood,
            sample_mean = stat.mean,
            sample_std = stat.std,
            score,
            "Scored segment by curvature"
        );

        Ok(DetectionResult::scored(
            DetectionMethod::Curvature,
            score,
            RawStatistic::Curvature {
                z: stat.z,
                log_likelihood,
                sample_mean: stat.mean,
                sample_std: stat.std,
                samples: samples.len(),
                tokens: tokens.len(),
            },
        ))
    }
}

/// z-score of the observed likelihood against the sampled likelihoods.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurvatureStatistic {
    pub z: f64,
    pub mean: f64,
    /// Unbiased sample standard deviation.
    pub std: f64,
}

impl CurvatureStatistic {
    /// Compute the statistic. A degenerate spread (every sample equal)
    /// yields `z = 0` instead of a division by zero.
    ///
    /// ```
    /// use aitint_detect::curvature::CurvatureStatistic;
    ///
    /// let stat = CurvatureStatistic::compute(-1.0, &[-2.0, -2.0, -2.0]);
    /// assert_eq!(stat.z, 0.0);
    /// ```
    pub fn compute(observed: f64, samples: &[f64]) -> Self {
        let mean = mean_f64(samples.iter().copied());
        let std = if samples.len() < 2 {
            0.0
        } else {
            let ss: f64 = samples.iter().map(|s| (s - mean).powi(2)).sum();
            (ss / (samples.len() - 1) as f64).sqrt()
        };
        let z = if std <= DEGENERATE_STD {
            0.0
        } else {
            (observed - mean) / std
        };
        Self { z, mean, std }
    }
}

fn mean_f64(values: impl ExactSizeIterator<Item = f64>) -> f64 {
    let n = values.len();
    if n == 0 {
        return 0.0;
    }
    values.sum::<f64>() / n as f64
}

/// Mean per-token log-likelihood under `score_lp` of `count` token sequences
/// sampled row by row from `sample_lp` (or `score_lp` when `None`).
fn sampled_log_likelihoods(
    score_lp: &Tensor,
    sample_lp: Option<&Tensor>,
    count: usize,
    rng: &mut StdRng,
) -> Result<Vec<f64>> {
    let rows = score_lp
        .dim(0)
        .map_err(|e| AitintError::Inference(format!("Bad log-prob shape: {e}")))?;
    let mut totals = vec![0f64; count];

    for i in 0..rows {
        let score_row = tensor_row(score_lp, i)?;
        let sample_row = match sample_lp {
            Some(lp) => tensor_row(lp, i)?,
            None => score_row.clone(),
        };
        let dist = WeightedIndex::new(sample_row.iter().map(|lp| lp.exp()))
            .map_err(|e| AitintError::Inference(format!("Invalid sampling distribution: {e}")))?;
        for total in totals.iter_mut() {
            let token = dist.sample(rng);
            *total += f64::from(score_row[token]);
        }
    }

    let n = rows.max(1) as f64;
    Ok(totals.into_iter().map(|t| t / n).collect())
}

fn tensor_row(t: &Tensor, i: usize) -> Result<Vec<f32>> {
    t.get(i)
        .and_then(|row| row.to_vec1::<f32>())
        .map_err(|e| AitintError::Inference(format!("Failed to read log-prob row {i}: {e}")))
}
