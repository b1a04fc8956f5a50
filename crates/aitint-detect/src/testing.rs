//! Small in-memory language models for unit tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use aitint_core::{AitintError, Result};
use candle_core::{Device, Tensor};

use crate::model::LanguageModel;

/// Split into lowercase words and single punctuation characters.
pub(crate) fn word_pieces(text: &str) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        if ch.is_alphanumeric() || ch == '\'' {
            current.extend(ch.to_lowercase());
        } else {
            if !current.is_empty() {
                pieces.push(std::mem::take(&mut current));
            }
            if !ch.is_whitespace() {
                pieces.push(ch.to_string());
            }
        }
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

/// Word-level model that predicts "the same token again" with probability
/// `repeat_prob` and spreads the rest uniformly over the vocabulary.
///
/// Repetitive text is therefore much more predictable than varied text.
pub(crate) struct RepeatModel {
    vocab: HashMap<String, u32>,
    vocab_size: usize,
    repeat_prob: f32,
}

impl RepeatModel {
    /// Vocabulary is built from `corpus` plus `<unk>` and padding entries up
    /// to at least 64 tokens.
    pub(crate) fn new(corpus: &[&str], repeat_prob: f32) -> Self {
        let mut vocab = HashMap::new();
        vocab.insert("<unk>".to_string(), 0);
        for text in corpus {
            for piece in word_pieces(text) {
                let next = vocab.len() as u32;
                vocab.entry(piece).or_insert(next);
            }
        }
        let vocab_size = vocab.len().max(64);
        Self {
            vocab,
            vocab_size,
            repeat_prob,
        }
    }
}

impl LanguageModel for RepeatModel {
    fn id(&self) -> &str {
        "test/repeat"
    }

    fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        Ok(word_pieces(text)
            .into_iter()
            .map(|p| self.vocab.get(&p).copied().unwrap_or(0))
            .collect())
    }

    fn next_token_log_probs(&self, tokens: &[u32]) -> Result<Tensor> {
        let v = self.vocab_size;
        let other = ((1.0 - self.repeat_prob) / (v - 1) as f32).ln();
        let repeat = self.repeat_prob.ln();
        let rows = tokens.len() - 1;
        let mut data = vec![other; rows * v];
        for (i, &prev) in tokens[..rows].iter().enumerate() {
            data[i * v + prev as usize] = repeat;
        }
        Tensor::from_vec(data, (rows, v), &Device::Cpu)
            .map_err(|e| AitintError::Inference(e.to_string()))
    }
}

/// Every next-token distribution is uniform, so every token sequence of a
/// given length has exactly the same likelihood.
pub(crate) struct UniformModel {
    pub(crate) vocab_size: usize,
}

impl LanguageModel for UniformModel {
    fn id(&self) -> &str {
        "test/uniform"
    }

    fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        Ok(word_pieces(text)
            .iter()
            .map(|p| (p.bytes().map(u32::from).sum::<u32>()) % self.vocab_size as u32)
            .collect())
    }

    fn next_token_log_probs(&self, tokens: &[u32]) -> Result<Tensor> {
        let rows = tokens.len() - 1;
        let lp = -(self.vocab_size as f32).ln();
        Tensor::from_vec(vec![lp; rows * self.vocab_size], (rows, self.vocab_size), &Device::Cpu)
            .map_err(|e| AitintError::Inference(e.to_string()))
    }
}

/// Tokenizes fine but every forward pass fails.
pub(crate) struct FailingModel;

impl LanguageModel for FailingModel {
    fn id(&self) -> &str {
        "test/failing"
    }

    fn vocab_size(&self) -> usize {
        64
    }

    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        Ok(word_pieces(text).iter().map(|p| p.len() as u32 % 64).collect())
    }

    fn next_token_log_probs(&self, _tokens: &[u32]) -> Result<Tensor> {
        Err(AitintError::Inference("simulated allocation failure".to_string()))
    }
}

/// Delegates to an inner model after sleeping.
pub(crate) struct SlowModel<M> {
    pub(crate) inner: M,
    pub(crate) delay: Duration,
}

impl<M: LanguageModel> LanguageModel for SlowModel<M> {
    fn id(&self) -> &str {
        "test/slow"
    }

    fn vocab_size(&self) -> usize {
        self.inner.vocab_size()
    }

    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        self.inner.encode(text)
    }

    fn next_token_log_probs(&self, tokens: &[u32]) -> Result<Tensor> {
        std::thread::sleep(self.delay);
        self.inner.next_token_log_probs(tokens)
    }
}

/// Runs one pass at a time behind a mutex, like the Candle backend.
pub(crate) struct SerializedModel<M> {
    pub(crate) inner: M,
    pub(crate) delay: Duration,
    pub(crate) lock: Mutex<()>,
}

impl<M> SerializedModel<M> {
    pub(crate) fn new(inner: M, delay: Duration) -> Self {
        Self {
            inner,
            delay,
            lock: Mutex::new(()),
        }
    }
}

impl<M: LanguageModel> LanguageModel for SerializedModel<M> {
    fn id(&self) -> &str {
        "test/serialized"
    }

    fn vocab_size(&self) -> usize {
        self.inner.vocab_size()
    }

    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        self.inner.encode(text)
    }

    fn next_token_log_probs(&self, tokens: &[u32]) -> Result<Tensor> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        std::thread::sleep(self.delay);
        self.inner.next_token_log_probs(tokens)
    }

    fn max_concurrent_passes(&self) -> usize {
        1
    }
}

pub(crate) const HUMAN_PARAGRAPH: &str = "Grandma kept her buttons in a biscuit tin, \
    sorted by nothing anyone could explain, and every rainy Sunday we tipped them \
    onto the rug to argue about which coat each had fallen from.";

pub(crate) const REPETITIVE_TEXT: &str = "the the the the the.";
