//! Context-free backend with fixed scores.

use super::ModelBackend;
use crate::error::{LoomError, Result};

/// Backend that scores every sequence with the same distribution.
///
/// Each vocabulary entry is a string; encoding matches entries greedily
/// (longest first) against the input text. Useful for tests, benchmarks and
/// offline demos.
#[derive(Debug, Clone)]
pub struct StaticBackend {
    vocab: Vec<String>,
    scores: Vec<f32>,
}

impl StaticBackend {
    /// Create from vocabulary strings and their (unnormalized) scores.
    pub fn new<S: Into<String>>(vocab: impl IntoIterator<Item = S>, scores: Vec<f32>) -> Result<Self> {
        let vocab: Vec<String> = vocab.into_iter().map(Into::into).collect();
        if vocab.len() != scores.len() {
            return Err(LoomError::ShapeMismatch(format!(
                "{} vocabulary entries but {} scores",
                vocab.len(),
                scores.len()
            )));
        }
        if vocab.iter().any(String::is_empty) {
            return Err(LoomError::Tokenizer("empty vocabulary entry".into()));
        }
        Ok(Self { vocab, scores })
    }

    /// Create from vocabulary strings and target probabilities.
    ///
    /// Scores are the natural log of each probability, so normalizing them
    /// gives back the probabilities.
    pub fn with_probabilities<S: Into<String>>(
        vocab: impl IntoIterator<Item = S>,
        probabilities: &[f32],
    ) -> Result<Self> {
        Self::new(vocab, probabilities.iter().map(|p| p.ln()).collect())
    }

    /// The fixed score distribution.
    pub fn scores(&self) -> &[f32] {
        &self.scores
    }
}

impl ModelBackend for StaticBackend {
    fn vocab_size(&self) -> usize {
        self.vocab.len()
    }

    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        let mut ids = Vec::new();
        let mut rest = text;
        while !rest.is_empty() {
            let (id, entry) = self
                .vocab
                .iter()
                .enumerate()
                .filter(|(_, entry)| rest.starts_with(entry.as_str()))
                .max_by_key(|(_, entry)| entry.len())
                .ok_or_else(|| {
                    LoomError::Tokenizer(format!("no vocabulary entry matches {:?}", rest))
                })?;
            ids.push(id as u32);
            rest = &rest[entry.len()..];
        }
        Ok(ids)
    }

    fn decode(&self, token_ids: &[u32]) -> Result<String> {
        token_ids
            .iter()
            .map(|&id| {
                self.vocab
                    .get(id as usize)
                    .map(String::as_str)
                    .ok_or_else(|| LoomError::Tokenizer(format!("token {} out of range", id)))
            })
            .collect()
    }

    fn forward(&self, batch: &[Vec<u32>]) -> Result<Vec<Vec<f32>>> {
        Ok(vec![self.scores.clone(); batch.len()])
    }
}
