//! Candle-backed executor.
//!
//! [`CandleBackend`] pairs a [`Tokenizer`] with any [`LogitsModel`]: it stacks
//! a batch of equal-length sequences into a `[batch, seq]` tensor, runs the
//! model, and keeps the scores at the final position.

use super::{ModelBackend, Tokenizer, WeightLoader};
use crate::error::{LoomError, Result};
use candle_core::{DType, Device, Tensor};
use candle_nn::{Embedding, Module};
use std::path::Path;

/// A model mapping token ids to next-token logits.
pub trait LogitsModel: Send + Sync {
    /// Size of the logits axis.
    fn vocab_size(&self) -> usize;

    /// Run the model over `input_ids` (`[batch, seq]`, u32).
    ///
    /// Returns `[batch, positions, vocab]` logits. Only the final position is
    /// read, so a model may return just that one.
    fn forward(&self, input_ids: &Tensor) -> Result<Tensor>;
}

/// Last-token logits table: row `t` holds the scores that follow token `t`.
#[derive(Debug, Clone)]
pub struct BigramModel {
    table: Embedding,
    vocab_size: usize,
}

impl BigramModel {
    /// Name of the `[vocab, vocab]` tensor in the weights file.
    pub const TENSOR_NAME: &'static str = "logits";

    /// Create from a square `[vocab, vocab]` logits table.
    pub fn new(table: Tensor) -> Result<Self> {
        let (rows, cols) = table.dims2()?;
        if rows != cols {
            return Err(LoomError::ShapeMismatch(format!(
                "bigram table must be square, got [{}, {}]",
                rows, cols
            )));
        }
        let table = table.to_dtype(DType::F32)?;
        Ok(Self {
            table: Embedding::new(table, cols),
            vocab_size: cols,
        })
    }

    /// Load the table from the safetensors files in a model directory.
    pub fn from_dir(dir: &Path, device: &Device) -> Result<Self> {
        let loader = WeightLoader::from_dir(dir, device)?;
        Self::new(loader.get_tensor(Self::TENSOR_NAME)?)
    }
}

impl LogitsModel for BigramModel {
    fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    fn forward(&self, input_ids: &Tensor) -> Result<Tensor> {
        let (_batch, seq_len) = input_ids.dims2()?;
        if seq_len == 0 {
            return Err(LoomError::ShapeMismatch(
                "bigram model needs at least one token per sequence".into(),
            ));
        }
        let last = input_ids.narrow(1, seq_len - 1, 1)?;
        Ok(self.table.forward(&last)?)
    }
}

/// [`ModelBackend`] over a HuggingFace tokenizer and a candle model.
pub struct CandleBackend<M> {
    tokenizer: Tokenizer,
    model: M,
    device: Device,
    add_bos: bool,
}

impl<M: LogitsModel> CandleBackend<M> {
    /// Create a backend. Prompts are encoded without a BOS token.
    pub fn new(tokenizer: Tokenizer, model: M, device: Device) -> Self {
        Self {
            tokenizer,
            model,
            device,
            add_bos: false,
        }
    }

    /// Prepend the tokenizer's BOS token when encoding prompts.
    pub fn with_bos(mut self, add_bos: bool) -> Self {
        self.add_bos = add_bos;
        self
    }

    /// Get the tokenizer.
    pub fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    /// Get device.
    pub fn device(&self) -> &Device {
        &self.device
    }
}

impl CandleBackend<BigramModel> {
    /// Load `tokenizer.json` and bigram weights from one directory.
    pub fn bigram_from_dir(dir: &Path, device: Device) -> Result<Self> {
        let tokenizer = Tokenizer::from_dir(dir)?;
        let model = BigramModel::from_dir(dir, &device)?;
        Ok(Self::new(tokenizer, model, device))
    }
}

impl<M: LogitsModel> ModelBackend for CandleBackend<M> {
    fn vocab_size(&self) -> usize {
        self.model.vocab_size()
    }

    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        self.tokenizer.encode(text, self.add_bos)
    }

    fn decode(&self, token_ids: &[u32]) -> Result<String> {
        self.tokenizer.decode(token_ids)
    }

    fn forward(&self, batch: &[Vec<u32>]) -> Result<Vec<Vec<f32>>> {
        let Some(first) = batch.first() else {
            return Ok(Vec::new());
        };
        let seq_len = first.len();
        if let Some(bad) = batch.iter().find(|seq| seq.len() != seq_len) {
            return Err(LoomError::ShapeMismatch(format!(
                "batch mixes sequence lengths {} and {}",
                seq_len,
                bad.len()
            )));
        }

        let flat: Vec<u32> = batch.iter().flatten().copied().collect();
        let input_ids = Tensor::from_vec(flat, (batch.len(), seq_len), &self.device)?;

        let logits = self.model.forward(&input_ids)?;
        let (rows, positions, vocab) = logits.dims3()?;
        if rows != batch.len() || vocab != self.vocab_size() || positions == 0 {
            return Err(LoomError::Backend(format!(
                "model returned logits of shape [{}, {}, {}] for a batch of {}",
                rows,
                positions,
                vocab,
                batch.len()
            )));
        }

        let last = logits
            .narrow(1, positions - 1, 1)?
            .squeeze(1)?
            .to_dtype(DType::F32)?;
        Ok(last.to_vec2::<f32>()?)
    }
}

impl<M> std::fmt::Debug for CandleBackend<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CandleBackend")
            .field("tokenizer", &self.tokenizer)
            .field("device", &self.device)
            .field("add_bos", &self.add_bos)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const WORD_LEVEL_TOKENIZER: &str = r#"{
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": [],
        "normalizer": null,
        "pre_tokenizer": { "type": "Whitespace" },
        "post_processor": null,
        "decoder": null,
        "model": {
            "type": "WordLevel",
            "vocab": { "<unk>": 0, "the": 1, "sky": 2, "is": 3 },
            "unk_token": "<unk>"
        }
    }"#;

    /// Row t favours token (t + 1) % 4.
    fn cyclic_table() -> Tensor {
        let mut rows = vec![0f32; 16];
        for t in 0..4 {
            rows[t * 4 + (t + 1) % 4] = 3.0;
        }
        Tensor::from_vec(rows, (4, 4), &Device::Cpu).unwrap()
    }

    fn test_backend() -> (tempfile::TempDir, CandleBackend<BigramModel>) {
        let dir = tempfile::tempdir().unwrap();
        let mut file = std::fs::File::create(dir.path().join("tokenizer.json")).unwrap();
        file.write_all(WORD_LEVEL_TOKENIZER.as_bytes()).unwrap();

        let tokenizer = Tokenizer::from_dir(dir.path()).unwrap();
        let model = BigramModel::new(cyclic_table()).unwrap();
        (dir, CandleBackend::new(tokenizer, model, Device::Cpu))
    }

    #[test]
    fn bigram_rejects_non_square_table() {
        let table = Tensor::zeros((3, 4), DType::F32, &Device::Cpu).unwrap();
        assert!(BigramModel::new(table).is_err());
    }

    #[test]
    fn bigram_reads_last_token_row() {
        let model = BigramModel::new(cyclic_table()).unwrap();
        let ids = Tensor::new(&[[0u32, 2], [1, 3]], &Device::Cpu).unwrap();

        let logits = model.forward(&ids).unwrap();

        assert_eq!(logits.dims(), &[2, 1, 4]);
        let rows = logits.squeeze(1).unwrap().to_vec2::<f32>().unwrap();
        assert_eq!(rows[0], vec![0.0, 0.0, 0.0, 3.0]);
        assert_eq!(rows[1], vec![3.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn backend_forward_returns_one_row_per_sequence() {
        let (_dir, backend) = test_backend();

        let scores = backend.forward(&[vec![1, 2], vec![2, 3]]).unwrap();

        assert_eq!(scores.len(), 2);
        assert_eq!(scores[0], vec![0.0, 0.0, 0.0, 3.0]);
        assert_eq!(scores[1], vec![3.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn backend_forward_rejects_ragged_batch() {
        let (_dir, backend) = test_backend();

        let result = backend.forward(&[vec![1, 2], vec![2]]);
        assert!(matches!(result, Err(LoomError::ShapeMismatch(_))));
    }

    #[test]
    fn backend_round_trips_words() {
        let (_dir, backend) = test_backend();

        let ids = backend.encode("the sky").unwrap();

        assert_eq!(ids, vec![1, 2]);
        assert_eq!(backend.decode(&[3]).unwrap(), "is");
        assert_eq!(backend.vocab_size(), 4);
    }

    #[test]
    fn bigram_loads_from_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut tensors = std::collections::HashMap::new();
        tensors.insert(BigramModel::TENSOR_NAME.to_string(), cyclic_table());
        candle_core::safetensors::save(&tensors, dir.path().join("bigram.safetensors")).unwrap();

        let model = BigramModel::from_dir(dir.path(), &Device::Cpu).unwrap();

        assert_eq!(model.vocab_size(), 4);
    }
}
