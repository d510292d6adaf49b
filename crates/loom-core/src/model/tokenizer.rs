//! Tokenizer integration for text-to-token and token-to-text conversion.
//!
//! Wraps the HuggingFace tokenizers library.

use crate::error::{LoomError, Result};
use std::path::Path;
use tokenizers::Tokenizer as HfTokenizer;

/// Tokenizer for encoding prompts and decoding branch tokens.
#[derive(Clone)]
pub struct Tokenizer {
    /// Underlying HuggingFace tokenizer.
    inner: HfTokenizer,
    /// BOS token ID.
    bos_token_id: Option<u32>,
}

impl Tokenizer {
    /// Load a tokenizer from a tokenizer.json file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let inner = HfTokenizer::from_file(path.as_ref()).map_err(|e| {
            LoomError::Tokenizer(format!(
                "failed to load {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        let bos_token_id = inner
            .token_to_id("<s>")
            .or_else(|| inner.token_to_id("<|begin_of_text|>"));
        Ok(Self {
            inner,
            bos_token_id,
        })
    }

    /// Load a tokenizer from a model directory.
    ///
    /// Looks for tokenizer.json in the directory.
    pub fn from_dir<P: AsRef<Path>>(model_dir: P) -> Result<Self> {
        let tokenizer_path = model_dir.as_ref().join("tokenizer.json");
        if !tokenizer_path.exists() {
            return Err(LoomError::Tokenizer(format!(
                "tokenizer.json not found in {}",
                model_dir.as_ref().display()
            )));
        }
        Self::from_file(tokenizer_path)
    }

    /// Encode text to token IDs, optionally prepending BOS.
    pub fn encode(&self, text: &str, add_bos: bool) -> Result<Vec<u32>> {
        let encoding = self
            .inner
            .encode(text, false)
            .map_err(|e| LoomError::Tokenizer(format!("failed to encode text: {}", e)))?;

        let mut ids: Vec<u32> = encoding.get_ids().to_vec();

        if add_bos {
            if let Some(bos) = self.bos_token_id {
                ids.insert(0, bos);
            }
        }

        Ok(ids)
    }

    /// Decode token IDs to text, keeping special tokens.
    pub fn decode(&self, ids: &[u32]) -> Result<String> {
        self.inner
            .decode(ids, false)
            .map_err(|e| LoomError::Tokenizer(format!("failed to decode tokens: {}", e)))
    }

    /// Get vocabulary size, including added tokens.
    pub fn vocab_size(&self) -> usize {
        self.inner.get_vocab_size(true)
    }

    /// Get BOS token ID.
    pub fn bos_token_id(&self) -> Option<u32> {
        self.bos_token_id
    }
}

impl std::fmt::Debug for Tokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tokenizer")
            .field("vocab_size", &self.vocab_size())
            .field("bos_token_id", &self.bos_token_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_dir_without_tokenizer_json_fails() {
        let dir = tempfile::tempdir().unwrap();

        let result = Tokenizer::from_dir(dir.path());
        assert!(matches!(result, Err(LoomError::Tokenizer(_))));
    }

    // Run with: LOOM_MODEL_DIR=/path/to/model cargo test -p loom-core tokenizer -- --ignored
    #[test]
    #[ignore = "requires model files"]
    fn tokenizer_encode_decode() {
        let dir = std::env::var("LOOM_MODEL_DIR").unwrap();
        let tokenizer = Tokenizer::from_dir(dir).unwrap();

        let tokens = tokenizer.encode("The meaning of life is", false).unwrap();
        let decoded = tokenizer.decode(&tokens).unwrap();

        assert!(decoded.contains("meaning"));
    }
}
