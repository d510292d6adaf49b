//! The model boundary consumed by the tree builder.

use crate::error::Result;

/// A tokenizer plus a batched next-token scorer.
///
/// Implementations must be deterministic for identical inputs and must not
/// have side effects visible to the tree builder.
pub trait ModelBackend: Send + Sync {
    /// Number of entries in every score distribution.
    fn vocab_size(&self) -> usize;

    /// Encode text to token IDs.
    fn encode(&self, text: &str) -> Result<Vec<u32>>;

    /// Decode token IDs to text.
    fn decode(&self, token_ids: &[u32]) -> Result<String>;

    /// Score the next token for every sequence in a batch.
    ///
    /// All sequences have the same length. Returns one unnormalized
    /// distribution of `vocab_size()` scores per sequence, in input order.
    fn forward(&self, batch: &[Vec<u32>]) -> Result<Vec<Vec<f32>>>;
}

impl<B: ModelBackend + ?Sized> ModelBackend for std::sync::Arc<B> {
    fn vocab_size(&self) -> usize {
        (**self).vocab_size()
    }

    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        (**self).encode(text)
    }

    fn decode(&self, token_ids: &[u32]) -> Result<String> {
        (**self).decode(token_ids)
    }

    fn forward(&self, batch: &[Vec<u32>]) -> Result<Vec<Vec<f32>>> {
        (**self).forward(batch)
    }
}
