//! Model backends.
//!
//! The tree builder only talks to a [`ModelBackend`]: encode, decode and a
//! batched forward pass returning next-token scores. Provided backends:
//! - [`CandleBackend`]: HuggingFace tokenizer + a candle [`LogitsModel`]
//!   such as [`BigramModel`]
//! - [`StaticBackend`]: fixed scores, for tests and demos

mod backend;
mod bigram;
mod loader;
mod stub;
mod tokenizer;

pub use backend::ModelBackend;
pub use bigram::{BigramModel, CandleBackend, LogitsModel};
pub use loader::WeightLoader;
pub use stub::StaticBackend;
pub use tokenizer::Tokenizer;
