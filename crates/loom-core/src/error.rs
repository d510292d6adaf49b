//! Error types for Loom Core.

use crate::tree::NodeId;
use thiserror::Error;

/// Result type alias for Loom operations.
pub type Result<T> = std::result::Result<T, LoomError>;

/// Errors that can occur while building a token tree.
#[derive(Error, Debug)]
pub enum LoomError {
    /// Invalid depth/width/batch configuration. Raised before any work starts.
    #[error("configuration error: {0}")]
    Config(String),

    /// A node selected for processing had no usable score distribution.
    ///
    /// Non-fatal: the expander logs it and prunes the node.
    #[error("missing score for node {0}")]
    MissingScore(NodeId),

    /// Invalid tree node reference.
    #[error("invalid node id: {0}")]
    InvalidNode(String),

    /// Shape mismatch between batch inputs and outputs.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// The model backend failed or returned an unusable batch.
    #[error("backend error: {0}")]
    Backend(String),

    /// Tokenizer load/encode/decode error.
    #[error("tokenizer error: {0}")]
    Tokenizer(String),

    /// Model loading error.
    #[error("model error: {0}")]
    Model(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Candle tensor error.
    #[error("tensor error: {0}")]
    Tensor(#[from] candle_core::Error),
}
