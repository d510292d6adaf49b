//! # Loom Core
//!
//! Core engine for building token trees: every branch of a prompt's most
//! probable continuations, expanded breadth-first to a fixed depth.
//!
//! This crate provides:
//! - **Tree store** holding nodes by id and by layer, with subtree invalidation
//! - **Frontier scheduler** forming same-layer batches of equal-length sequences
//! - **Branch expander** selecting the top-`width` tokens of each distribution
//! - **Model backends** over HuggingFace tokenizers and candle tensors
//! - **Driver** tying them together one batch at a time

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod config;
pub mod driver;
pub mod error;
pub mod model;
pub mod scheduler;
pub mod search;
pub mod tree;

pub use error::{LoomError, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::LoomConfig;
    pub use crate::driver::{BatchReport, Driver, RunStats};
    pub use crate::error::{LoomError, Result};
    pub use crate::model::{ModelBackend, StaticBackend};
    pub use crate::scheduler::{FrontierBatch, FrontierScheduler};
    pub use crate::search::{BranchExpander, Expansion};
    pub use crate::tree::{Node, NodeId, NodeStatus, TreeSnapshot, TreeStore};
}
