//! Tree-building configuration.

use crate::error::{LoomError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration for one tree build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoomConfig {
    /// Maximum depth D. Nodes at this layer are leaves.
    pub depth: usize,
    /// Branching width W: children created per expanded node.
    pub width: usize,
    /// Maximum nodes per executor call (None = whole layer).
    pub max_batch_size: Option<usize>,
    /// Refuse to start when the worst-case tree exceeds this many nodes.
    pub max_nodes: Option<usize>,
}

impl Default for LoomConfig {
    fn default() -> Self {
        Self {
            depth: 3,
            width: 3,
            max_batch_size: None,
            max_nodes: None,
        }
    }
}

impl LoomConfig {
    /// Create a config with the given depth and width.
    pub fn new(depth: usize, width: usize) -> Self {
        Self {
            depth,
            width,
            ..Default::default()
        }
    }

    /// Load from JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        serde_json::from_str(&contents)
            .map_err(|e| LoomError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Worst-case node count `sum_{l=0..=depth} width^l`.
    ///
    /// Returns None if the count overflows `usize`.
    pub fn max_tree_size(&self) -> Option<usize> {
        let mut total: usize = 0;
        let mut layer_size: usize = 1;
        for layer in 0..=self.depth {
            total = total.checked_add(layer_size)?;
            if layer < self.depth {
                layer_size = layer_size.checked_mul(self.width)?;
            }
        }
        Some(total)
    }

    /// Check the config against a backend vocabulary.
    pub fn validate(&self, vocab_size: usize) -> Result<()> {
        if self.width == 0 {
            return Err(LoomError::Config(
                "width must be at least 1 (width 0 can never reach the requested depth)".into(),
            ));
        }
        if self.width > vocab_size {
            return Err(LoomError::Config(format!(
                "width {} exceeds vocabulary size {}",
                self.width, vocab_size
            )));
        }
        if self.max_batch_size == Some(0) {
            return Err(LoomError::Config("max_batch_size must be at least 1".into()));
        }
        if let Some(max_nodes) = self.max_nodes {
            match self.max_tree_size() {
                Some(size) if size <= max_nodes => {}
                Some(size) => {
                    return Err(LoomError::Config(format!(
                        "depth {} x width {} can produce {} nodes, above the limit of {}",
                        self.depth, self.width, size, max_nodes
                    )))
                }
                None => {
                    return Err(LoomError::Config(format!(
                        "depth {} x width {} overflows the node limit of {}",
                        self.depth, self.width, max_nodes
                    )))
                }
            }
        }
        Ok(())
    }
}
