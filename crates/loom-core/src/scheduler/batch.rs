//! Batch types for scheduled execution.

use crate::error::{LoomError, Result};
use crate::tree::NodeId;
use std::collections::HashMap;

/// A same-layer batch of nodes selected from the frontier.
#[derive(Debug, Clone, Default)]
pub struct FrontierBatch {
    layer: usize,
    node_ids: Vec<NodeId>,
    token_ids: Vec<Vec<u32>>,
}

impl FrontierBatch {
    /// Create a batch, checking that every sequence has the same length.
    pub fn new(layer: usize, node_ids: Vec<NodeId>, token_ids: Vec<Vec<u32>>) -> Result<Self> {
        if node_ids.len() != token_ids.len() {
            return Err(LoomError::ShapeMismatch(format!(
                "{} nodes but {} sequences",
                node_ids.len(),
                token_ids.len()
            )));
        }
        if let Some(first) = token_ids.first() {
            if let Some((i, seq)) = token_ids
                .iter()
                .enumerate()
                .find(|(_, seq)| seq.len() != first.len())
            {
                return Err(LoomError::ShapeMismatch(format!(
                    "layer {} node {} has {} tokens, expected {}",
                    layer,
                    node_ids[i],
                    seq.len(),
                    first.len()
                )));
            }
        }
        Ok(Self {
            layer,
            node_ids,
            token_ids,
        })
    }

    /// An empty batch: the frontier is exhausted.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Layer shared by every node in the batch.
    pub fn layer(&self) -> usize {
        self.layer
    }

    /// Node ids, in frontier order.
    pub fn node_ids(&self) -> &[NodeId] {
        &self.node_ids
    }

    /// Token paths, aligned with `node_ids`.
    pub fn token_ids(&self) -> &[Vec<u32>] {
        &self.token_ids
    }

    /// Common sequence length (0 for an empty batch).
    pub fn seq_len(&self) -> usize {
        self.token_ids.first().map_or(0, Vec::len)
    }

    /// Get batch size.
    pub fn len(&self) -> usize {
        self.node_ids.len()
    }

    /// Check if batch is empty.
    pub fn is_empty(&self) -> bool {
        self.node_ids.is_empty()
    }
}

/// Score distributions for the nodes of the batch in flight.
///
/// Lives only for one batch; scores never touch the stored node records.
#[derive(Debug, Default)]
pub struct BatchScores {
    scores: HashMap<NodeId, Vec<f32>>,
}

impl BatchScores {
    /// Pair executor output with the batch it was computed for.
    pub fn assign(batch: &FrontierBatch, distributions: Vec<Vec<f32>>) -> Result<Self> {
        if distributions.len() != batch.len() {
            return Err(LoomError::Backend(format!(
                "executor returned {} distributions for a batch of {}",
                distributions.len(),
                batch.len()
            )));
        }
        Ok(Self {
            scores: batch
                .node_ids()
                .iter()
                .cloned()
                .zip(distributions)
                .collect(),
        })
    }

    /// Remove and return a node's distribution.
    pub fn take(&mut self, id: &NodeId) -> Option<Vec<f32>> {
        self.scores.remove(id)
    }

    /// Number of distributions held.
    pub fn len(&self) -> usize {
        self.scores.len()
    }

    /// Check if no distributions are held.
    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }
}
