//! Top-k branching.
//!
//! The expander turns one node's score distribution into its children:
//! 1. Normalize scores with a softmax
//! 2. Keep the `width` most probable tokens (ties go to the lower token id)
//! 3. Create one child per token, most probable first

use crate::config::LoomConfig;
use crate::error::{LoomError, Result};
use crate::model::ModelBackend;
use crate::tree::{NodeId, NodeStatus, TreeStore};
use std::cmp::Ordering;
use tracing::{debug, error, warn};

/// What happened to a node handed to the expander.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expansion {
    /// Children were created, most probable first.
    Branched(Vec<NodeId>),
    /// The node sits at max depth; no children, marked done.
    DepthLeaf,
    /// No usable scores; the node is left childless in `processing`.
    Pruned,
}

/// Creates up to `width` children per node from its score distribution.
#[derive(Debug, Clone)]
pub struct BranchExpander {
    width: usize,
    max_depth: usize,
    vocab_size: usize,
}

impl BranchExpander {
    /// Create an expander, validating the config against the vocabulary.
    pub fn new(config: &LoomConfig, vocab_size: usize) -> Result<Self> {
        config.validate(vocab_size)?;
        Ok(Self {
            width: config.width,
            max_depth: config.depth,
            vocab_size,
        })
    }

    /// Branching width.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Maximum depth.
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Whether nodes at `layer` still produce children.
    pub fn expands_layer(&self, layer: usize) -> bool {
        layer < self.max_depth
    }

    /// Select the top-`width` tokens of a score distribution.
    ///
    /// Returns `(token, probability)` pairs by descending probability, or
    /// None if the distribution has the wrong size or cannot be normalized.
    pub fn select_tokens(&self, scores: &[f32]) -> Option<Vec<(u32, f32)>> {
        if scores.len() != self.vocab_size {
            return None;
        }
        let probs = softmax(scores)?;
        Some(top_k(&probs, self.width))
    }

    /// Expand one node that was selected into the current batch.
    ///
    /// `scores` is the node's entry from the batch side table, taken out so
    /// it is dropped once this call returns.
    pub fn expand(
        &self,
        store: &TreeStore,
        backend: &dyn ModelBackend,
        id: &NodeId,
        scores: Option<Vec<f32>>,
    ) -> Result<Expansion> {
        let node = store
            .get(id)
            .ok_or_else(|| LoomError::InvalidNode(id.to_string()))?;

        if !self.expands_layer(node.layer) {
            store.set_status(id, NodeStatus::Done)?;
            return Ok(Expansion::DepthLeaf);
        }

        let Some(scores) = scores else {
            error!("{}", LoomError::MissingScore(id.clone()));
            return Ok(Expansion::Pruned);
        };

        let Some(selected) = self.select_tokens(&scores) else {
            warn!(
                node = %id,
                len = scores.len(),
                expected = self.vocab_size,
                "unusable score distribution, pruning"
            );
            return Ok(Expansion::Pruned);
        };

        // Decode everything before touching the store so a backend failure
        // leaves no half-built child list.
        let mut children = Vec::with_capacity(selected.len());
        for (rank, (token, probability)) in selected.into_iter().enumerate() {
            let token_text = backend.decode(&[token])?;
            children.push(node.branch(rank, token, &token_text, probability));
        }

        if !node.children.is_empty() {
            store.clear_descendants(id)?;
        }

        let mut child_ids = Vec::with_capacity(children.len());
        for child in children {
            child_ids.push(child.id.clone());
            store.add_child(id, child)?;
        }
        store.set_status(id, NodeStatus::Done)?;

        debug!(node = %id, children = child_ids.len(), "expanded");
        Ok(Expansion::Branched(child_ids))
    }
}

/// Normalized exponential over a score vector.
///
/// Returns None for an empty vector or when the normalizer is not finite
/// (NaN scores, all scores -inf).
pub fn softmax(scores: &[f32]) -> Option<Vec<f32>> {
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exp: Vec<f32> = scores.iter().map(|&s| (s - max).exp()).collect();
    let sum: f32 = exp.iter().sum();
    if !sum.is_finite() || sum <= 0.0 {
        return None;
    }
    Some(exp.into_iter().map(|e| e / sum).collect())
}

/// The `k` highest entries as `(index, value)`, descending.
///
/// Equal values are ordered by ascending index, which makes the selection
/// fully deterministic.
pub fn top_k(probs: &[f32], k: usize) -> Vec<(u32, f32)> {
    let by_rank =
        |a: &(u32, f32), b: &(u32, f32)| -> Ordering { b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)) };

    let mut indexed: Vec<(u32, f32)> = probs
        .iter()
        .enumerate()
        .map(|(i, &p)| (i as u32, p))
        .collect();

    let k = k.min(indexed.len());
    if k == 0 {
        return Vec::new();
    }
    if k < indexed.len() {
        indexed.select_nth_unstable_by(k - 1, by_rank);
        indexed.truncate(k);
    }
    indexed.sort_unstable_by(by_rank);
    indexed
}
