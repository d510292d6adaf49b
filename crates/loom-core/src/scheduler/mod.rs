//! Depth-synchronized batch scheduling.
//!
//! The frontier is drained strictly breadth-first: each call takes the pending
//! nodes of the shallowest layer, so every batch holds sequences of one
//! length and layer `l + 1` is only scheduled once layer `l` is resolved.

mod batch;

pub use batch::{BatchScores, FrontierBatch};

use crate::error::Result;
use crate::tree::TreeStore;
use std::sync::Arc;
use tracing::{debug, warn};

/// Selects the next same-layer batch from the pending set.
#[derive(Debug)]
pub struct FrontierScheduler {
    /// Tree the frontier belongs to.
    store: Arc<TreeStore>,
    /// Maximum nodes per batch (None = whole layer).
    max_batch_size: Option<usize>,
}

impl FrontierScheduler {
    /// Create a new scheduler.
    pub fn new(store: Arc<TreeStore>, max_batch_size: Option<usize>) -> Self {
        Self {
            store,
            max_batch_size,
        }
    }

    /// Get the tree store.
    pub fn store(&self) -> &Arc<TreeStore> {
        &self.store
    }

    /// Select the next batch.
    ///
    /// Takes the pending nodes at the minimum pending layer (up to the batch
    /// cap), deletes any descendants they already have, and marks them
    /// `processing`. Returns an empty batch once nothing is pending.
    pub fn select_batch(&self) -> Result<FrontierBatch> {
        let pending = self.store.take_pending();

        let mut layered = Vec::with_capacity(pending.len());
        for id in pending {
            match self.store.layer_of(&id) {
                Some(layer) => layered.push((id, layer)),
                None => warn!(node = %id, "dropping pending id with no node"),
            }
        }

        let Some(min_layer) = layered.iter().map(|(_, layer)| *layer).min() else {
            return Ok(FrontierBatch::empty());
        };

        let limit = self.max_batch_size.unwrap_or(usize::MAX);
        let mut batch_ids = Vec::new();
        let mut remaining = Vec::new();
        for (id, layer) in layered {
            if layer == min_layer && batch_ids.len() < limit {
                batch_ids.push(id);
            } else {
                remaining.push(id);
            }
        }
        self.store.extend_pending(remaining);

        let mut token_ids = Vec::with_capacity(batch_ids.len());
        let mut invalidated = 0;
        for id in &batch_ids {
            invalidated += self.store.clear_descendants(id)?;
            token_ids.push(self.store.begin_processing(id)?);
        }
        if invalidated > 0 {
            debug!(layer = min_layer, invalidated, "deleted stale descendants");
        }

        FrontierBatch::new(min_layer, batch_ids, token_ids)
    }
}
