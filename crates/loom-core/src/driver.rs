//! Layer-by-layer tree construction.
//!
//! The [`Driver`] repeatedly asks the scheduler for the next same-layer batch,
//! scores it with one executor call and hands each node to the expander.

use crate::config::LoomConfig;
use crate::error::Result;
use crate::model::ModelBackend;
use crate::scheduler::{BatchScores, FrontierScheduler};
use crate::search::{BranchExpander, Expansion};
use crate::tree::TreeStore;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Outcome of one processed batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    /// Layer of every node in the batch.
    pub layer: usize,
    /// Nodes in the batch.
    pub batch_size: usize,
    /// Sequences sent to the executor (0 for a depth-leaf batch).
    pub scored: usize,
    /// Children created.
    pub created: usize,
    /// Nodes left childless for lack of a usable score.
    pub pruned: usize,
}

/// Totals for a whole run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    /// Batches processed.
    pub batches: usize,
    /// Children created over the run.
    pub nodes_created: usize,
    /// Nodes pruned over the run.
    pub nodes_pruned: usize,
    /// Whether the stop flag ended the run before the frontier emptied.
    pub stopped_early: bool,
}

impl RunStats {
    fn record(&mut self, report: &BatchReport) {
        self.batches += 1;
        self.nodes_created += report.created;
        self.nodes_pruned += report.pruned;
    }
}

/// Drives the scheduler, executor and expander until the frontier is empty.
pub struct Driver {
    store: Arc<TreeStore>,
    scheduler: FrontierScheduler,
    expander: BranchExpander,
    backend: Arc<dyn ModelBackend>,
    stop: Option<Arc<AtomicBool>>,
}

impl Driver {
    /// Create a driver over an existing store.
    ///
    /// Fails with a configuration error if `config` is invalid for the
    /// backend's vocabulary.
    pub fn new(
        store: Arc<TreeStore>,
        backend: Arc<dyn ModelBackend>,
        config: &LoomConfig,
    ) -> Result<Self> {
        let expander = BranchExpander::new(config, backend.vocab_size())?;
        let scheduler = FrontierScheduler::new(store.clone(), config.max_batch_size);
        Ok(Self {
            store,
            scheduler,
            expander,
            backend,
            stop: None,
        })
    }

    /// Stop between batches once `flag` is set.
    pub fn with_stop_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.stop = Some(flag);
        self
    }

    /// Get the tree store.
    pub fn store(&self) -> &Arc<TreeStore> {
        &self.store
    }

    /// Get the expander.
    pub fn expander(&self) -> &BranchExpander {
        &self.expander
    }

    fn stop_requested(&self) -> bool {
        self.stop
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    /// Process one batch.
    ///
    /// Returns None once the frontier is empty. If the executor fails, the
    /// unfinished part of the batch goes back to the head of the frontier and
    /// the error is returned; every node finished earlier stays in the store.
    pub fn step(&self) -> Result<Option<BatchReport>> {
        let batch = self.scheduler.select_batch()?;
        if batch.is_empty() {
            return Ok(None);
        }
        info!("processing layer {}: {} items", batch.layer(), batch.len());

        let mut report = BatchReport {
            layer: batch.layer(),
            batch_size: batch.len(),
            ..Default::default()
        };

        let mut scores = if self.expander.expands_layer(batch.layer()) {
            let distributions = self
                .backend
                .forward(batch.token_ids())
                .and_then(|out| BatchScores::assign(&batch, out));
            match distributions {
                Ok(scores) => {
                    report.scored = batch.len();
                    scores
                }
                Err(e) => {
                    self.store.restore_batch(batch.node_ids())?;
                    return Err(e);
                }
            }
        } else {
            BatchScores::default()
        };

        for (i, id) in batch.node_ids().iter().enumerate() {
            let outcome =
                self.expander
                    .expand(&self.store, self.backend.as_ref(), id, scores.take(id));
            let expansion = match outcome {
                Ok(expansion) => expansion,
                Err(e) => {
                    self.store.restore_batch(&batch.node_ids()[i..])?;
                    return Err(e);
                }
            };
            match expansion {
                Expansion::Branched(children) => report.created += children.len(),
                Expansion::DepthLeaf => {}
                Expansion::Pruned => report.pruned += 1,
            }
        }

        Ok(Some(report))
    }

    /// Run until the frontier is empty or the stop flag is set.
    pub fn run(&self) -> Result<RunStats> {
        let mut stats = RunStats::default();
        loop {
            if self.stop_requested() {
                warn!(
                    pending = self.store.num_pending(),
                    "stop requested, leaving frontier unexpanded"
                );
                stats.stopped_early = true;
                break;
            }
            match self.step()? {
                Some(report) => stats.record(&report),
                None => break,
            }
        }
        info!(
            batches = stats.batches,
            nodes = self.store.len(),
            pruned = stats.nodes_pruned,
            "loom finished"
        );
        Ok(stats)
    }
}

impl std::fmt::Debug for Driver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Driver")
            .field("expander", &self.expander)
            .field("nodes", &self.store.len())
            .field("pending", &self.store.num_pending())
            .finish()
    }
}
