//! High-level tree builder.

use anyhow::{bail, Context, Result};
use loom_core::{
    config::LoomConfig,
    driver::{BatchReport, Driver, RunStats},
    model::ModelBackend,
    tree::{NodeId, TreeSnapshot, TreeStore},
};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::info;

enum Prompt {
    Text(String),
    Tokens(Vec<u32>),
}

/// Builder for creating a [`Loom`].
pub struct LoomBuilder {
    config: LoomConfig,
    backend: Option<Arc<dyn ModelBackend>>,
    prompt: Option<Prompt>,
    stop: Option<Arc<AtomicBool>>,
}

impl LoomBuilder {
    /// Create a new builder with the default configuration.
    pub fn new() -> Self {
        Self {
            config: LoomConfig::default(),
            backend: None,
            prompt: None,
            stop: None,
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: LoomConfig) -> Self {
        self.config = config;
        self
    }

    /// Set maximum depth.
    pub fn depth(mut self, depth: usize) -> Self {
        self.config.depth = depth;
        self
    }

    /// Set branching width.
    pub fn width(mut self, width: usize) -> Self {
        self.config.width = width;
        self
    }

    /// Set maximum batch size.
    pub fn max_batch_size(mut self, size: usize) -> Self {
        self.config.max_batch_size = Some(size);
        self
    }

    /// Refuse configurations whose worst-case tree exceeds `nodes`.
    pub fn max_nodes(mut self, nodes: usize) -> Self {
        self.config.max_nodes = Some(nodes);
        self
    }

    /// Set the model backend.
    pub fn backend(mut self, backend: impl ModelBackend + 'static) -> Self {
        self.backend = Some(Arc::new(backend));
        self
    }

    /// Set a shared model backend.
    pub fn shared_backend(mut self, backend: Arc<dyn ModelBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Set the prompt as text, tokenized by the backend.
    pub fn prompt(mut self, text: impl Into<String>) -> Self {
        self.prompt = Some(Prompt::Text(text.into()));
        self
    }

    /// Set the prompt as token IDs, decoded by the backend for the root text.
    pub fn prompt_tokens(mut self, token_ids: Vec<u32>) -> Self {
        self.prompt = Some(Prompt::Tokens(token_ids));
        self
    }

    /// Stop between batches once `flag` is set.
    pub fn stop_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.stop = Some(flag);
        self
    }

    /// Validate the configuration and create the root node.
    pub fn build(self) -> Result<Loom> {
        let backend = self.backend.context("no model backend configured")?;
        self.config
            .validate(backend.vocab_size())
            .context("invalid loom configuration")?;

        let (token_ids, text) = match self.prompt.context("no prompt configured")? {
            Prompt::Text(text) => {
                let token_ids = backend.encode(&text).context("failed to encode prompt")?;
                (token_ids, text)
            }
            Prompt::Tokens(token_ids) => {
                let text = backend
                    .decode(&token_ids)
                    .context("failed to decode prompt tokens")?;
                (token_ids, text)
            }
        };
        if token_ids.is_empty() {
            bail!("prompt encodes to no tokens");
        }

        let store = Arc::new(TreeStore::from_prompt(token_ids, text));
        let mut driver = Driver::new(store.clone(), backend, &self.config)?;
        if let Some(flag) = self.stop {
            driver = driver.with_stop_flag(flag);
        }

        info!(
            depth = self.config.depth,
            width = self.config.width,
            prompt_tokens = store.root_len(),
            "loom ready"
        );

        Ok(Loom {
            config: self.config,
            store,
            driver,
        })
    }
}

impl Default for LoomBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A token tree rooted at one prompt.
#[derive(Debug)]
pub struct Loom {
    config: LoomConfig,
    store: Arc<TreeStore>,
    driver: Driver,
}

impl Loom {
    /// Create a new builder.
    pub fn builder() -> LoomBuilder {
        LoomBuilder::new()
    }

    /// Get configuration.
    pub fn config(&self) -> &LoomConfig {
        &self.config
    }

    /// Get the tree store.
    pub fn store(&self) -> &Arc<TreeStore> {
        &self.store
    }

    /// Expand until the frontier is empty or the stop flag is set.
    ///
    /// On a backend failure the tree built so far stays available through
    /// [`Loom::snapshot`].
    pub fn run(&self) -> Result<RunStats> {
        Ok(self.driver.run()?)
    }

    /// Process a single batch. Returns None once the frontier is empty.
    pub fn step(&self) -> Result<Option<BatchReport>> {
        Ok(self.driver.step()?)
    }

    /// Queue an existing node for regeneration on the next run.
    pub fn requeue(&self, id: &NodeId) -> Result<()> {
        self.store
            .requeue(id)
            .with_context(|| format!("cannot requeue node {}", id))
    }

    /// Copy the current tree.
    pub fn snapshot(&self) -> TreeSnapshot {
        self.store.snapshot()
    }

    /// Serialize the current tree as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(self.snapshot().to_json_pretty()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loom_core::model::StaticBackend;
    use loom_core::tree::NodeStatus;

    fn ab() -> StaticBackend {
        StaticBackend::with_probabilities(["A", "B"], &[0.9, 0.1]).unwrap()
    }

    #[test]
    fn builds_and_runs_from_text_prompt() {
        let loom = Loom::builder()
            .backend(ab())
            .prompt("AB")
            .depth(2)
            .width(2)
            .build()
            .unwrap();

        let stats = loom.run().unwrap();

        assert_eq!(loom.store().len(), 7);
        assert_eq!(stats.nodes_created, 6);
        let root = loom.store().get(loom.store().root_id()).unwrap();
        assert_eq!(root.token_ids, vec![0, 1]);
        assert_eq!(root.text, "AB");
    }

    #[test]
    fn token_prompt_is_decoded_for_root_text() {
        let loom = Loom::builder()
            .shared_backend(Arc::new(ab()))
            .prompt_tokens(vec![1, 1])
            .depth(0)
            .width(1)
            .build()
            .unwrap();

        assert_eq!(loom.snapshot().node(&NodeId::root()).unwrap().text, "BB");
    }

    #[test]
    fn missing_backend_is_an_error() {
        assert!(Loom::builder().prompt("A").build().is_err());
    }

    #[test]
    fn missing_prompt_is_an_error() {
        assert!(Loom::builder().backend(ab()).width(1).build().is_err());
    }

    #[test]
    fn empty_prompt_is_rejected() {
        let result = Loom::builder().backend(ab()).prompt("").width(1).build();
        assert!(result.unwrap_err().to_string().contains("no tokens"));
    }

    #[test]
    fn width_above_vocab_is_rejected() {
        let result = Loom::builder().backend(ab()).prompt("A").width(3).build();
        assert!(result.is_err());
    }

    #[test]
    fn node_cap_is_enforced_at_build() {
        let result = Loom::builder()
            .backend(ab())
            .prompt("A")
            .depth(10)
            .width(2)
            .max_nodes(100)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn json_output_round_trips() {
        let loom = Loom::builder()
            .backend(ab())
            .prompt("A")
            .depth(2)
            .width(2)
            .build()
            .unwrap();
        loom.run().unwrap();

        let json = loom.to_json().unwrap();
        let parsed = TreeSnapshot::from_json(&json).unwrap();

        assert_eq!(parsed, loom.snapshot());
        assert!(json.contains("\"0_0\""));
        assert!(!json.contains("logits"));
    }

    #[test]
    fn requeue_unknown_node_fails() {
        let loom = Loom::builder()
            .backend(ab())
            .prompt("A")
            .width(2)
            .build()
            .unwrap();

        assert!(loom.requeue(&NodeId::from("9_nope")).is_err());
        assert!(loom.requeue(&NodeId::root()).is_ok());
    }

    #[test]
    fn requeue_regenerates_subtree() {
        let loom = Loom::builder()
            .backend(ab())
            .prompt("A")
            .depth(3)
            .width(2)
            .build()
            .unwrap();
        loom.run().unwrap();
        let before = loom.snapshot();

        loom.requeue(&NodeId::root()).unwrap();
        assert_eq!(
            loom.store().status(&NodeId::root()),
            Some(NodeStatus::Pending)
        );
        loom.run().unwrap();

        assert_eq!(loom.snapshot(), before);
    }
}
