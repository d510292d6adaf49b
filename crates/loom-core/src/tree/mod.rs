//! Token tree storage.
//!
//! This module provides:
//! - [`Node`] records with lineage-encoding [`NodeId`]s
//! - [`TreeStore`], the single owner of every node, its layer index and the
//!   pending frontier
//! - [`TreeSnapshot`], the serialized `layer -> id -> node` form
//!
//! # Invariants
//!
//! - `child.layer == parent.layer + 1`
//! - `child.token_ids.len() == parent.token_ids.len() + 1`, so every node at a
//!   layer has the same sequence length and a layer can run as one batch
//! - nodes are only ever removed as whole subtrees
//!
//! # Example
//!
//! ```rust
//! use loom_core::tree::{NodeStatus, TreeStore};
//!
//! let store = TreeStore::from_prompt(vec![1, 2, 3], "The sky");
//! let root = store.get(store.root_id()).unwrap();
//!
//! // Branch the root on two candidate tokens
//! store.add_child(store.root_id(), root.branch(0, 42, " is", 0.6)).unwrap();
//! store.add_child(store.root_id(), root.branch(1, 77, " was", 0.3)).unwrap();
//! store.set_status(store.root_id(), NodeStatus::Done).unwrap();
//!
//! assert_eq!(store.layer_ids(1).len(), 2);
//!
//! // Regenerating the root drops its old branches first
//! assert_eq!(store.clear_descendants(store.root_id()).unwrap(), 2);
//! assert_eq!(store.len(), 1);
//! ```

mod node;
mod snapshot;
mod store;

pub use node::{Node, NodeId, NodeStatus};
pub use snapshot::TreeSnapshot;
pub use store::TreeStore;
