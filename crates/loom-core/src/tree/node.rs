//! Tree node representation.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a tree node.
///
/// Ids encode lineage: the root is `0_0` and a child is
/// `{layer}_{parent_id}_{rank}`, so `2_1_0_0_1` is the second-ranked child
/// of the most probable child of the root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Root node ID.
    pub fn root() -> Self {
        NodeId("0_0".to_string())
    }

    /// Id of the `rank`-th child of `parent`, living at `layer`.
    pub fn child(layer: usize, parent: &NodeId, rank: usize) -> Self {
        NodeId(format!("{}_{}_{}", layer, parent.0, rank))
    }

    /// Borrow the id as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Layer encoded in the id prefix, if the id is well formed.
    pub fn layer_hint(&self) -> Option<usize> {
        self.0.split('_').next()?.parse().ok()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        NodeId(s.to_string())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        NodeId(s)
    }
}

/// Lifecycle state of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    /// Waiting in the frontier.
    Pending,
    /// Selected into the current batch.
    Processing,
    /// Expanded, or a leaf.
    Done,
}

/// A node in the token tree.
///
/// The record is exactly what gets serialized; scores computed for a node
/// while it is `Processing` live in the scheduler's side table, never here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Depth, 0 for the root.
    pub layer: usize,
    /// Unique node identifier.
    pub id: NodeId,
    /// Parent node (None for root).
    pub parent_id: Option<NodeId>,
    /// Full token path from the root.
    pub token_ids: Vec<u32>,
    /// Decoded text of the full path.
    pub text: String,
    /// Probability of this node's own token given its parent (1.0 for root).
    pub probability: f32,
    /// Decoded text of this node's own token.
    pub last_token_text: String,
    /// Lifecycle state.
    pub status: NodeStatus,
    /// Child ids, most probable first.
    pub children: Vec<NodeId>,
}

impl Node {
    /// Create the pending root node for a prompt.
    pub fn root(token_ids: Vec<u32>, text: impl Into<String>) -> Self {
        Self {
            layer: 0,
            id: NodeId::root(),
            parent_id: None,
            token_ids,
            text: text.into(),
            probability: 1.0,
            last_token_text: String::new(),
            status: NodeStatus::Pending,
            children: Vec::new(),
        }
    }

    /// Create the pending child reached by appending `token` to this node.
    pub fn branch(&self, rank: usize, token: u32, token_text: &str, probability: f32) -> Self {
        let layer = self.layer + 1;
        let mut token_ids = Vec::with_capacity(self.token_ids.len() + 1);
        token_ids.extend_from_slice(&self.token_ids);
        token_ids.push(token);

        Self {
            layer,
            id: NodeId::child(layer, &self.id, rank),
            parent_id: Some(self.id.clone()),
            token_ids,
            text: format!("{}{}", self.text, token_text),
            probability,
            last_token_text: token_text.to_string(),
            status: NodeStatus::Pending,
            children: Vec::new(),
        }
    }

    /// Check if this is the root.
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}
