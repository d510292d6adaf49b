//! Serialized form of a token tree.

use super::node::{Node, NodeId};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A token tree as a mapping from layer index to `id -> node`.
///
/// Serializes to a JSON object keyed by layer (`"0"`, `"1"`, ...) whose values
/// are objects keyed by node id. Only the persistent node record is written.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TreeSnapshot {
    layers: BTreeMap<usize, BTreeMap<NodeId, Node>>,
}

impl TreeSnapshot {
    pub(crate) fn from_layers(layers: BTreeMap<usize, BTreeMap<NodeId, Node>>) -> Self {
        Self { layers }
    }

    /// Parse a snapshot from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize as pretty-printed JSON (two-space indent).
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Serialize as compact JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Nodes at a layer.
    pub fn layer(&self, layer: usize) -> Option<&BTreeMap<NodeId, Node>> {
        self.layers.get(&layer)
    }

    /// Look up a node anywhere in the tree.
    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        match id.layer_hint() {
            Some(layer) => self.layers.get(&layer).and_then(|nodes| nodes.get(id)),
            None => self.nodes().find(|n| n.id == *id),
        }
    }

    /// All nodes, layer by layer.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.layers.values().flat_map(|nodes| nodes.values())
    }

    /// Number of layers present.
    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    /// Total number of nodes.
    pub fn len(&self) -> usize {
        self.layers.values().map(BTreeMap::len).sum()
    }

    /// Check if the snapshot holds no nodes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::TreeStore;

    #[test]
    fn json_is_keyed_by_layer_then_id() {
        let store = TreeStore::from_prompt(vec![3], "x");
        let root = store.get(store.root_id()).unwrap();
        store
            .add_child(store.root_id(), root.branch(0, 4, "y", 0.75))
            .unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&store.snapshot().to_json().unwrap()).unwrap();

        let child = &value["1"]["1_0_0_0"];
        assert_eq!(child["parent_id"], "0_0");
        assert_eq!(child["token_ids"], serde_json::json!([3, 4]));
        assert_eq!(child["text"], "xy");
        assert_eq!(child["status"], "pending");
        assert_eq!(value["0"]["0_0"]["children"], serde_json::json!(["1_0_0_0"]));
        assert!(value["0"]["0_0"]["parent_id"].is_null());
    }

    #[test]
    fn snapshot_parses_back() {
        let store = TreeStore::from_prompt(vec![3, 5], "xz");
        let snapshot = store.snapshot();

        let parsed = TreeSnapshot::from_json(&snapshot.to_json_pretty().unwrap()).unwrap();

        assert_eq!(parsed, snapshot);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed.node(&NodeId::root()).unwrap().text, "xz");
    }

    #[test]
    fn node_lookup_without_layer_prefix() {
        let mut root = Node::root(vec![1], "a");
        root.id = NodeId::from("start");
        let store = TreeStore::new(root);

        let snapshot = store.snapshot();
        assert!(snapshot.node(&NodeId::from("start")).is_some());
    }
}
