//! Node storage: id arena, layer index and the pending frontier.

use super::node::{Node, NodeId, NodeStatus};
use super::snapshot::TreeSnapshot;
use crate::error::{LoomError, Result};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// Insertion-ordered set of node ids waiting to be expanded.
#[derive(Debug, Default)]
struct PendingSet {
    order: Vec<NodeId>,
    members: HashSet<NodeId>,
}

impl PendingSet {
    fn push(&mut self, id: NodeId) -> bool {
        if self.members.insert(id.clone()) {
            self.order.push(id);
            true
        } else {
            false
        }
    }

    /// Queue ids ahead of everything already pending, keeping their order.
    fn push_front(&mut self, ids: impl IntoIterator<Item = NodeId>) {
        let fresh: Vec<NodeId> = ids
            .into_iter()
            .filter(|id| self.members.insert(id.clone()))
            .collect();
        self.order.splice(0..0, fresh);
    }

    fn remove_all(&mut self, ids: &HashSet<NodeId>) {
        let mut hit = false;
        for id in ids {
            hit |= self.members.remove(id);
        }
        if hit {
            self.order.retain(|id| !ids.contains(id));
        }
    }

    fn take(&mut self) -> Vec<NodeId> {
        self.members.clear();
        std::mem::take(&mut self.order)
    }

    fn len(&self) -> usize {
        self.order.len()
    }
}

#[derive(Debug, Default)]
struct StoreInner {
    nodes: HashMap<NodeId, Node>,
    layers: BTreeMap<usize, Vec<NodeId>>,
    pending: PendingSet,
}

impl StoreInner {
    fn insert(&mut self, node: Node) {
        if let Some(previous) = self.nodes.get(&node.id) {
            if previous.layer == node.layer {
                self.nodes.insert(node.id.clone(), node);
                return;
            }
            let old_layer = previous.layer;
            if let Some(ids) = self.layers.get_mut(&old_layer) {
                ids.retain(|id| *id != node.id);
                if ids.is_empty() {
                    self.layers.remove(&old_layer);
                }
            }
        }
        self.layers
            .entry(node.layer)
            .or_default()
            .push(node.id.clone());
        self.nodes.insert(node.id.clone(), node);
    }

    /// Remove `id` and every descendant. Iterative so depth is unbounded.
    fn delete_subtree(&mut self, id: &NodeId) -> usize {
        let mut stack = vec![id.clone()];
        let mut removed = HashSet::new();
        let mut touched_layers = BTreeSet::new();

        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.remove(&current) {
                touched_layers.insert(node.layer);
                stack.extend(node.children);
                removed.insert(current);
            }
        }

        if removed.is_empty() {
            return 0;
        }

        for layer in touched_layers {
            if let Some(ids) = self.layers.get_mut(&layer) {
                ids.retain(|id| !removed.contains(id));
                if ids.is_empty() {
                    self.layers.remove(&layer);
                }
            }
        }
        self.pending.remove_all(&removed);

        removed.len()
    }

    fn node_mut(&mut self, id: &NodeId) -> Result<&mut Node> {
        self.nodes
            .get_mut(id)
            .ok_or_else(|| LoomError::InvalidNode(id.to_string()))
    }
}

/// Owns every node of one token tree.
///
/// All mutation goes through this type. Interior locking lets the driver,
/// the scheduler and a caller inspecting partial results share one
/// `Arc<TreeStore>`; writers take the lock for the whole of each
/// structural change.
#[derive(Debug)]
pub struct TreeStore {
    inner: RwLock<StoreInner>,
    root_id: NodeId,
    root_len: usize,
}

impl TreeStore {
    /// Create a store holding `root`, queued for expansion if pending.
    pub fn new(root: Node) -> Self {
        let root_id = root.id.clone();
        let root_len = root.token_ids.len();
        let queue_root = root.status == NodeStatus::Pending;

        let mut inner = StoreInner::default();
        inner.insert(root);
        if queue_root {
            inner.pending.push(root_id.clone());
        }

        Self {
            inner: RwLock::new(inner),
            root_id,
            root_len,
        }
    }

    /// Create a store whose root is the given prompt.
    pub fn from_prompt(token_ids: Vec<u32>, text: impl Into<String>) -> Self {
        Self::new(Node::root(token_ids, text))
    }

    /// Root node ID.
    pub fn root_id(&self) -> &NodeId {
        &self.root_id
    }

    /// Number of prompt tokens at the root.
    pub fn root_len(&self) -> usize {
        self.root_len
    }

    /// Get a copy of a node.
    pub fn get(&self, id: &NodeId) -> Option<Node> {
        self.inner.read().nodes.get(id).cloned()
    }

    /// Check whether a node exists.
    pub fn contains(&self, id: &NodeId) -> bool {
        self.inner.read().nodes.contains_key(id)
    }

    /// Layer of a node.
    pub fn layer_of(&self, id: &NodeId) -> Option<usize> {
        self.inner.read().nodes.get(id).map(|n| n.layer)
    }

    /// Status of a node.
    pub fn status(&self, id: &NodeId) -> Option<NodeStatus> {
        self.inner.read().nodes.get(id).map(|n| n.status)
    }

    /// Insert or replace a node and index it by layer.
    ///
    /// Does not touch the pending set or any parent's children list.
    pub fn put(&self, node: Node) {
        self.inner.write().insert(node);
    }

    /// Set a node's status.
    pub fn set_status(&self, id: &NodeId, status: NodeStatus) -> Result<()> {
        self.inner.write().node_mut(id)?.status = status;
        Ok(())
    }

    /// Register a freshly created child.
    ///
    /// Inserts the node, appends its id to the parent's children and to the
    /// pending set, all under one write lock.
    pub fn add_child(&self, parent_id: &NodeId, child: Node) -> Result<()> {
        let mut inner = self.inner.write();

        let parent = inner.node_mut(parent_id)?;
        if child.layer != parent.layer + 1 || child.token_ids.len() != parent.token_ids.len() + 1
        {
            return Err(LoomError::ShapeMismatch(format!(
                "child {} (layer {}, {} tokens) does not extend parent {} (layer {}, {} tokens)",
                child.id,
                child.layer,
                child.token_ids.len(),
                parent_id,
                parent.layer,
                parent.token_ids.len()
            )));
        }
        if inner.nodes.contains_key(&child.id) {
            return Err(LoomError::InvalidNode(format!("{} already exists", child.id)));
        }

        let child_id = child.id.clone();
        inner.node_mut(parent_id)?.children.push(child_id.clone());
        inner.insert(child);
        inner.pending.push(child_id);
        Ok(())
    }

    /// Remove a node and all of its descendants.
    ///
    /// Idempotent: returns 0 if the node is already gone. A surviving
    /// parent's `children` list is left untouched.
    pub fn delete_subtree(&self, id: &NodeId) -> usize {
        self.inner.write().delete_subtree(id)
    }

    /// Delete every descendant of a node and reset its children list.
    ///
    /// Returns the number of nodes removed.
    pub fn clear_descendants(&self, id: &NodeId) -> Result<usize> {
        let mut inner = self.inner.write();
        let children = std::mem::take(&mut inner.node_mut(id)?.children);
        Ok(children
            .iter()
            .map(|child| inner.delete_subtree(child))
            .sum())
    }

    /// Mark a node as selected into a batch and return its token path.
    pub fn begin_processing(&self, id: &NodeId) -> Result<Vec<u32>> {
        let mut inner = self.inner.write();
        let node = inner.node_mut(id)?;
        node.status = NodeStatus::Processing;
        Ok(node.token_ids.clone())
    }

    /// Put an existing node back on the frontier for regeneration.
    pub fn requeue(&self, id: &NodeId) -> Result<()> {
        let mut inner = self.inner.write();
        inner.node_mut(id)?.status = NodeStatus::Pending;
        inner.pending.push(id.clone());
        Ok(())
    }

    /// Return the unfinished part of a batch to the head of the frontier.
    ///
    /// Each node loses any children created before the failure and goes
    /// back to `pending`, ahead of nodes that were already waiting.
    pub fn restore_batch(&self, ids: &[NodeId]) -> Result<()> {
        let mut inner = self.inner.write();
        for id in ids {
            let node = inner.node_mut(id)?;
            node.status = NodeStatus::Pending;
            let children = std::mem::take(&mut node.children);
            for child in &children {
                inner.delete_subtree(child);
            }
        }
        inner.pending.push_front(ids.iter().cloned());
        Ok(())
    }

    /// Remove and return the whole pending set, in insertion order.
    pub fn take_pending(&self) -> Vec<NodeId> {
        self.inner.write().pending.take()
    }

    /// Append ids to the pending set, skipping ones already queued.
    pub fn extend_pending(&self, ids: impl IntoIterator<Item = NodeId>) {
        let mut inner = self.inner.write();
        for id in ids {
            inner.pending.push(id);
        }
    }

    /// Pending ids, in insertion order.
    pub fn pending_ids(&self) -> Vec<NodeId> {
        self.inner.read().pending.order.clone()
    }

    /// Number of pending nodes.
    pub fn num_pending(&self) -> usize {
        self.inner.read().pending.len()
    }

    /// Check if the frontier is empty.
    pub fn has_pending(&self) -> bool {
        self.num_pending() > 0
    }

    /// Ids at a layer, in creation order.
    pub fn layer_ids(&self, layer: usize) -> Vec<NodeId> {
        self.inner
            .read()
            .layers
            .get(&layer)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of non-empty layers.
    pub fn num_layers(&self) -> usize {
        self.inner.read().layers.len()
    }

    /// Total number of nodes.
    pub fn len(&self) -> usize {
        self.inner.read().nodes.len()
    }

    /// Check if the store holds no nodes.
    pub fn is_empty(&self) -> bool {
        self.inner.read().nodes.is_empty()
    }

    /// Copy the tree into its serializable layer -> id -> node form.
    pub fn snapshot(&self) -> TreeSnapshot {
        let inner = self.inner.read();
        let mut layers: BTreeMap<usize, BTreeMap<NodeId, Node>> = BTreeMap::new();
        for node in inner.nodes.values() {
            layers
                .entry(node.layer)
                .or_default()
                .insert(node.id.clone(), node.clone());
        }
        TreeSnapshot::from_layers(layers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_children(n: usize) -> (TreeStore, Vec<NodeId>) {
        let store = TreeStore::from_prompt(vec![1, 2], "ab");
        let root = store.get(store.root_id()).unwrap();
        let mut ids = Vec::new();
        for rank in 0..n {
            let child = root.branch(rank, 10 + rank as u32, "x", 0.1);
            ids.push(child.id.clone());
            store.add_child(store.root_id(), child).unwrap();
        }
        (store, ids)
    }

    #[test]
    fn new_queues_root() {
        let store = TreeStore::from_prompt(vec![1, 2, 3], "abc");

        assert_eq!(store.len(), 1);
        assert_eq!(store.root_len(), 3);
        assert_eq!(store.pending_ids(), vec![NodeId::root()]);
        assert_eq!(store.layer_ids(0), vec![NodeId::root()]);
    }

    #[test]
    fn add_child_links_parent_and_pending() {
        let (store, ids) = store_with_children(3);

        let root = store.get(store.root_id()).unwrap();
        assert_eq!(root.children, ids);
        assert_eq!(store.layer_ids(1), ids);
        assert_eq!(store.num_pending(), 4);
        assert_eq!(store.len(), 4);
    }

    #[test]
    fn add_child_rejects_wrong_layer() {
        let store = TreeStore::from_prompt(vec![1], "a");
        let root = store.get(store.root_id()).unwrap();
        let mut child = root.branch(0, 5, "b", 0.5);
        child.layer = 2;

        let result = store.add_child(store.root_id(), child);
        assert!(matches!(result, Err(LoomError::ShapeMismatch(_))));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn add_child_rejects_unknown_parent() {
        let store = TreeStore::from_prompt(vec![1], "a");
        let root = store.get(store.root_id()).unwrap();
        let child = root.branch(0, 5, "b", 0.5);

        let result = store.add_child(&NodeId::from("9_9"), child);
        assert!(matches!(result, Err(LoomError::InvalidNode(_))));
    }

    #[test]
    fn delete_subtree_removes_descendants_everywhere() {
        let (store, ids) = store_with_children(2);
        let first = store.get(&ids[0]).unwrap();
        let grandchild = first.branch(0, 99, "y", 0.3);
        let grandchild_id = grandchild.id.clone();
        store.add_child(&ids[0], grandchild).unwrap();

        let removed = store.delete_subtree(&ids[0]);

        assert_eq!(removed, 2);
        assert!(!store.contains(&ids[0]));
        assert!(!store.contains(&grandchild_id));
        assert_eq!(store.layer_ids(1), vec![ids[1].clone()]);
        assert!(store.layer_ids(2).is_empty());
        assert!(!store.pending_ids().contains(&grandchild_id));
        assert!(!store.pending_ids().contains(&ids[0]));
    }

    #[test]
    fn delete_subtree_is_idempotent() {
        let (store, ids) = store_with_children(2);

        assert_eq!(store.delete_subtree(&ids[0]), 1);
        assert_eq!(store.delete_subtree(&ids[0]), 0);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn delete_subtree_leaves_parent_children_list() {
        let (store, ids) = store_with_children(2);

        store.delete_subtree(&ids[1]);

        let root = store.get(store.root_id()).unwrap();
        assert_eq!(root.children, ids);
    }

    #[test]
    fn clear_descendants_resets_children() {
        let (store, _) = store_with_children(3);

        let removed = store.clear_descendants(store.root_id()).unwrap();

        assert_eq!(removed, 3);
        assert!(store.get(store.root_id()).unwrap().children.is_empty());
        assert_eq!(store.len(), 1);
        assert_eq!(store.num_layers(), 1);
    }

    #[test]
    fn deep_chain_deletes_without_recursion() {
        let store = TreeStore::from_prompt(Vec::new(), "");
        let mut parent = NodeId::root();
        for layer in 1..=50_000 {
            let id = NodeId::from(format!("{}_c", layer));
            store.put(Node {
                layer,
                id: id.clone(),
                parent_id: Some(parent.clone()),
                token_ids: Vec::new(),
                text: String::new(),
                probability: 1.0,
                last_token_text: String::new(),
                status: NodeStatus::Done,
                children: Vec::new(),
            });
            store.inner.write().node_mut(&parent).unwrap().children.push(id.clone());
            parent = id;
        }
        assert_eq!(store.len(), 50_001);

        let removed = store.clear_descendants(store.root_id()).unwrap();

        assert_eq!(removed, 50_000);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn requeue_does_not_duplicate_pending() {
        let store = TreeStore::from_prompt(vec![1], "a");
        let root = store.root_id().clone();

        store.requeue(&root).unwrap();
        assert_eq!(store.num_pending(), 1);

        store.take_pending();
        store.set_status(&root, NodeStatus::Done).unwrap();
        store.requeue(&root).unwrap();

        assert_eq!(store.status(&root), Some(NodeStatus::Pending));
        assert_eq!(store.pending_ids(), vec![root]);
    }

    #[test]
    fn take_pending_preserves_order() {
        let (store, ids) = store_with_children(3);

        let pending = store.take_pending();

        assert_eq!(pending[0], NodeId::root());
        assert_eq!(&pending[1..], ids.as_slice());
        assert!(!store.has_pending());
    }

    #[test]
    fn put_reindexes_changed_layer() {
        let store = TreeStore::from_prompt(vec![1], "a");
        let mut node = Node::root(vec![1, 2], "ab");
        node.id = NodeId::from("x");
        node.layer = 1;
        store.put(node.clone());
        node.layer = 2;
        store.put(node);

        assert!(store.layer_ids(1).is_empty());
        assert_eq!(store.layer_ids(2), vec![NodeId::from("x")]);
    }

    #[test]
    fn restore_batch_requeues_ahead_of_waiting_nodes() {
        let (store, ids) = store_with_children(3);
        store.take_pending();
        let first = store.get(&ids[0]).unwrap();
        store.add_child(&ids[0], first.branch(0, 4, "e", 0.5)).unwrap();
        store.begin_processing(&ids[0]).unwrap();
        store.begin_processing(&ids[1]).unwrap();
        store.take_pending();
        store.extend_pending(vec![ids[2].clone()]);

        store.restore_batch(&ids[..2]).unwrap();

        // Half-built children are gone and the batch is back in front.
        assert_eq!(store.pending_ids(), vec![ids[0].clone(), ids[1].clone(), ids[2].clone()]);
        assert!(store.get(&ids[0]).unwrap().children.is_empty());
        assert!(store.layer_ids(2).is_empty());
        assert_eq!(store.status(&ids[0]), Some(NodeStatus::Pending));
        assert_eq!(store.status(&ids[1]), Some(NodeStatus::Pending));
    }

    #[test]
    fn restore_batch_rejects_unknown_node() {
        let store = TreeStore::from_prompt(vec![1], "a");
        assert!(store.restore_batch(&[NodeId::from("3_gone")]).is_err());
    }
}
