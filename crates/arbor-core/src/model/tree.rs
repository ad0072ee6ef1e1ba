//! `Tree` aggregate root and the read-only [`TreeView`] snapshot.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::model::ids::{Address, NodeId};
use crate::model::node::Node;

/// Aggregate root for one tree contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tree {
    pub address: Address,
    #[serde(default)]
    pub creator: String,
    /// `None` until the root node arrives.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_node_id: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_content: Option<String>,
    #[serde(default)]
    pub node_count: usize,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub updated_at: i64,
}

impl Tree {
    #[must_use]
    pub fn new(address: Address) -> Self {
        Self {
            address,
            creator: String::new(),
            root_node_id: None,
            root_content: None,
            node_count: 0,
            created_at: 0,
            updated_at: 0,
        }
    }

    /// Advance `updated_at` to `timestamp` if it is later.
    pub fn touch(&mut self, timestamp: i64) {
        self.updated_at = self.updated_at.max(timestamp);
    }
}

/// A tree and its ordered node set, as handed to readers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeView {
    pub tree: Tree,
    #[serde(default)]
    pub nodes: BTreeMap<NodeId, Node>,
}

impl TreeView {
    #[must_use]
    pub fn new(tree: Tree) -> Self {
        Self {
            tree,
            nodes: BTreeMap::new(),
        }
    }

    #[must_use]
    pub const fn address(&self) -> &Address {
        &self.tree.address
    }

    #[must_use]
    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    #[must_use]
    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Insert or replace a node, keeping the node count at least the number
    /// of nodes held.
    pub fn insert(&mut self, node: Node) {
        self.nodes.insert(node.id.clone(), node);
        self.tree.node_count = self.tree.node_count.max(self.nodes.len());
    }

    /// Children of `id`, in id order.
    #[must_use]
    pub fn children(&self, id: &NodeId) -> Vec<&Node> {
        self.nodes
            .values()
            .filter(|n| n.parent.as_ref() == Some(id))
            .collect()
    }

    /// Root nodes, in id order.
    #[must_use]
    pub fn roots(&self) -> Vec<&Node> {
        self.nodes.values().filter(|n| n.is_root).collect()
    }

    /// Ids of nodes whose ancestry chain reaches a root.
    #[must_use]
    pub fn attached_ids(&self) -> BTreeSet<NodeId> {
        let mut by_parent: BTreeMap<&NodeId, Vec<&NodeId>> = BTreeMap::new();
        for node in self.nodes.values() {
            if let Some(parent) = node.parent.as_ref() {
                by_parent.entry(parent).or_default().push(&node.id);
            }
        }

        let mut attached = BTreeSet::new();
        let mut queue: VecDeque<&NodeId> = self.roots().into_iter().map(|n| &n.id).collect();
        while let Some(id) = queue.pop_front() {
            if !attached.insert(id.clone()) {
                continue;
            }
            if let Some(children) = by_parent.get(id) {
                queue.extend(children.iter().copied());
            }
        }
        attached
    }

    /// Ids of nodes still waiting for an ancestor to arrive.
    #[must_use]
    pub fn pending_parent_ids(&self) -> BTreeSet<NodeId> {
        let attached = self.attached_ids();
        self.nodes
            .keys()
            .filter(|id| !attached.contains(*id))
            .cloned()
            .collect()
    }

    /// Ids of nodes whose base content is still being looked up.
    #[must_use]
    pub fn content_pending_ids(&self) -> Vec<NodeId> {
        self.nodes
            .values()
            .filter(|n| n.content_pending)
            .map(|n| n.id.clone())
            .collect()
    }

    /// Depth-first outline of attached nodes, as `(depth, node)` pairs.
    #[must_use]
    pub fn outline(&self) -> Vec<(usize, &Node)> {
        let mut out = Vec::new();
        let mut seen = BTreeSet::new();
        let mut stack: Vec<(usize, &Node)> =
            self.roots().into_iter().rev().map(|n| (0, n)).collect();
        while let Some((depth, node)) = stack.pop() {
            if !seen.insert(&node.id) {
                continue;
            }
            out.push((depth, node));
            for child in self.children(&node.id).into_iter().rev() {
                stack.push((depth + 1, child));
            }
        }
        out
    }

    /// BLAKE3 digest of the canonical JSON form, as `blake3:<hex>`.
    ///
    /// Two observers holding equal views produce equal fingerprints.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        // BTreeMap-backed and derive-ordered, so serialization is stable.
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        format!("blake3:{}", blake3::hash(&bytes).to_hex())
    }
}
