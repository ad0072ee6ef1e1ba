//! Selection memory: the last node a viewer selected in each tree.
//!
//! Entries are created on first selection, replaced on every change and
//! never evicted. Recall checks the remembered node against the current
//! view: if the node is not there (yet, or any more) the answer is `None`,
//! but the entry stays so the selection comes back if the node reappears
//! after a late content lookup or merge.

use std::collections::HashMap;

use crate::model::ids::{Address, NodeId};
use crate::model::tree::TreeView;

#[derive(Debug, Clone, Default)]
pub struct SelectionMemory {
    remembered: HashMap<Address, NodeId>,
}

impl SelectionMemory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember `node` as the selection for `tree`.
    pub fn remember(&mut self, tree: Address, node: NodeId) {
        self.remembered.insert(tree, node);
    }

    /// The remembered node if `view` still holds it.
    #[must_use]
    pub fn recall(&self, tree: &Address, view: Option<&TreeView>) -> Option<NodeId> {
        let node = self.remembered.get(tree)?;
        view.filter(|v| v.contains(node)).map(|_| node.clone())
    }

    /// The raw remembered id, whether or not it currently exists.
    #[must_use]
    pub fn remembered(&self, tree: &Address) -> Option<&NodeId> {
        self.remembered.get(tree)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.remembered.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.remembered.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::node::Node;
    use crate::model::tree::Tree;

    fn view_with(ids: &[&str]) -> TreeView {
        let tree = Address::new("0xa");
        let mut v = TreeView::new(Tree::new(tree.clone()));
        for id in ids {
            v.insert(Node::new(tree.clone(), NodeId::new(id)));
        }
        v
    }

    #[test]
    fn recall_present_node() {
        let mut mem = SelectionMemory::new();
        mem.remember(Address::new("0xa"), NodeId::new("2"));
        let v = view_with(&["1", "2"]);
        assert_eq!(mem.recall(&Address::new("0xa"), Some(&v)), Some(NodeId::new("2")));
    }

    #[test]
    fn missing_node_recalls_none_but_is_kept() {
        let mut mem = SelectionMemory::new();
        let tree = Address::new("0xa");
        mem.remember(tree.clone(), NodeId::new("2"));

        assert_eq!(mem.recall(&tree, Some(&view_with(&["1"]))), None);
        assert_eq!(mem.recall(&tree, None), None);
        assert_eq!(mem.remembered(&tree), Some(&NodeId::new("2")));

        assert_eq!(
            mem.recall(&tree, Some(&view_with(&["1", "2"]))),
            Some(NodeId::new("2"))
        );
    }

    #[test]
    fn selections_survive_tree_switches() {
        let mut mem = SelectionMemory::new();
        mem.remember(Address::new("0xa"), NodeId::new("1"));
        mem.remember(Address::new("0xb"), NodeId::new("7"));
        mem.remember(Address::new("0xa"), NodeId::new("3"));
        assert_eq!(mem.len(), 2);
        assert_eq!(mem.remembered(&Address::new("0xa")), Some(&NodeId::new("3")));
        assert_eq!(mem.remembered(&Address::new("0xb")), Some(&NodeId::new("7")));
    }

    #[test]
    fn unknown_tree_recalls_none() {
        let mem = SelectionMemory::new();
        assert!(mem.is_empty());
        assert_eq!(mem.recall(&Address::new("0xz"), Some(&view_with(&["1"]))), None);
    }
}
