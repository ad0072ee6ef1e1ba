//! Reconciliation of two views of the same tree.
//!
//! A tree can be seen through two producers at once: a pull-style query
//! snapshot and the push-channel event projection. [`merge`] folds them
//! into one view. Every field is combined with a join, so the merge is
//! commutative and idempotent and never needs a tie-break on arrival:
//!
//! - node sets are unioned; a node present on either side survives;
//! - a node's update history is the union of both histories, so the
//!   visible content is the write at the latest known position;
//! - base content prefers non-empty, fetched content over an empty or
//!   pending placeholder;
//! - creation facts prefer the side that saw the creating event, and the
//!   earliest such position;
//! - token links are last-writer-wins registers;
//! - tree-level facts (creator, announced root) come from the view with the
//!   later `updated_at`; an empty value never beats a present one and
//!   equal times fall back to the plain value join;
//! - `updated_at` is the later of the two, `node_count` the larger.
//!
//! [`Merge::merge`] is also how the aggregate builder folds a repeated
//! `NodeCreated` for an id it already holds.

use std::cmp::{Ordering, Reverse};
use std::collections::BTreeMap;

use tracing::{instrument, warn};

use crate::event::EventPosition;
use crate::model::ids::NodeId;
use crate::model::node::{Node, NodeUpdateRecord, TokenLinks};
use crate::model::tree::TreeView;

pub trait Merge {
    fn merge(&mut self, other: Self);
}

/// Merge a pull-side and a push-side view into one.
#[must_use]
#[instrument(
    skip_all,
    fields(
        tree = %pull.address(),
        pull_nodes = pull.nodes.len(),
        push_nodes = push.nodes.len(),
    )
)]
pub fn merge(pull: &TreeView, push: &TreeView) -> TreeView {
    let mut merged = pull.clone();
    merged.merge(push.clone());
    merged
}

/// Merge two optional views; either side may be absent.
#[must_use]
pub fn merge_opt(pull: Option<&TreeView>, push: Option<&TreeView>) -> Option<TreeView> {
    match (pull, push) {
        (Some(a), Some(b)) => Some(merge(a, b)),
        (Some(v), None) | (None, Some(v)) => Some(v.clone()),
        (None, None) => None,
    }
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// Known creation beats unknown; among known, earlier beats later.
fn creation_key(created_at: Option<EventPosition>) -> CreationKey {
    (created_at.is_some(), Reverse(created_at))
}

type CreationKey = (bool, Reverse<Option<EventPosition>>);

type OriginKey<'a> = (
    CreationKey,
    (&'a Option<NodeId>, &'a str, i64, &'a str, bool, bool),
);

fn origin_key(n: &Node) -> OriginKey<'_> {
    (
        creation_key(n.created_at),
        (&n.parent, &n.author, n.timestamp, &n.model_id, n.is_root, n.has_nft),
    )
}

fn base_key(n: &Node) -> (bool, bool, CreationKey, &str) {
    (
        !n.base_content.is_empty(),
        !n.content_pending,
        creation_key(n.created_at),
        &n.base_content,
    )
}

/// A snapshot node may carry only its visible content. Treat that as the
/// base so that recomputing the derived content does not erase it.
fn normalize(node: &mut Node) {
    if node.history.is_empty() && node.base_content.is_empty() && !node.content.is_empty() {
        node.base_content = node.content.clone();
        node.content_pending = false;
    }
}

fn union_history(a: Vec<NodeUpdateRecord>, b: Vec<NodeUpdateRecord>) -> Vec<NodeUpdateRecord> {
    let mut by_position: BTreeMap<EventPosition, NodeUpdateRecord> = BTreeMap::new();
    for record in a.into_iter().chain(b) {
        match by_position.get(&record.position) {
            Some(existing) if *existing >= record => {}
            _ => {
                by_position.insert(record.position, record);
            }
        }
    }
    by_position.into_values().collect()
}

impl Merge for TokenLinks {
    fn merge(&mut self, other: Self) {
        self.token_id = self.token_id.take().max(other.token_id);
        self.token_bound_account = self.token_bound_account.take().max(other.token_bound_account);
        self.node_token_contract = self.node_token_contract.take().max(other.node_token_contract);
        self.owner = self.owner.take().max(other.owner);
    }
}

impl Merge for Node {
    fn merge(&mut self, mut other: Self) {
        normalize(self);
        normalize(&mut other);

        if origin_key(&other) > origin_key(self) {
            self.parent = other.parent.clone();
            self.author = other.author.clone();
            self.timestamp = other.timestamp;
            self.model_id = other.model_id.clone();
            self.is_root = other.is_root;
            self.has_nft = other.has_nft;
        }
        if base_key(&other) > base_key(self) {
            self.base_content = std::mem::take(&mut other.base_content);
            self.content_pending = other.content_pending;
        }
        self.created_at = match (self.created_at, other.created_at) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };

        self.history = union_history(std::mem::take(&mut self.history), other.history);
        self.token.merge(other.token);
        self.refresh_content();
    }
}

// ---------------------------------------------------------------------------
// Tree
// ---------------------------------------------------------------------------

/// Pick the root node: earliest known creation, then smallest id.
pub(crate) fn select_root<'a>(roots: impl Iterator<Item = &'a Node>) -> Option<&'a Node> {
    roots.max_by(|a, b| {
        creation_key(a.created_at)
            .cmp(&creation_key(b.created_at))
            .then_with(|| b.id.cmp(&a.id))
    })
}

fn join_text(a: String, b: String) -> String {
    // Non-empty beats empty; otherwise the larger value, for determinism.
    std::cmp::max_by(a, b, |x, y| {
        (!x.is_empty(), x.as_str()).cmp(&(!y.is_empty(), y.as_str()))
    })
}

/// Join of two timestamped tree facts: present beats empty, then the later
/// `updated_at`, then [`join_text`].
fn join_text_latest(a: String, a_at: i64, b: String, b_at: i64) -> String {
    match (!a.is_empty(), a_at).cmp(&(!b.is_empty(), b_at)) {
        Ordering::Greater => a,
        Ordering::Less => b,
        Ordering::Equal => join_text(a, b),
    }
}

fn join_created(a: i64, b: i64) -> i64 {
    match (a, b) {
        (0, x) | (x, 0) => x,
        (x, y) => x.min(y),
    }
}

impl Merge for TreeView {
    fn merge(&mut self, other: Self) {
        if self.tree.address != other.tree.address {
            warn!(
                left = %self.tree.address,
                right = %other.tree.address,
                "refusing to merge views of different trees"
            );
            if other.tree.address > self.tree.address {
                *self = other;
            }
            return;
        }

        let TreeView { tree: theirs, nodes } = other;
        for node in self.nodes.values_mut() {
            normalize(node);
            node.refresh_content();
        }
        for (id, mut node) in nodes {
            match self.nodes.get_mut(&id) {
                Some(existing) => existing.merge(node),
                None => {
                    normalize(&mut node);
                    node.refresh_content();
                    self.nodes.insert(id, node);
                }
            }
        }

        let ours = &mut self.tree;
        let (ours_at, theirs_at) = (ours.updated_at, theirs.updated_at);
        ours.creator = join_text_latest(
            std::mem::take(&mut ours.creator),
            ours_at,
            theirs.creator,
            theirs_at,
        );
        ours.created_at = join_created(ours.created_at, theirs.created_at);
        ours.updated_at = ours_at.max(theirs_at);
        ours.node_count = ours.node_count.max(theirs.node_count).max(self.nodes.len());

        let announced = join_text_latest(
            ours.root_content.take().unwrap_or_default(),
            ours_at,
            theirs.root_content.unwrap_or_default(),
            theirs_at,
        );
        let announced_root = match (ours.root_node_id.take(), theirs.root_node_id) {
            (Some(a), Some(b)) => Some(match ours_at.cmp(&theirs_at) {
                Ordering::Greater => a,
                Ordering::Less => b,
                Ordering::Equal => a.min(b),
            }),
            (a, b) => a.or(b),
        };
        let (root_node_id, root_content) = resolve_root(&self.nodes, announced_root, announced);
        self.tree.root_node_id = root_node_id;
        self.tree.root_content = root_content;
    }
}

/// Root id and content for a node set. A root node held in the set wins
/// over an announced id; its content wins over announced content unless
/// it is still empty.
pub(crate) fn resolve_root(
    nodes: &BTreeMap<NodeId, Node>,
    announced_root: Option<NodeId>,
    announced_content: String,
) -> (Option<NodeId>, Option<String>) {
    let root = select_root(nodes.values().filter(|n| n.is_root));
    let root_id = root.map(|n| n.id.clone()).or(announced_root);
    let content = match root {
        Some(n) if !n.content.is_empty() => n.content.clone(),
        _ => announced_content,
    };
    let content = if content.is_empty() { None } else { Some(content) };
    (root_id, content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;
    use crate::model::ids::Address;
    use crate::model::node::Stamped;
    use crate::model::tree::Tree;

    fn addr() -> Address {
        Address::new("0xa")
    }

    fn node(id: &str, parent: Option<&str>, content: &str) -> Node {
        let mut n = Node::new(addr(), NodeId::new(id));
        n.parent = parent.map(NodeId::new);
        n.is_root = parent.is_none();
        n.base_content = content.to_string();
        n.refresh_content();
        n
    }

    fn view(nodes: Vec<Node>) -> TreeView {
        let mut v = TreeView::new(Tree::new(addr()));
        for n in nodes {
            v.insert(n);
        }
        v
    }

    fn update(block: u64, content: &str) -> NodeUpdateRecord {
        NodeUpdateRecord {
            position: EventPosition::new(block, 0),
            kind: EventKind::NodeUpdated,
            content: content.to_string(),
            updated_by: String::new(),
            timestamp: 0,
        }
    }

    #[test]
    fn node_sets_are_unioned() {
        let a = view(vec![node("1", None, "root"), node("2", Some("1"), "a")]);
        let b = view(vec![node("1", None, "root"), node("3", Some("1"), "b")]);
        let m = merge(&a, &b);
        assert_eq!(m.nodes.len(), 3);
        assert_eq!(m.tree.node_count, 3);
    }

    #[test]
    fn later_position_wins_content() {
        let mut older = node("1", None, "base");
        older.record_update(update(5, "old"));
        let mut newer = node("1", None, "base");
        newer.record_update(update(9, "new"));

        let m = merge(&view(vec![older]), &view(vec![newer]));
        let n = m.node(&NodeId::new("1")).expect("node");
        assert_eq!(n.content, "new");
        assert_eq!(n.history.len(), 2);
    }

    #[test]
    fn non_empty_beats_placeholder() {
        let mut pending = node("2", Some("1"), "");
        pending.content_pending = true;
        pending.created_at = Some(EventPosition::new(3, 0));
        let fetched = node("2", Some("1"), "fetched");

        let ab = merge(&view(vec![pending.clone()]), &view(vec![fetched.clone()]));
        let ba = merge(&view(vec![fetched]), &view(vec![pending]));
        assert_eq!(ab, ba);
        let n = ab.node(&NodeId::new("2")).expect("node");
        assert_eq!(n.content, "fetched");
        assert!(!n.content_pending);
        assert_eq!(n.created_at, Some(EventPosition::new(3, 0)));
    }

    #[test]
    fn snapshot_content_without_base_survives() {
        let mut snap = Node::new(addr(), NodeId::new("1"));
        snap.is_root = true;
        snap.content = "from query".into();
        let m = merge(&view(vec![snap]), &view(vec![]));
        assert_eq!(m.node(&NodeId::new("1")).expect("node").content, "from query");
        assert_eq!(m.tree.root_content.as_deref(), Some("from query"));
    }

    #[test]
    fn push_tree_adopts_pull_root() {
        let mut push = view(vec![node("5", Some("1"), "child")]);
        push.tree.root_content = Some("hello".into());
        push.tree.updated_at = 20;
        let mut pull = view(vec![node("1", None, "hello")]);
        pull.tree.root_node_id = Some(NodeId::new("1"));
        pull.tree.updated_at = 10;

        let m = merge(&pull, &push);
        assert_eq!(m.tree.root_node_id, Some(NodeId::new("1")));
        assert_eq!(m.tree.root_content.as_deref(), Some("hello"));
        assert!(m.contains(&NodeId::new("5")));
        assert_eq!(m.tree.updated_at, 20);
        assert_eq!(m.attached_ids().len(), 2);
    }

    #[test]
    fn merge_is_commutative_and_idempotent() {
        let mut a = view(vec![node("1", None, "r"), node("2", Some("1"), "x")]);
        a.tree.creator = "0xc".into();
        a.tree.created_at = 100;
        let mut linked = node("2", Some("1"), "");
        linked.token.owner = Some(Stamped::at(EventPosition::new(7, 1), "0xo".into()));
        let mut b = view(vec![linked, node("3", Some("2"), "y")]);
        b.tree.updated_at = 50;

        let ab = merge(&a, &b);
        assert_eq!(ab, merge(&b, &a));
        assert_eq!(merge(&ab, &b), ab);
        assert_eq!(merge(&ab, &ab), ab);
        assert_eq!(
            ab.node(&NodeId::new("2")).expect("node").token.owner(),
            Some("0xo")
        );
        assert_eq!(ab.tree.creator, "0xc");
    }

    #[test]
    fn later_tree_keeps_its_creator_and_announced_root() {
        let mut older = view(vec![]);
        older.tree.creator = "0xzz".into();
        older.tree.root_content = Some("stale".into());
        older.tree.root_node_id = Some(NodeId::new("1"));
        older.tree.updated_at = 10;
        let mut newer = view(vec![]);
        newer.tree.creator = "0xaa".into();
        newer.tree.root_content = Some("fresh".into());
        newer.tree.root_node_id = Some(NodeId::new("4"));
        newer.tree.updated_at = 30;

        let m = merge(&older, &newer);
        assert_eq!(m, merge(&newer, &older));
        assert_eq!(m.tree.creator, "0xaa");
        assert_eq!(m.tree.root_content.as_deref(), Some("fresh"));
        assert_eq!(m.tree.root_node_id, Some(NodeId::new("4")));
        assert_eq!(m.tree.updated_at, 30);

        // An empty creator on the later side does not erase the known one.
        newer.tree.creator.clear();
        assert_eq!(merge(&older, &newer).tree.creator, "0xzz");
    }

    #[test]
    fn mismatched_addresses_keep_greater() {
        let a = view(vec![node("1", None, "r")]);
        let mut b = TreeView::new(Tree::new(Address::new("0xb")));
        b.insert(node("9", None, "other"));
        let m = merge(&a, &b);
        assert_eq!(m.address().as_str(), "0xb");
        assert_eq!(merge(&b, &a), m);
    }

    #[test]
    fn earliest_known_creation_picks_origin() {
        let mut early = node("2", Some("1"), "");
        early.created_at = Some(EventPosition::new(1, 0));
        early.author = "0xearly".into();
        let mut late = node("2", Some("1"), "");
        late.created_at = Some(EventPosition::new(8, 0));
        late.author = "0xlate".into();

        let mut a = early.clone();
        a.merge(late.clone());
        let mut b = late;
        b.merge(early);
        assert_eq!(a, b);
        assert_eq!(a.author, "0xearly");
    }
}
