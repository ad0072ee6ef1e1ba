//! Tree aggregate builder.
//!
//! A [`TreeBuilder`] owns the materialized state of one tree: the [`Tree`]
//! root record, its nodes, the parent/child index used for attachment, and
//! the bounded buffer of events that arrived too early.
//!
//! [`TreeBuilder::apply`] takes one event the ledger has accepted and folds
//! it in. Events that depend on something not yet present are parked:
//!
//! | Event                      | Waits on                                 |
//! |----------------------------|------------------------------------------|
//! | anything but `TreeCreated` | the tree                                 |
//! | `NodeUpdated`, `MetadataSet`, `NFTMinted`, `TokenCreated`, `TokenBoundAccountCreated` | the node |
//! | `Transfer`                 | the node, or a node minted with its token |
//!
//! When the missing piece arrives, its waiters are applied in the same
//! call. A node whose parent is missing is *not* parked; it is stored and
//! counted but stays unattached until its ancestry reaches a root, at which
//! point the whole waiting subtree attaches in one pass.
//!
//! Content lookups are not made here. The builder reports lightweight nodes
//! in [`AggregateDelta::needs_content`]; the caller resolves them without
//! holding the tree lock and hands the result back through
//! [`TreeBuilder::resolve_content`].
//!
//! Applying the same set of events in any order yields the same state, as
//! long as no buffered event was evicted along the way.

mod delta;
mod pending;

pub use delta::AggregateDelta;
pub use pending::{PendingBuffer, PendingTarget};

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::ErrorCode;
use crate::event::{
    ContentData, Event, EventData, EventKind, EventPosition, NftMintedData, NodeCreatedData,
    TokenBoundAccountData, TokenCreatedData, TransferData, TreeCreatedData,
};
use crate::merge::{Merge, select_root};
use crate::model::ids::{Address, NodeId};
use crate::model::node::{Node, NodeUpdateRecord, Stamped, stamp_max};
use crate::model::tree::{Tree, TreeView};
use crate::resolve::Resolution;

/// Per-tree counters surfaced for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuilderDiagnostics {
    pub tree_known: bool,
    pub nodes: usize,
    pub pending_parent: usize,
    pub content_pending: usize,
    pub buffered: usize,
    pub dropped: u64,
}

enum Outcome {
    Applied,
    Waiting(PendingTarget),
}

/// Materialized state of a single tree.
#[derive(Debug)]
pub struct TreeBuilder {
    address: Address,
    tree: Option<Tree>,
    /// Position of the `TreeCreated` the tree fields were taken from.
    tree_origin: Option<EventPosition>,
    /// Root content announced by `TreeCreated`.
    announced_root: String,
    nodes: BTreeMap<NodeId, Node>,
    /// parent -> children, for every node that names a parent.
    children: BTreeMap<NodeId, BTreeSet<NodeId>>,
    attached: BTreeSet<NodeId>,
    root_ids: BTreeSet<NodeId>,
    counted: BTreeSet<NodeId>,
    /// token id -> node it was minted for.
    tokens: BTreeMap<String, NodeId>,
    pending: PendingBuffer,
}

impl TreeBuilder {
    #[must_use]
    pub fn new(address: Address, max_buffered_events: usize) -> Self {
        Self {
            address,
            tree: None,
            tree_origin: None,
            announced_root: String::new(),
            nodes: BTreeMap::new(),
            children: BTreeMap::new(),
            attached: BTreeSet::new(),
            root_ids: BTreeSet::new(),
            counted: BTreeSet::new(),
            tokens: BTreeMap::new(),
            pending: PendingBuffer::new(max_buffered_events),
        }
    }

    #[must_use]
    pub const fn address(&self) -> &Address {
        &self.address
    }

    /// The tree record, once `TreeCreated` has been applied.
    #[must_use]
    pub const fn tree(&self) -> Option<&Tree> {
        self.tree.as_ref()
    }

    #[must_use]
    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    #[must_use]
    pub fn is_attached(&self, id: &NodeId) -> bool {
        self.attached.contains(id)
    }

    /// Nodes stored but not yet reachable from a root.
    #[must_use]
    pub fn pending_parent_ids(&self) -> Vec<NodeId> {
        self.nodes
            .keys()
            .filter(|id| !self.attached.contains(*id))
            .cloned()
            .collect()
    }

    /// Snapshot of the tree and its nodes. `None` until the tree exists.
    #[must_use]
    pub fn view(&self) -> Option<TreeView> {
        let tree = self.tree.clone()?;
        Some(TreeView {
            tree,
            nodes: self.nodes.clone(),
        })
    }

    #[must_use]
    pub fn diagnostics(&self) -> BuilderDiagnostics {
        BuilderDiagnostics {
            tree_known: self.tree.is_some(),
            nodes: self.nodes.len(),
            pending_parent: self.nodes.len() - self.attached.len(),
            content_pending: self.nodes.values().filter(|n| n.content_pending).count(),
            buffered: self.pending.len(),
            dropped: self.pending.dropped_total(),
        }
    }

    /// Fold one accepted event into the aggregate.
    pub fn apply(&mut self, event: Event) -> AggregateDelta {
        let mut delta = AggregateDelta::default();
        if event.tree_address != self.address {
            warn!(
                tree = %self.address,
                event_tree = %event.tree_address,
                event = %event.key(),
                "event routed to the wrong tree; ignored"
            );
            return delta;
        }

        let mut work = VecDeque::from([event]);
        while let Some(event) = work.pop_front() {
            self.apply_one(event, &mut delta, &mut work);
        }
        self.sync_root();
        delta
    }

    /// Apply the outcome of a content lookup for a lightweight node.
    ///
    /// Returns `true` if the node's content changed. Unavailable content
    /// leaves the node pending; it will be requested again the next time an
    /// event touches it.
    pub fn resolve_content(&mut self, id: &NodeId, resolution: Resolution) -> bool {
        let Some(node) = self.nodes.get_mut(id) else {
            return false;
        };
        if !node.content_pending {
            return false;
        }
        match resolution {
            Resolution::Content(content) => {
                node.resolve_base(content);
                self.sync_root();
                true
            }
            Resolution::Unavailable(_) => false,
        }
    }

    // -----------------------------------------------------------------------
    // Dispatch
    // -----------------------------------------------------------------------

    fn apply_one(&mut self, event: Event, delta: &mut AggregateDelta, work: &mut VecDeque<Event>) {
        let outcome = match (&event.data, self.tree.is_some()) {
            (EventData::TreeCreated(d), _) => self.apply_tree_created(&event, d, delta, work),
            (_, false) => Outcome::Waiting(PendingTarget::Tree),
            (EventData::NodeCreated(d), true) => self.apply_node_created(&event, d, delta, work),
            (EventData::NodeUpdated(d) | EventData::MetadataSet(d), true) => {
                self.apply_content(&event, d, delta)
            }
            (EventData::NftMinted(d), true) => self.apply_minted(&event, d, delta, work),
            (EventData::TokenCreated(d), true) => self.apply_token_contract(&event, d, delta),
            (EventData::TokenBoundAccountCreated(d), true) => {
                self.apply_bound_account(&event, d, delta, work)
            }
            (EventData::Transfer(d), true) => self.apply_transfer(&event, d, delta),
        };

        match outcome {
            Outcome::Applied => {
                if let Some(tree) = self.tree.as_mut() {
                    tree.touch(event.timestamp);
                }
                debug!(tree = %self.address, event = %event.key(), "applied event");
                delta.applied.push(event.key());
            }
            Outcome::Waiting(target) => self.park(target, event, delta),
        }
    }

    fn park(&mut self, target: PendingTarget, event: Event, delta: &mut AggregateDelta) {
        let code = if target == PendingTarget::Tree {
            ErrorCode::TreeNotFound
        } else {
            ErrorCode::UnresolvedParent
        };
        debug!(
            code = %code,
            tree = %self.address,
            event = %event.key(),
            waiting_on = ?target,
            "buffering event"
        );
        delta.buffered.push(event.key());

        if let Some(dropped) = self.pending.push(target, event) {
            warn!(
                code = %ErrorCode::BufferOverflow,
                tree = %self.address,
                event = %dropped.key(),
                capacity = self.pending.capacity(),
                "pending buffer full; dropped oldest buffered event"
            );
            delta.dropped.push(dropped.key());
        }
    }

    // -----------------------------------------------------------------------
    // Tree
    // -----------------------------------------------------------------------

    fn apply_tree_created(
        &mut self,
        event: &Event,
        d: &TreeCreatedData,
        delta: &mut AggregateDelta,
        work: &mut VecDeque<Event>,
    ) -> Outcome {
        let position = event.position();
        match self.tree.as_mut() {
            None => {
                let mut tree = Tree::new(self.address.clone());
                tree.creator.clone_from(&d.creator);
                tree.created_at = event.timestamp;
                self.tree = Some(tree);
                self.tree_origin = Some(position);
                self.announced_root = d.root_content.clone().unwrap_or_default();
                delta.tree_created = true;
                work.extend(self.pending.take(&PendingTarget::Tree));
            }
            // Seen twice under different positions: the earliest one names
            // the creator.
            Some(tree) if self.tree_origin.is_none_or(|origin| position < origin) => {
                tree.creator.clone_from(&d.creator);
                tree.created_at = event.timestamp;
                self.tree_origin = Some(position);
                self.announced_root = d.root_content.clone().unwrap_or_default();
            }
            Some(_) => {}
        }
        Outcome::Applied
    }

    fn sync_root(&mut self) {
        let Some(tree) = self.tree.as_mut() else {
            return;
        };
        let root = select_root(self.root_ids.iter().filter_map(|id| self.nodes.get(id)));
        tree.root_node_id = root.map(|n| n.id.clone());
        let content = root
            .map(|n| n.content.as_str())
            .filter(|c| !c.is_empty())
            .unwrap_or(&self.announced_root);
        tree.root_content = (!content.is_empty()).then(|| content.to_string());
    }

    // -----------------------------------------------------------------------
    // Nodes
    // -----------------------------------------------------------------------

    fn node_from_create(&self, event: &Event, d: &NodeCreatedData) -> Node {
        let mut node = Node::new(self.address.clone(), d.node_id.clone());
        node.parent.clone_from(&d.parent_id);
        node.author.clone_from(&d.author);
        node.timestamp = event.timestamp;
        node.model_id.clone_from(&d.model_id);
        node.is_root = d.is_root();
        node.has_nft = d.has_nft;
        node.created_at = Some(event.position());
        if d.lacks_content() {
            // NFT-backed nodes get their content from the mint event.
            node.content_pending = !d.has_nft;
        } else {
            node.base_content = d.content.clone().unwrap_or_default();
        }
        node.refresh_content();
        node
    }

    fn apply_node_created(
        &mut self,
        event: &Event,
        d: &NodeCreatedData,
        delta: &mut AggregateDelta,
        work: &mut VecDeque<Event>,
    ) -> Outcome {
        let candidate = self.node_from_create(event, d);
        let id = d.node_id.clone();

        if let Some(existing) = self.nodes.get_mut(&id) {
            let before = existing.clone();
            existing.merge(candidate);
            if existing.content_pending {
                delta.note_needs_content(&id);
            }
            if *existing != before {
                delta.note_updated(&id);
            }
            if (&existing.parent, existing.is_root) != (&before.parent, before.is_root) {
                self.rebuild_attachment(delta);
            }
            return Outcome::Applied;
        }

        if self.counted.insert(id.clone()) {
            let count = self.counted.len();
            if let Some(tree) = self.tree.as_mut() {
                tree.node_count = count;
            }
        }
        if candidate.content_pending {
            delta.note_needs_content(&id);
        }
        if candidate.is_root {
            self.root_ids.insert(id.clone());
        }
        let parent = candidate.parent.clone();
        let reachable = candidate.is_root
            || parent.as_ref().is_some_and(|p| self.attached.contains(p));
        if let Some(parent) = parent.clone() {
            self.children.entry(parent).or_default().insert(id.clone());
        }
        self.nodes.insert(id.clone(), candidate);
        delta.created.push(id.clone());

        if reachable {
            self.attach_from(id.clone(), delta);
        } else {
            debug!(
                code = %ErrorCode::UnresolvedParent,
                tree = %self.address,
                node = %id,
                parent = ?parent,
                "node waiting for its parent"
            );
        }

        work.extend(self.pending.take(&PendingTarget::Node(id)));
        Outcome::Applied
    }

    /// Attach `start` and every waiting descendant.
    fn attach_from(&mut self, start: NodeId, delta: &mut AggregateDelta) {
        let mut queue = VecDeque::from([start]);
        while let Some(id) = queue.pop_front() {
            if !self.attached.insert(id.clone()) {
                continue;
            }
            if let Some(children) = self.children.get(&id) {
                queue.extend(children.iter().cloned());
            }
            delta.attached.push(id);
        }
    }

    /// Recompute the child index and attachment after a node's parent
    /// changed.
    fn rebuild_attachment(&mut self, delta: &mut AggregateDelta) {
        let before = std::mem::take(&mut self.attached);
        self.children.clear();
        self.root_ids.clear();
        for node in self.nodes.values() {
            if let Some(parent) = &node.parent {
                self.children
                    .entry(parent.clone())
                    .or_default()
                    .insert(node.id.clone());
            }
            if node.is_root {
                self.root_ids.insert(node.id.clone());
            }
        }

        let mut scratch = AggregateDelta::default();
        for root in self.root_ids.clone() {
            self.attach_from(root, &mut scratch);
        }
        delta
            .attached
            .extend(scratch.attached.into_iter().filter(|id| !before.contains(id)));
    }

    fn apply_content(
        &mut self,
        event: &Event,
        d: &ContentData,
        delta: &mut AggregateDelta,
    ) -> Outcome {
        let Some(node) = self.nodes.get_mut(&d.node_id) else {
            return Outcome::Waiting(PendingTarget::Node(d.node_id.clone()));
        };
        let record = NodeUpdateRecord {
            position: event.position(),
            kind: event.kind(),
            content: d.content.clone(),
            updated_by: d.updated_by.clone().unwrap_or_default(),
            timestamp: event.timestamp,
        };
        if node.record_update(record) {
            delta.note_updated(&d.node_id);
        }
        if node.content_pending {
            delta.note_needs_content(&d.node_id);
        }
        Outcome::Applied
    }

    // -----------------------------------------------------------------------
    // Token linkage
    // -----------------------------------------------------------------------

    fn apply_minted(
        &mut self,
        event: &Event,
        d: &NftMintedData,
        delta: &mut AggregateDelta,
        work: &mut VecDeque<Event>,
    ) -> Outcome {
        let Some(node) = self.nodes.get_mut(&d.node_id) else {
            return Outcome::Waiting(PendingTarget::Node(d.node_id.clone()));
        };
        let position = event.position();
        let mut changed =
            stamp_max(&mut node.token.token_id, Stamped::at(position, d.token_id.clone()));
        if let Some(owner) = &d.owner {
            changed |= stamp_max(&mut node.token.owner, Stamped::at(position, owner.clone()));
        }
        if let Some(content) = d.content.as_ref().filter(|c| !c.is_empty()) {
            changed |= node.record_update(NodeUpdateRecord {
                position,
                kind: EventKind::NftMinted,
                content: content.clone(),
                updated_by: d.owner.clone().unwrap_or_default(),
                timestamp: event.timestamp,
            });
        }
        if node.content_pending {
            delta.note_needs_content(&d.node_id);
        }
        if changed {
            delta.note_updated(&d.node_id);
        }

        self.tokens.insert(d.token_id.clone(), d.node_id.clone());
        work.extend(self.pending.take(&PendingTarget::Token(d.token_id.clone())));
        Outcome::Applied
    }

    fn apply_token_contract(
        &mut self,
        event: &Event,
        d: &TokenCreatedData,
        delta: &mut AggregateDelta,
    ) -> Outcome {
        let Some(node) = self.nodes.get_mut(&d.node_id) else {
            return Outcome::Waiting(PendingTarget::Node(d.node_id.clone()));
        };
        let stamped = Stamped::at(event.position(), d.node_token_contract.clone());
        if stamp_max(&mut node.token.node_token_contract, stamped) {
            delta.note_updated(&d.node_id);
        }
        if node.content_pending {
            delta.note_needs_content(&d.node_id);
        }
        Outcome::Applied
    }

    fn apply_bound_account(
        &mut self,
        event: &Event,
        d: &TokenBoundAccountData,
        delta: &mut AggregateDelta,
        work: &mut VecDeque<Event>,
    ) -> Outcome {
        let Some(node) = self.nodes.get_mut(&d.node_id) else {
            return Outcome::Waiting(PendingTarget::Node(d.node_id.clone()));
        };
        let position = event.position();
        let mut changed = stamp_max(
            &mut node.token.token_bound_account,
            Stamped::at(position, d.token_bound_account.clone()),
        );
        if let Some(token_id) = &d.token_id {
            changed |= stamp_max(&mut node.token.token_id, Stamped::at(position, token_id.clone()));
        }
        if node.content_pending {
            delta.note_needs_content(&d.node_id);
        }
        if changed {
            delta.note_updated(&d.node_id);
        }

        if let Some(token_id) = &d.token_id {
            self.tokens.insert(token_id.clone(), d.node_id.clone());
            work.extend(self.pending.take(&PendingTarget::Token(token_id.clone())));
        }
        Outcome::Applied
    }

    fn apply_transfer(
        &mut self,
        event: &Event,
        d: &TransferData,
        delta: &mut AggregateDelta,
    ) -> Outcome {
        let target = match (&d.node_id, &d.token_id) {
            (Some(id), _) => id.clone(),
            (None, Some(token)) => match self.tokens.get(token) {
                Some(id) => id.clone(),
                None => return Outcome::Waiting(PendingTarget::Token(token.clone())),
            },
            (None, None) => {
                debug!(
                    tree = %self.address,
                    event = %event.key(),
                    "transfer names neither node nor token; nothing to link"
                );
                return Outcome::Applied;
            }
        };

        let Some(node) = self.nodes.get_mut(&target) else {
            return Outcome::Waiting(PendingTarget::Node(target));
        };
        if stamp_max(&mut node.token.owner, Stamped::at(event.position(), d.to.clone())) {
            delta.note_updated(&target);
        }
        if node.content_pending {
            delta.note_needs_content(&target);
        }
        Outcome::Applied
    }
}
