//! `Node`: one content node of a tree, plus its update history and token
//! linkage.
//!
//! A node's fields fall into three groups, each with its own convergence
//! rule:
//!
//! - **Origin** (parent, author, model, root flag, base content): written
//!   by `NodeCreated` and, for lightweight nodes, by a content lookup.
//! - **History**: one [`NodeUpdateRecord`] per content mutation, kept sorted
//!   by event position. Records are never rewritten once stored.
//! - **Token links**: position-stamped registers; the later position wins.
//!
//! The visible `content` is derived: the latest history record's content,
//! or the base content when there is no history. Because history is ordered
//! by position rather than arrival, the derived content is the same no
//! matter in which order updates were delivered.

use serde::{Deserialize, Serialize};

use crate::event::{EventKind, EventPosition};
use crate::model::ids::{Address, NodeId};

/// A value stamped with the position of the event that wrote it.
///
/// Ordered by position first, so `max` is last-writer-wins. A value with no
/// known position (from a query snapshot) loses to any positioned write.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Stamped<T> {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<EventPosition>,
    pub value: T,
}

impl<T> Stamped<T> {
    pub const fn at(position: EventPosition, value: T) -> Self {
        Self {
            position: Some(position),
            value,
        }
    }

    pub const fn unpositioned(value: T) -> Self {
        Self {
            position: None,
            value,
        }
    }
}

/// Write `candidate` into `slot` if it is newer than what is there.
pub fn stamp_max<T: Ord>(slot: &mut Option<Stamped<T>>, candidate: Stamped<T>) -> bool {
    match slot {
        Some(current) if *current >= candidate => false,
        _ => {
            *slot = Some(candidate);
            true
        }
    }
}

/// NFT and token linkage of a node.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenLinks {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_id: Option<Stamped<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_bound_account: Option<Stamped<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_token_contract: Option<Stamped<String>>,
    /// Current holder, as moved by transfers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<Stamped<String>>,
}

impl TokenLinks {
    #[must_use]
    pub fn token_id(&self) -> Option<&str> {
        self.token_id.as_ref().map(|s| s.value.as_str())
    }

    #[must_use]
    pub fn token_bound_account(&self) -> Option<&str> {
        self.token_bound_account.as_ref().map(|s| s.value.as_str())
    }

    #[must_use]
    pub fn node_token_contract(&self) -> Option<&str> {
        self.node_token_contract.as_ref().map(|s| s.value.as_str())
    }

    #[must_use]
    pub fn owner(&self) -> Option<&str> {
        self.owner.as_ref().map(|s| s.value.as_str())
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.token_id.is_none()
            && self.token_bound_account.is_none()
            && self.node_token_contract.is_none()
            && self.owner.is_none()
    }
}

/// Append-only history entry for one content mutation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeUpdateRecord {
    pub position: EventPosition,
    pub kind: EventKind,
    pub content: String,
    #[serde(default)]
    pub updated_by: String,
    #[serde(default)]
    pub timestamp: i64,
}

/// A history entry paired with the content it replaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentChange {
    pub position: EventPosition,
    pub kind: EventKind,
    pub old_content: String,
    pub new_content: String,
    pub updated_by: String,
}

/// A content node owned by exactly one tree.
///
/// Field order matters: the derived `Ord` is the last-resort tie-break when
/// two views of the same node are merged, and history and token links sort
/// last so that origin differences decide first.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub tree: Address,
    pub id: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<NodeId>,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub model_id: String,
    #[serde(default)]
    pub is_root: bool,
    #[serde(default, rename = "hasNFT")]
    pub has_nft: bool,
    /// Position of the creating event; `None` for query snapshots.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<EventPosition>,
    /// Content as created (or as fetched for lightweight nodes).
    #[serde(default)]
    pub base_content: String,
    /// The base content has not been fetched yet.
    #[serde(default)]
    pub content_pending: bool,
    /// Derived; see [`Node::refresh_content`].
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "TokenLinks::is_empty")]
    pub token: TokenLinks,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<NodeUpdateRecord>,
}

impl Node {
    /// A bare node with only identity set. Callers fill the rest.
    #[must_use]
    pub fn new(tree: Address, id: NodeId) -> Self {
        Self {
            tree,
            id,
            parent: None,
            author: String::new(),
            timestamp: 0,
            model_id: String::new(),
            is_root: false,
            has_nft: false,
            created_at: None,
            base_content: String::new(),
            content_pending: false,
            content: String::new(),
            token: TokenLinks::default(),
            history: Vec::new(),
        }
    }

    /// True for NFT-backed nodes, flagged at creation or linked to a token.
    #[must_use]
    pub const fn is_nft_backed(&self) -> bool {
        self.has_nft || self.token.token_id.is_some()
    }

    /// Position of the write behind the visible content, if known.
    #[must_use]
    pub fn content_position(&self) -> Option<EventPosition> {
        self.history.last().map(|r| r.position).or(self.created_at)
    }

    /// Insert a history record in position order.
    ///
    /// Returns `false` if a record at that position is already present.
    pub fn record_update(&mut self, record: NodeUpdateRecord) -> bool {
        match self
            .history
            .binary_search_by(|probe| probe.position.cmp(&record.position))
        {
            Ok(_) => false,
            Err(at) => {
                self.history.insert(at, record);
                self.refresh_content();
                true
            }
        }
    }

    /// Fill in base content from a content lookup.
    pub fn resolve_base(&mut self, content: String) {
        self.base_content = content;
        self.content_pending = false;
        self.refresh_content();
    }

    /// Recompute the visible content from base content and history.
    pub fn refresh_content(&mut self) {
        self.content = self
            .history
            .last()
            .map_or_else(|| self.base_content.clone(), |r| r.content.clone());
    }

    /// History entries paired with the content each one replaced.
    #[must_use]
    pub fn content_changes(&self) -> Vec<ContentChange> {
        let mut previous = self.base_content.as_str();
        self.history
            .iter()
            .map(|record| {
                let change = ContentChange {
                    position: record.position,
                    kind: record.kind,
                    old_content: previous.to_string(),
                    new_content: record.content.clone(),
                    updated_by: record.updated_by.clone(),
                };
                previous = record.content.as_str();
                change
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(block: u64, content: &str) -> NodeUpdateRecord {
        NodeUpdateRecord {
            position: EventPosition::new(block, 0),
            kind: EventKind::NodeUpdated,
            content: content.to_string(),
            updated_by: "0xeditor".to_string(),
            timestamp: 0,
        }
    }

    fn node() -> Node {
        let mut node = Node::new(Address::new("0xa"), NodeId::new("1"));
        node.created_at = Some(EventPosition::new(1, 0));
        node.base_content = "v1".to_string();
        node.refresh_content();
        node
    }

    #[test]
    fn later_position_wins_regardless_of_arrival() {
        let mut forward = node();
        forward.record_update(record(2, "v2"));
        forward.record_update(record(3, "v3"));

        let mut backward = node();
        backward.record_update(record(3, "v3"));
        backward.record_update(record(2, "v2"));

        assert_eq!(forward, backward);
        assert_eq!(forward.content, "v3");
        assert_eq!(forward.content_position(), Some(EventPosition::new(3, 0)));
    }

    #[test]
    fn duplicate_record_is_ignored() {
        let mut n = node();
        assert!(n.record_update(record(2, "v2")));
        assert!(!n.record_update(record(2, "v2")));
        assert_eq!(n.history.len(), 1);
    }

    #[test]
    fn content_changes_thread_previous_values() {
        let mut n = node();
        n.record_update(record(3, "v3"));
        n.record_update(record(2, "v2"));
        let changes = n.content_changes();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].old_content, "v1");
        assert_eq!(changes[0].new_content, "v2");
        assert_eq!(changes[1].old_content, "v2");
        assert_eq!(changes[1].new_content, "v3");
    }

    #[test]
    fn resolved_base_shows_until_first_update() {
        let mut n = Node::new(Address::new("0xa"), NodeId::new("2"));
        n.content_pending = true;
        n.resolve_base("fetched".to_string());
        assert!(!n.content_pending);
        assert_eq!(n.content, "fetched");
        n.record_update(record(9, "edited"));
        assert_eq!(n.content, "edited");
    }

    #[test]
    fn stamp_max_is_last_writer_wins() {
        let mut slot = None;
        assert!(stamp_max(&mut slot, Stamped::at(EventPosition::new(5, 0), "b".to_string())));
        assert!(!stamp_max(&mut slot, Stamped::at(EventPosition::new(4, 0), "a".to_string())));
        assert!(!stamp_max(&mut slot, Stamped::unpositioned("z".to_string())));
        assert_eq!(slot.map(|s| s.value), Some("b".to_string()));
    }
}
