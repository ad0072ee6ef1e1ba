//! Domain events consumed by the projector.
//!
//! An [`Event`] is immutable. Its identity is the [`EventKey`]: the chain
//! position `(blockNumber, logIndex)` plus the event kind. The position
//! totally orders events on one chain; the block timestamp is carried for
//! display and statistics only and never participates in ordering.
//!
//! # Wire format
//!
//! One flat JSON object per line:
//!
//! ```text
//! {"kind":"NodeCreated","blockNumber":12,"logIndex":3,"timestamp":1700000000,
//!  "treeAddress":"0xa","nodeId":"0x2","parentId":"0x1","content":"hi"}
//! ```
//!
//! Parsing lines is handled by [`parser`].

pub mod data;
pub mod digest;
pub mod parser;
pub mod types;

pub use data::{
    ContentData, EventData, NftMintedData, NodeCreatedData, TokenBoundAccountData,
    TokenCreatedData, TransferData, TreeCreatedData,
};
pub use digest::EventDigest;
pub use types::{EventKind, UnknownEventKind};

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::model::ids::{Address, NodeId};

/// Position of an event on the chain. Ordered by block, then log index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPosition {
    pub block_number: u64,
    pub log_index: u32,
}

impl EventPosition {
    #[must_use]
    pub const fn new(block_number: u64, log_index: u32) -> Self {
        Self {
            block_number,
            log_index,
        }
    }
}

impl fmt::Display for EventPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.block_number, self.log_index)
    }
}

/// Identity of an event: its position and kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventKey {
    pub position: EventPosition,
    pub kind: EventKind,
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.kind, self.position)
    }
}

/// A single domain event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub block_number: u64,
    pub log_index: u32,
    /// Chain block time in seconds since the Unix epoch.
    #[serde(default)]
    pub timestamp: i64,
    pub tree_address: Address,
    #[serde(flatten)]
    pub data: EventData,
}

impl Event {
    /// Build an event at the given position.
    #[must_use]
    pub const fn new(
        position: EventPosition,
        timestamp: i64,
        tree_address: Address,
        data: EventData,
    ) -> Self {
        Self {
            block_number: position.block_number,
            log_index: position.log_index,
            timestamp,
            tree_address,
            data,
        }
    }

    #[must_use]
    pub const fn kind(&self) -> EventKind {
        self.data.kind()
    }

    #[must_use]
    pub const fn position(&self) -> EventPosition {
        EventPosition::new(self.block_number, self.log_index)
    }

    #[must_use]
    pub const fn key(&self) -> EventKey {
        EventKey {
            position: self.position(),
            kind: self.kind(),
        }
    }

    /// The node this event targets directly, if any.
    #[must_use]
    pub const fn node_id(&self) -> Option<&NodeId> {
        self.data.node_id()
    }

    /// Notification-worthy one-line summary of this event.
    #[must_use]
    pub fn digest(&self) -> EventDigest {
        EventDigest::of(self)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{}\t{}",
            self.position(),
            self.tree_address,
            self.digest().summary
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Event {
        Event::new(
            EventPosition::new(12, 3),
            1_700_000_000,
            Address::new("0xA"),
            EventData::NodeCreated(NodeCreatedData {
                node_id: NodeId::new("0x2"),
                parent_id: Some(NodeId::new("0x1")),
                author: "0xbob".into(),
                content: Some("hi".into()),
                model_id: String::new(),
                is_root: None,
                has_nft: false,
            }),
        )
    }

    #[test]
    fn positions_order_by_block_then_log() {
        let a = EventPosition::new(1, 9);
        let b = EventPosition::new(2, 0);
        let c = EventPosition::new(2, 1);
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn key_includes_kind() {
        let event = sample();
        assert_eq!(event.key().kind, EventKind::NodeCreated);
        assert_eq!(event.key().position, EventPosition::new(12, 3));
        assert_eq!(event.key().to_string(), "NodeCreated@12:3");
    }

    #[test]
    fn wire_format_is_flat() {
        let value = serde_json::to_value(sample()).expect("serialize");
        assert_eq!(value["kind"], "NodeCreated");
        assert_eq!(value["blockNumber"], 12);
        assert_eq!(value["logIndex"], 3);
        assert_eq!(value["treeAddress"], "0xa");
        assert_eq!(value["nodeId"], "0x2");
        assert_eq!(value["parentId"], "0x1");
    }

    #[test]
    fn parses_from_flat_json() {
        let event: Event = serde_json::from_value(json!({
            "kind": "TreeCreated",
            "blockNumber": 5,
            "logIndex": 0,
            "timestamp": 10,
            "treeAddress": "0xTREE",
            "creator": "0xalice",
            "rootContent": "hello"
        }))
        .expect("parse");
        assert_eq!(event.kind(), EventKind::TreeCreated);
        assert_eq!(event.tree_address.as_str(), "0xtree");
        let EventData::TreeCreated(d) = &event.data else {
            panic!("expected TreeCreated");
        };
        assert_eq!(d.root_content.as_deref(), Some("hello"));
    }

    #[test]
    fn serde_json_roundtrip() {
        let event = sample();
        let json = serde_json::to_string(&event).expect("serialize");
        let back: Event = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, event);
    }
}
