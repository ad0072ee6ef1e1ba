//! Event ledger: de-duplication by event identity.
//!
//! The ledger remembers every accepted [`EventKey`] per tree. An event whose
//! key was already accepted is reported as a duplicate and must not reach
//! the aggregate builder. Arrival order is irrelevant here; the builder
//! tolerates any order.
//!
//! Keys are scoped by tree address. Chain positions are unique across the
//! whole chain, so this is a refinement of chain-wide de-duplication, and
//! it keeps synthetic import events (which all live in block 0) of
//! different trees apart.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::event::{Event, EventKey};
use crate::model::ids::Address;

/// Outcome of offering an event to the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestStatus {
    Accepted,
    DuplicateIgnored,
}

/// Resume point exposed for checkpointing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    /// Highest block number among accepted events.
    pub max_block: Option<u64>,
    pub accepted: u64,
    pub duplicates: u64,
}

#[derive(Debug, Default)]
pub struct EventLedger {
    seen: HashMap<Address, BTreeSet<EventKey>>,
    max_block: Option<u64>,
    accepted: u64,
    duplicates: u64,
}

impl EventLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer an event. Accepted events are recorded; repeats are not.
    pub fn ingest(&mut self, event: &Event) -> IngestStatus {
        let keys = self.seen.entry(event.tree_address.clone()).or_default();
        if !keys.insert(event.key()) {
            self.duplicates += 1;
            return IngestStatus::DuplicateIgnored;
        }

        self.accepted += 1;
        self.max_block = Some(
            self.max_block
                .map_or(event.block_number, |m| m.max(event.block_number)),
        );
        IngestStatus::Accepted
    }

    /// Forget an accepted key so that a redelivery is accepted again.
    ///
    /// Used when a bounded buffer drops an event before it was applied.
    /// The max block is left as is; it only ever moves forward.
    pub fn forget(&mut self, tree: &Address, key: &EventKey) -> bool {
        let removed = self
            .seen
            .get_mut(tree)
            .is_some_and(|keys| keys.remove(key));
        if removed {
            self.accepted = self.accepted.saturating_sub(1);
        }
        removed
    }

    #[must_use]
    pub fn contains(&self, tree: &Address, key: &EventKey) -> bool {
        self.seen.get(tree).is_some_and(|keys| keys.contains(key))
    }

    /// One past the highest log index accepted for `tree` in `block`, or 0.
    #[must_use]
    pub fn next_log_index(&self, tree: &Address, block: u64) -> u32 {
        self.keys(tree)
            .filter(|key| key.position.block_number == block)
            .map(|key| key.position.log_index.saturating_add(1))
            .max()
            .unwrap_or(0)
    }

    #[must_use]
    pub const fn max_block(&self) -> Option<u64> {
        self.max_block
    }

    /// Accepted keys for a tree, in position order.
    pub fn keys(&self, tree: &Address) -> impl Iterator<Item = &EventKey> {
        self.seen.get(tree).into_iter().flatten()
    }

    #[must_use]
    pub const fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            max_block: self.max_block,
            accepted: self.accepted,
            duplicates: self.duplicates,
        }
    }
}
