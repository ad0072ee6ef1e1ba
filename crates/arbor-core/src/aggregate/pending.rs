//! Bounded buffer for events that arrived before what they depend on.
//!
//! Each buffered event waits on one [`PendingTarget`]: the tree itself, a
//! node, or a token id. When the target shows up the builder takes every
//! waiter for it, in arrival order, and applies them.
//!
//! The buffer holds at most `capacity` events per tree. Past that, the
//! oldest buffered event is evicted and handed back to the caller, so no
//! tree can buffer without bound.

use std::collections::{BTreeMap, BTreeSet};

use crate::event::Event;
use crate::model::ids::NodeId;

/// What a buffered event is waiting for.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PendingTarget {
    /// The tree has not been created yet.
    Tree,
    /// The named node has not been created yet.
    Node(NodeId),
    /// No node has been minted with this token id yet.
    Token(String),
}

#[derive(Debug)]
pub struct PendingBuffer {
    capacity: usize,
    next_seq: u64,
    entries: BTreeMap<u64, (PendingTarget, Event)>,
    by_target: BTreeMap<PendingTarget, BTreeSet<u64>>,
    dropped_total: u64,
}

impl PendingBuffer {
    /// A buffer holding at most `capacity` events. A capacity of zero is
    /// raised to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            next_seq: 0,
            entries: BTreeMap::new(),
            by_target: BTreeMap::new(),
            dropped_total: 0,
        }
    }

    /// Buffer `event` until `target` exists.
    ///
    /// Returns the evicted event if the buffer was full.
    pub fn push(&mut self, target: PendingTarget, event: Event) -> Option<Event> {
        let evicted = if self.entries.len() >= self.capacity {
            self.evict_oldest()
        } else {
            None
        };

        let seq = self.next_seq;
        self.next_seq += 1;
        self.by_target.entry(target.clone()).or_default().insert(seq);
        self.entries.insert(seq, (target, event));
        evicted
    }

    /// Remove and return every event waiting on `target`, oldest first.
    pub fn take(&mut self, target: &PendingTarget) -> Vec<Event> {
        let Some(seqs) = self.by_target.remove(target) else {
            return Vec::new();
        };
        seqs.into_iter()
            .filter_map(|seq| self.entries.remove(&seq).map(|(_, event)| event))
            .collect()
    }

    fn evict_oldest(&mut self) -> Option<Event> {
        let (seq, (target, event)) = self.entries.pop_first()?;
        if let Some(seqs) = self.by_target.get_mut(&target) {
            seqs.remove(&seq);
            if seqs.is_empty() {
                self.by_target.remove(&target);
            }
        }
        self.dropped_total += 1;
        Some(event)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Events evicted over the buffer's lifetime.
    #[must_use]
    pub const fn dropped_total(&self) -> u64 {
        self.dropped_total
    }

    /// Number of events waiting on each target.
    #[must_use]
    pub fn waiting(&self) -> BTreeMap<PendingTarget, usize> {
        self.by_target
            .iter()
            .map(|(target, seqs)| (target.clone(), seqs.len()))
            .collect()
    }
}
