//! The projector: ledger, per-tree builders and the two producers.
//!
//! # Locking
//!
//! Each tree has its own slot behind a `Mutex`, and every mutation of a
//! tree (applying an event, applying a content lookup, merging a pull
//! snapshot) happens under that slot's lock. Different trees never contend
//! beyond the short map lookup. The ledger lock is only ever taken while
//! holding a slot lock or on its own, never the other way round.
//!
//! Calls that cross the external boundary (content lookups and pull
//! refreshes) run with a bounded wait and never hold a slot lock. The lock
//! is taken again only to apply the result.
//!
//! Poisoned locks are recovered rather than propagated: every mutation
//! leaves the aggregate consistent between events.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

use crate::aggregate::{AggregateDelta, BuilderDiagnostics, TreeBuilder};
use crate::bounded::call_with_timeout;
use crate::config::ProjectConfig;
use crate::error::ErrorCode;
use crate::event::{Event, EventDigest, EventPosition};
use crate::ledger::{Checkpoint, EventLedger, IngestStatus};
use crate::merge::{Merge, merge_opt};
use crate::model::ids::{Address, NodeId};
use crate::model::tree::TreeView;
use crate::resolve::{BoundedResolver, ContentResolver};
use crate::selection::SelectionMemory;
use crate::stats::ActivityStats;

/// Pull-style producer: a query snapshot of one tree.
pub trait PullSource: Send + Sync {
    /// Fetch the current snapshot, or `None` if the source does not know
    /// the tree.
    ///
    /// # Errors
    ///
    /// Any transport or decoding failure.
    fn fetch_tree(&self, tree: &Address) -> anyhow::Result<Option<TreeView>>;
}

/// Result of offering one event to the projector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    Accepted {
        digest: EventDigest,
        delta: AggregateDelta,
    },
    Duplicate,
}

impl IngestOutcome {
    #[must_use]
    pub const fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }
}

/// Totals over a batch of ingested events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectionStats {
    pub accepted: usize,
    pub duplicates: usize,
    pub buffered: usize,
    pub dropped: usize,
    /// One digest per accepted event, in ingest order.
    #[serde(skip)]
    pub digests: Vec<EventDigest>,
}

/// What a pull refresh did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Pull is switched off or no source is configured.
    Disabled,
    /// The source does not know the tree.
    Absent,
    Merged,
    Failed(String),
}

#[derive(Debug)]
struct TreeSlot {
    builder: TreeBuilder,
    pull: Option<TreeView>,
}

impl TreeSlot {
    fn merged_view(&self) -> Option<TreeView> {
        merge_opt(self.pull.as_ref(), self.builder.view().as_ref())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct Projector {
    config: ProjectConfig,
    ledger: Mutex<EventLedger>,
    slots: RwLock<HashMap<Address, Arc<Mutex<TreeSlot>>>>,
    resolver: Option<BoundedResolver>,
    pull: Option<Arc<dyn PullSource>>,
    selection: Mutex<SelectionMemory>,
    stats: Mutex<ActivityStats>,
}

impl std::fmt::Debug for Projector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Projector")
            .field("config", &self.config)
            .field("resolver", &self.resolver)
            .field("pull", &self.pull.is_some())
            .finish_non_exhaustive()
    }
}

impl Default for Projector {
    fn default() -> Self {
        Self::new(ProjectConfig::default())
    }
}

impl Projector {
    #[must_use]
    pub fn new(config: ProjectConfig) -> Self {
        Self {
            config,
            ledger: Mutex::new(EventLedger::new()),
            slots: RwLock::new(HashMap::new()),
            resolver: None,
            pull: None,
            selection: Mutex::new(SelectionMemory::new()),
            stats: Mutex::new(ActivityStats::new()),
        }
    }

    /// Use `resolver` for lightweight node content.
    #[must_use]
    pub fn with_resolver(mut self, resolver: Arc<dyn ContentResolver>) -> Self {
        self.resolver = Some(BoundedResolver::new(resolver, self.config.resolver.timeout()));
        self
    }

    /// Use `source` as the pull-side producer. It is only consulted when
    /// `pull.enabled` is set.
    #[must_use]
    pub fn with_pull_source(mut self, source: Arc<dyn PullSource>) -> Self {
        self.pull = Some(source);
        self
    }

    #[must_use]
    pub const fn config(&self) -> &ProjectConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Push side
    // -----------------------------------------------------------------------

    /// Offer one event from the push channel.
    ///
    /// The ledger check, the apply and the forgetting of dropped keys all
    /// happen under the tree's slot lock, so a redelivery of a dropped
    /// event can only be checked once its key is gone.
    pub fn ingest(&self, event: Event) -> IngestOutcome {
        let tree = event.tree_address.clone();
        let slot = self.slot(&tree);
        let mut guard = lock(&slot);

        if lock(&self.ledger).ingest(&event) == IngestStatus::DuplicateIgnored {
            debug!(code = %ErrorCode::DuplicateEvent, tree = %tree, event = %event.key(), "duplicate ignored");
            return IngestOutcome::Duplicate;
        }

        let digest = event.digest();
        lock(&self.stats).record(&event);

        let delta = guard.builder.apply(event);
        if !delta.dropped.is_empty() {
            let mut ledger = lock(&self.ledger);
            for key in &delta.dropped {
                ledger.forget(&tree, key);
            }
        }
        drop(guard);
        self.resolve_content(&tree, &slot, &delta.needs_content);

        IngestOutcome::Accepted { digest, delta }
    }

    /// Offer a batch of events, in order.
    pub fn ingest_all(&self, events: impl IntoIterator<Item = Event>) -> ProjectionStats {
        let mut stats = ProjectionStats::default();
        for event in events {
            match self.ingest(event) {
                IngestOutcome::Accepted { digest, delta } => {
                    stats.accepted += 1;
                    stats.buffered += delta.buffered.len();
                    stats.dropped += delta.dropped.len();
                    stats.digests.push(digest);
                }
                IngestOutcome::Duplicate => stats.duplicates += 1,
            }
        }
        stats
    }

    /// Look up content for every node of `tree` still marked pending.
    ///
    /// Returns the number of nodes whose content arrived.
    pub fn retry_pending_content(&self, tree: &Address) -> usize {
        let Some(slot) = self.existing_slot(tree) else {
            return 0;
        };
        let pending: Vec<NodeId> = lock(&slot)
            .builder
            .view()
            .map(|v| v.content_pending_ids())
            .unwrap_or_default();
        self.resolve_content(tree, &slot, &pending)
    }

    fn resolve_content(&self, tree: &Address, slot: &Mutex<TreeSlot>, ids: &[NodeId]) -> usize {
        let Some(resolver) = &self.resolver else {
            return 0;
        };
        let mut resolved = 0;
        for id in ids {
            // No slot lock is held across the lookup.
            let resolution = resolver.resolve(tree, id);
            if lock(slot).builder.resolve_content(id, resolution) {
                resolved += 1;
            }
        }
        resolved
    }

    // -----------------------------------------------------------------------
    // Pull side
    // -----------------------------------------------------------------------

    /// Fetch a pull snapshot for `tree` and merge it into the stored one.
    pub fn refresh(&self, tree: &Address) -> RefreshOutcome {
        let Some(source) = self.pull.as_ref().filter(|_| self.config.pull.enabled) else {
            return RefreshOutcome::Disabled;
        };
        let timeout: Duration = self.config.pull.timeout();
        let source = Arc::clone(source);
        let target = tree.clone();

        let fetched = match call_with_timeout(timeout, move || source.fetch_tree(&target)) {
            Ok(Ok(view)) => view,
            Ok(Err(e)) => return refresh_failed(tree, &format!("{e:#}")),
            Err(e) => return refresh_failed(tree, &e.to_string()),
        };
        let Some(view) = fetched else {
            return RefreshOutcome::Absent;
        };
        if view.address() != tree {
            return refresh_failed(tree, &format!("source returned tree {}", view.address()));
        }

        let slot = self.slot(tree);
        let mut guard = lock(&slot);
        match guard.pull.as_mut() {
            Some(existing) => existing.merge(view),
            None => guard.pull = Some(view),
        }
        RefreshOutcome::Merged
    }

    // -----------------------------------------------------------------------
    // Readers
    // -----------------------------------------------------------------------

    /// Merged pull and push view of one tree.
    #[must_use]
    pub fn snapshot(&self, tree: &Address) -> Option<TreeView> {
        let slot = self.existing_slot(tree)?;
        let guard = lock(&slot);
        guard.merged_view()
    }

    /// Addresses of every tree seen so far, sorted.
    #[must_use]
    pub fn trees(&self) -> Vec<Address> {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        let mut trees: Vec<Address> = slots.keys().cloned().collect();
        trees.sort();
        trees
    }

    #[must_use]
    pub fn diagnostics(&self, tree: &Address) -> Option<BuilderDiagnostics> {
        let slot = self.existing_slot(tree)?;
        let guard = lock(&slot);
        Some(guard.builder.diagnostics())
    }

    /// Whether `TreeCreated` has been applied for `tree`.
    #[must_use]
    pub fn knows_tree(&self, tree: &Address) -> bool {
        self.existing_slot(tree).is_some_and(|slot| {
            let guard = lock(&slot);
            guard.builder.tree().is_some()
        })
    }

    /// Whether either producer has created node `id` in `tree`.
    #[must_use]
    pub fn has_node(&self, tree: &Address, id: &NodeId) -> bool {
        self.existing_slot(tree).is_some_and(|slot| {
            let guard = lock(&slot);
            guard.builder.node(id).is_some()
                || guard.pull.as_ref().is_some_and(|view| view.contains(id))
        })
    }

    /// Next free position for a synthetic node of `tree`. Synthetic events
    /// live in block 0 and index 0 belongs to the tree creation.
    #[must_use]
    pub fn next_import_position(&self, tree: &Address) -> EventPosition {
        let index = lock(&self.ledger).next_log_index(tree, 0).max(1);
        EventPosition::new(0, index)
    }

    #[must_use]
    pub fn checkpoint(&self) -> Checkpoint {
        lock(&self.ledger).checkpoint()
    }

    #[must_use]
    pub fn stats(&self) -> ActivityStats {
        lock(&self.stats).clone()
    }

    pub fn remember_selection(&self, tree: Address, node: NodeId) {
        lock(&self.selection).remember(tree, node);
    }

    /// The remembered selection for `tree`, if that node is in the current
    /// merged view.
    #[must_use]
    pub fn recall_selection(&self, tree: &Address) -> Option<NodeId> {
        let view = self.snapshot(tree);
        lock(&self.selection).recall(tree, view.as_ref())
    }

    fn existing_slot(&self, tree: &Address) -> Option<Arc<Mutex<TreeSlot>>> {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        slots.get(tree).cloned()
    }

    fn slot(&self, tree: &Address) -> Arc<Mutex<TreeSlot>> {
        if let Some(slot) = self.existing_slot(tree) {
            return slot;
        }
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        let capacity = self.config.buffer.max_buffered_events;
        Arc::clone(slots.entry(tree.clone()).or_insert_with(|| {
            Arc::new(Mutex::new(TreeSlot {
                builder: TreeBuilder::new(tree.clone(), capacity),
                pull: None,
            }))
        }))
    }
}

fn refresh_failed(tree: &Address, reason: &str) -> RefreshOutcome {
    warn!(tree = %tree, reason, "pull refresh failed; keeping previous snapshot");
    RefreshOutcome::Failed(reason.to_string())
}
