//! Simulated observers and their external services.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};

use arbor_core::config::ProjectConfig;
use arbor_core::projector::PullSource;
use arbor_core::resolve::{ContentResolver, MapResolver};
use arbor_core::{Address, NodeId, Projector, TreeView};
use serde::{Deserialize, Serialize};

use crate::rng::DeterministicRng;

/// Stable identifier for a simulated observer.
pub type ObserverId = usize;

/// Final state of one observer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObserverState {
    pub id: ObserverId,
    pub views: BTreeMap<Address, TreeView>,
}

impl ObserverState {
    /// Fingerprint of each tree's view.
    #[must_use]
    pub fn fingerprints(&self) -> BTreeMap<Address, String> {
        self.views
            .iter()
            .map(|(tree, view)| (tree.clone(), view.fingerprint()))
            .collect()
    }

    #[must_use]
    pub fn capture(id: ObserverId, projector: &Projector) -> Self {
        let views = projector
            .trees()
            .into_iter()
            .filter_map(|tree| projector.snapshot(&tree).map(|v| (tree, v)))
            .collect();
        Self { id, views }
    }
}

/// Content lookup that fails a configurable share of calls.
pub struct FlakyResolver {
    inner: MapResolver,
    failure_percent: u8,
    rng: Mutex<DeterministicRng>,
}

impl FlakyResolver {
    #[must_use]
    pub const fn new(inner: MapResolver, failure_percent: u8, seed: u64) -> Self {
        Self {
            inner,
            failure_percent,
            rng: Mutex::new(DeterministicRng::new(seed)),
        }
    }
}

impl ContentResolver for FlakyResolver {
    fn get_node_content(&self, tree: &Address, node: &NodeId) -> anyhow::Result<String> {
        let fail = self
            .rng
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .hit_rate_percent(self.failure_percent);
        if fail {
            anyhow::bail!("simulated lookup failure for {tree}/{node}");
        }
        self.inner.get_node_content(tree, node)
    }
}

/// Pull-side query service. Serves the snapshot most recently published
/// for each tree.
#[derive(Default)]
pub struct QueryNode {
    views: Mutex<HashMap<Address, TreeView>>,
}

impl QueryNode {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, view: TreeView) {
        self.views
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(view.address().clone(), view);
    }
}

impl PullSource for QueryNode {
    fn fetch_tree(&self, tree: &Address) -> anyhow::Result<Option<TreeView>> {
        Ok(self
            .views
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(tree)
            .cloned())
    }
}

/// An observer: a projector fed by its own push channel.
pub struct Observer {
    pub id: ObserverId,
    pub projector: Projector,
}

impl Observer {
    #[must_use]
    pub fn new(
        id: ObserverId,
        config: ProjectConfig,
        resolver: Arc<dyn ContentResolver>,
        pull: Arc<dyn PullSource>,
    ) -> Self {
        Self {
            id,
            projector: Projector::new(config)
                .with_resolver(resolver)
                .with_pull_source(pull),
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> ObserverState {
        ObserverState::capture(self.id, &self.projector)
    }
}
