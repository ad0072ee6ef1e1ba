use serde::Serialize;

use crate::event::EventKey;
use crate::model::ids::NodeId;

/// What one call to [`super::TreeBuilder::apply`] changed.
///
/// A single event can release buffered events, so one delta may cover
/// several applied events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateDelta {
    /// Events applied to the aggregate, in application order.
    pub applied: Vec<EventKey>,
    /// The tree itself was created by this apply.
    pub tree_created: bool,
    /// Nodes created for the first time.
    pub created: Vec<NodeId>,
    /// Nodes whose content, origin or token linkage changed.
    pub updated: Vec<NodeId>,
    /// Nodes whose ancestry now reaches a root.
    pub attached: Vec<NodeId>,
    /// Events parked in the pending buffer.
    pub buffered: Vec<EventKey>,
    /// Events evicted from the pending buffer.
    pub dropped: Vec<EventKey>,
    /// Lightweight nodes whose content should be looked up.
    pub needs_content: Vec<NodeId>,
}

impl AggregateDelta {
    /// True when nothing was applied, buffered or dropped.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.applied.is_empty() && self.buffered.is_empty() && self.dropped.is_empty()
    }

    pub(crate) fn note_updated(&mut self, id: &NodeId) {
        if !self.updated.contains(id) {
            self.updated.push(id.clone());
        }
    }

    pub(crate) fn note_needs_content(&mut self, id: &NodeId) {
        if !self.needs_content.contains(id) {
            self.needs_content.push(id.clone());
        }
    }
}
