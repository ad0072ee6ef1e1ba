//! Bulk import of an externally supplied tree.
//!
//! An [`ImportRequest`] is turned into synthetic events in block 0: one
//! `TreeCreated` at `(0, 0)` and one `NodeCreated` per node at the next
//! free log index of that tree. They go through the normal ingest pipeline.
//!
//! Imports are keyed by `nodeId`: a node the tree already has is skipped
//! before anything is submitted, so a later batch, a resumed run or a
//! reordered node list only ever adds the missing nodes.
//!
//! When a remote [`ImportTransport`] is configured, each event is submitted
//! first and applied only once the remote acknowledges it. Every wait is
//! bounded; a missing acknowledgement ends the import with
//! [`ImportError::Timeout`]. Events applied before that stay applied.

use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::ErrorCode;
use crate::event::{Event, EventData, EventPosition, NodeCreatedData, TreeCreatedData};
use crate::model::ids::{Address, NodeId, deserialize_parent};
use crate::projector::Projector;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRequest {
    pub tree_address: Address,
    #[serde(default)]
    pub creator: String,
    #[serde(default, alias = "treeRootContent")]
    pub root_content: Option<String>,
    #[serde(default)]
    pub nodes: Vec<ImportNode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportNode {
    pub node_id: NodeId,
    #[serde(default, deserialize_with = "deserialize_parent")]
    pub parent_id: Option<NodeId>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub model_id: String,
}

impl ImportRequest {
    /// Synthetic creation of the tree itself, stamped with the earliest
    /// node timestamp.
    #[must_use]
    pub fn tree_event(&self) -> Event {
        let started = self.nodes.iter().map(|n| n.timestamp).min().unwrap_or(0);
        Event::new(
            EventPosition::new(0, 0),
            started,
            self.tree_address.clone(),
            EventData::TreeCreated(TreeCreatedData {
                creator: self.creator.clone(),
                root_content: self.root_content.clone(),
            }),
        )
    }

    #[must_use]
    pub fn node_event(&self, node: &ImportNode, position: EventPosition) -> Event {
        Event::new(
            position,
            node.timestamp,
            self.tree_address.clone(),
            EventData::NodeCreated(NodeCreatedData {
                node_id: node.node_id.clone(),
                parent_id: node.parent_id.clone(),
                author: node.author.clone(),
                content: (!node.content.is_empty()).then(|| node.content.clone()),
                model_id: node.model_id.clone(),
                is_root: None,
                has_nft: false,
            }),
        )
    }
}

/// Remote acknowledgement of one submitted event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportAck {
    pub position: EventPosition,
    pub accepted: bool,
    pub reason: Option<String>,
}

impl ImportAck {
    #[must_use]
    pub const fn accepted(position: EventPosition) -> Self {
        Self {
            position,
            accepted: true,
            reason: None,
        }
    }
}

/// Remote side of an import: submits an event and hands back a channel on
/// which its acknowledgement will arrive.
pub trait ImportTransport: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if the event could not be submitted at all.
    fn submit(&self, event: &Event) -> anyhow::Result<Receiver<ImportAck>>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub tree: Address,
    /// Nodes newly applied by this run.
    pub applied: usize,
    /// Nodes already present from an earlier run.
    pub skipped: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("import of {tree} timed out after {waited:?} waiting on {}; {applied} node(s) applied", describe(.node_id.as_ref()))]
    Timeout {
        tree: Address,
        node_id: Option<NodeId>,
        waited: Duration,
        applied: usize,
    },

    #[error("import of {tree} rejected at {}: {reason}; {applied} node(s) applied", describe(.node_id.as_ref()))]
    Rejected {
        tree: Address,
        node_id: Option<NodeId>,
        reason: String,
        applied: usize,
    },

    #[error("import of {tree} could not be submitted: {reason}; {applied} node(s) applied")]
    Transport {
        tree: Address,
        applied: usize,
        reason: String,
    },
}

fn describe(node: Option<&NodeId>) -> String {
    node.map_or_else(|| "tree creation".to_string(), |id| format!("node {id}"))
}

impl ImportError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Timeout { .. } => ErrorCode::ImportTimeout,
            Self::Rejected { .. } => ErrorCode::ImportRejected,
            Self::Transport { .. } => ErrorCode::InternalUnexpected,
        }
    }

    /// Nodes applied before the failure. They are not rolled back.
    #[must_use]
    pub const fn applied(&self) -> usize {
        match self {
            Self::Timeout { applied, .. }
            | Self::Rejected { applied, .. }
            | Self::Transport { applied, .. } => *applied,
        }
    }
}

pub struct Importer<'a> {
    projector: &'a Projector,
    transport: Option<Arc<dyn ImportTransport>>,
    ack_timeout: Duration,
}

impl<'a> Importer<'a> {
    /// An importer that applies events locally without a remote.
    #[must_use]
    pub fn new(projector: &'a Projector) -> Self {
        Self {
            projector,
            transport: None,
            ack_timeout: projector.config().import.ack_timeout(),
        }
    }

    #[must_use]
    pub fn with_transport(mut self, transport: Arc<dyn ImportTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    #[must_use]
    pub const fn with_ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout = timeout;
        self
    }

    /// Run the import.
    ///
    /// # Errors
    ///
    /// [`ImportError::Timeout`] if an acknowledgement does not arrive in
    /// time, [`ImportError::Rejected`] if the remote refuses an event, and
    /// [`ImportError::Transport`] if submission itself fails.
    pub fn run(&self, request: &ImportRequest) -> Result<ImportReport, ImportError> {
        let tree = request.tree_address.clone();
        info!(tree = %tree, nodes = request.nodes.len(), remote = self.transport.is_some(), "import started");

        let mut report = ImportReport {
            tree: tree.clone(),
            ..ImportReport::default()
        };
        if !self.projector.knows_tree(&tree) {
            let event = request.tree_event();
            if let Some(transport) = &self.transport {
                self.await_ack(transport.as_ref(), &event, None, 0)?;
            }
            self.projector.ingest(event);
        }

        for node in &request.nodes {
            if self.projector.has_node(&tree, &node.node_id) {
                report.skipped += 1;
                continue;
            }
            let event = request.node_event(node, self.projector.next_import_position(&tree));
            if let Some(transport) = &self.transport {
                self.await_ack(transport.as_ref(), &event, Some(&node.node_id), report.applied)?;
            }
            if self.apply_node(request, node, event) {
                report.applied += 1;
            } else {
                report.skipped += 1;
            }
        }

        info!(tree = %tree, applied = report.applied, skipped = report.skipped, "import finished");
        Ok(report)
    }

    /// Ingest one synthetic node. Returns `false` when the node turned out
    /// to be present already.
    fn apply_node(&self, request: &ImportRequest, node: &ImportNode, mut event: Event) -> bool {
        let tree = &request.tree_address;
        loop {
            if self.projector.ingest(event).is_accepted() {
                return true;
            }
            // Another import took this position first.
            if self.projector.has_node(tree, &node.node_id) {
                return false;
            }
            event = request.node_event(node, self.projector.next_import_position(tree));
        }
    }

    fn await_ack(
        &self,
        transport: &dyn ImportTransport,
        event: &Event,
        node_id: Option<&NodeId>,
        applied: usize,
    ) -> Result<(), ImportError> {
        let tree = &event.tree_address;
        let receiver = transport.submit(event).map_err(|e| ImportError::Transport {
            tree: tree.clone(),
            applied,
            reason: format!("{e:#}"),
        })?;

        let rejected = |reason: String| ImportError::Rejected {
            tree: tree.clone(),
            node_id: node_id.cloned(),
            reason,
            applied,
        };
        match receiver.recv_timeout(self.ack_timeout) {
            Ok(ack) if ack.accepted => Ok(()),
            Ok(ack) => Err(rejected(
                ack.reason.unwrap_or_else(|| "rejected without reason".to_string()),
            )),
            Err(RecvTimeoutError::Disconnected) => {
                Err(rejected("acknowledgement channel closed".to_string()))
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    code = %ErrorCode::ImportTimeout,
                    tree = %tree,
                    event = %event.key(),
                    waited = ?self.ack_timeout,
                    applied,
                    "import acknowledgement timed out"
                );
                Err(ImportError::Timeout {
                    tree: tree.clone(),
                    node_id: node_id.cloned(),
                    waited: self.ack_timeout,
                    applied,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn request() -> ImportRequest {
        serde_json::from_str(
            r#"{
                "treeAddress": "0xIMP",
                "creator": "0xc",
                "treeRootContent": "root",
                "nodes": [
                    {"nodeId": "1", "parentId": "0x0", "content": "root", "timestamp": 20},
                    {"nodeId": "2", "parentId": "1", "content": "a", "timestamp": 10},
                    {"nodeId": "3", "parentId": "2", "content": "b", "timestamp": 30}
                ]
            }"#,
        )
        .expect("request parses")
    }

    struct AckAll;

    impl ImportTransport for AckAll {
        fn submit(&self, event: &Event) -> anyhow::Result<Receiver<ImportAck>> {
            let (tx, rx) = mpsc::channel();
            tx.send(ImportAck::accepted(event.position()))?;
            Ok(rx)
        }
    }

    struct Refuses;

    impl ImportTransport for Refuses {
        fn submit(&self, event: &Event) -> anyhow::Result<Receiver<ImportAck>> {
            let (tx, rx) = mpsc::channel();
            tx.send(ImportAck {
                position: event.position(),
                accepted: false,
                reason: Some("quota exceeded".into()),
            })?;
            Ok(rx)
        }
    }

    #[test]
    fn request_becomes_synthetic_events() {
        let req = request();
        let created = req.tree_event();
        assert_eq!(created.position(), EventPosition::new(0, 0));
        assert_eq!(created.timestamp, 10);

        let node = req.node_event(&req.nodes[2], EventPosition::new(0, 7));
        assert_eq!(node.position(), EventPosition::new(0, 7));
        assert_eq!(node.timestamp, 30);
        assert_eq!(node.tree_address.as_str(), "0ximp");
        assert!(matches!(&node.data, EventData::NodeCreated(d) if d.node_id == NodeId::new("3")));
    }

    #[test]
    fn positions_continue_after_earlier_imports() {
        let p = Projector::default();
        let tree = Address::new("0ximp");
        assert_eq!(p.next_import_position(&tree), EventPosition::new(0, 1));
        Importer::new(&p).run(&request()).expect("import");
        assert_eq!(p.next_import_position(&tree), EventPosition::new(0, 4));
    }

    #[test]
    fn local_import_applies_everything() {
        let p = Projector::default();
        let report = Importer::new(&p).run(&request()).expect("import");
        assert_eq!(report.applied, 3);

        let view = p.snapshot(&Address::new("0ximp")).expect("view");
        assert_eq!(view.tree.node_count, 3);
        assert_eq!(view.tree.root_node_id, Some(NodeId::new("1")));
        assert!(view.pending_parent_ids().is_empty());
    }

    #[test]
    fn reimport_is_idempotent() {
        let p = Projector::default();
        let importer = Importer::new(&p).with_transport(Arc::new(AckAll));
        importer.run(&request()).expect("first import");
        let again = importer.run(&request()).expect("second import");
        assert_eq!(again.applied, 0);
        assert_eq!(again.skipped, 3);
        let view = p.snapshot(&Address::new("0ximp")).expect("view");
        assert_eq!(view.tree.node_count, 3);
    }

    #[test]
    fn rejection_is_terminal() {
        let p = Projector::default();
        let err = Importer::new(&p)
            .with_transport(Arc::new(Refuses))
            .run(&request())
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ImportRejected);
        assert_eq!(err.applied(), 0);
        assert!(err.to_string().contains("quota exceeded"));
    }
}
