//! Bulk import against a remote that stops acknowledging.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use arbor_core::error::ErrorCode;
use arbor_core::import::{ImportAck, ImportError, ImportRequest, ImportTransport, Importer};
use arbor_core::{Address, Event, NodeId, Projector};

fn request() -> ImportRequest {
    serde_json::from_value(serde_json::json!({
        "treeAddress": "0xFEED",
        "creator": "0xc",
        "rootContent": "root",
        "nodes": [
            {"nodeId": "1", "parentId": null, "content": "root", "timestamp": 1},
            {"nodeId": "2", "parentId": "1", "content": "a", "timestamp": 2},
            {"nodeId": "3", "parentId": "2", "content": "b", "timestamp": 3},
            {"nodeId": "4", "parentId": "2", "timestamp": 4}
        ]
    }))
    .expect("request parses")
}

/// Acknowledges the first `budget` submissions, then goes silent while
/// keeping the channels open.
struct Stalls {
    budget: Mutex<usize>,
    silent: Mutex<Vec<Sender<ImportAck>>>,
}

impl Stalls {
    fn after(budget: usize) -> Self {
        Self {
            budget: Mutex::new(budget),
            silent: Mutex::new(Vec::new()),
        }
    }
}

impl ImportTransport for Stalls {
    fn submit(&self, event: &Event) -> anyhow::Result<Receiver<ImportAck>> {
        let (tx, rx) = mpsc::channel();
        let mut budget = self.budget.lock().expect("budget lock");
        if *budget > 0 {
            *budget -= 1;
            tx.send(ImportAck::accepted(event.position()))?;
        } else {
            self.silent.lock().expect("silent lock").push(tx);
        }
        Ok(rx)
    }
}

/// Drops the sender without answering.
struct HangsUp;

impl ImportTransport for HangsUp {
    fn submit(&self, _event: &Event) -> anyhow::Result<Receiver<ImportAck>> {
        let (_tx, rx) = mpsc::channel();
        Ok(rx)
    }
}

struct Offline;

impl ImportTransport for Offline {
    fn submit(&self, _event: &Event) -> anyhow::Result<Receiver<ImportAck>> {
        anyhow::bail!("connection refused")
    }
}

#[test]
fn missing_ack_times_out_and_keeps_applied_nodes() {
    let p = Projector::default();
    // Tree creation and node 1 are acknowledged; node 2 never is.
    let transport = Arc::new(Stalls::after(2));
    let started = Instant::now();
    let err = Importer::new(&p)
        .with_transport(transport)
        .with_ack_timeout(Duration::from_millis(100))
        .run(&request())
        .expect_err("import should time out");
    assert!(started.elapsed() < Duration::from_secs(5));

    match &err {
        ImportError::Timeout {
            node_id, applied, ..
        } => {
            assert_eq!(node_id.as_ref(), Some(&NodeId::new("2")));
            assert_eq!(*applied, 1);
        }
        other => panic!("expected timeout, got {other:?}"),
    }
    assert_eq!(err.code(), ErrorCode::ImportTimeout);

    let view = p.snapshot(&Address::new("0xfeed")).expect("partial tree");
    assert_eq!(view.tree.node_count, 1);
    assert!(view.contains(&NodeId::new("1")));
    assert!(!view.contains(&NodeId::new("2")));
}

#[test]
fn resumed_import_completes_without_double_counting() {
    let p = Projector::default();
    let _ = Importer::new(&p)
        .with_transport(Arc::new(Stalls::after(3)))
        .with_ack_timeout(Duration::from_millis(50))
        .run(&request());

    let report = Importer::new(&p).run(&request()).expect("local import");
    assert_eq!(report.skipped, 2);
    assert_eq!(report.applied, 2);

    let view = p.snapshot(&Address::new("0xfeed")).expect("tree");
    assert_eq!(view.tree.node_count, 4);
    assert!(view.pending_parent_ids().is_empty());
    assert_eq!(view.content_pending_ids(), vec![NodeId::new("4")]);
}

#[test]
fn closed_channel_is_a_rejection() {
    let p = Projector::default();
    let err = Importer::new(&p)
        .with_transport(Arc::new(HangsUp))
        .run(&request())
        .expect_err("no ack");
    assert_eq!(err.code(), ErrorCode::ImportRejected);
    assert_eq!(err.applied(), 0);
    assert!(p.snapshot(&Address::new("0xfeed")).is_none());
}

#[test]
fn submit_failure_is_reported() {
    let p = Projector::default();
    let err = Importer::new(&p)
        .with_transport(Arc::new(Offline))
        .run(&request())
        .expect_err("offline");
    assert!(matches!(err, ImportError::Transport { applied: 0, .. }));
    assert!(err.to_string().contains("connection refused"));
}

fn batch(nodes: serde_json::Value) -> ImportRequest {
    serde_json::from_value(serde_json::json!({
        "treeAddress": "0xFEED",
        "creator": "0xc",
        "nodes": nodes
    }))
    .expect("batch parses")
}

#[test]
fn second_batch_with_new_nodes_extends_the_tree() {
    let p = Projector::default();
    let first = batch(serde_json::json!([
        {"nodeId": "1", "parentId": "0", "content": "root", "timestamp": 1},
        {"nodeId": "2", "parentId": "1", "content": "a", "timestamp": 2}
    ]));
    let second = batch(serde_json::json!([
        {"nodeId": "3", "parentId": "2", "content": "b", "timestamp": 3}
    ]));

    Importer::new(&p).run(&first).expect("first batch");
    let report = Importer::new(&p).run(&second).expect("second batch");
    assert_eq!(report.applied, 1);
    assert_eq!(report.skipped, 0);

    let view = p.snapshot(&Address::new("0xfeed")).expect("tree");
    assert_eq!(view.tree.node_count, 3);
    assert!(view.contains(&NodeId::new("3")));
    assert_eq!(view.attached_ids().len(), 3);
}

#[test]
fn reordered_request_only_adds_missing_nodes() {
    let p = Projector::default();
    Importer::new(&p).run(&request()).expect("first import");

    let reordered = batch(serde_json::json!([
        {"nodeId": "5", "parentId": "4", "content": "late", "timestamp": 5},
        {"nodeId": "4", "parentId": "2", "timestamp": 4},
        {"nodeId": "3", "parentId": "2", "content": "b", "timestamp": 3},
        {"nodeId": "2", "parentId": "1", "content": "a", "timestamp": 2},
        {"nodeId": "1", "parentId": null, "content": "root", "timestamp": 1}
    ]));
    let report = Importer::new(&p)
        .with_transport(Arc::new(Stalls::after(usize::MAX)))
        .run(&reordered)
        .expect("second import");
    assert_eq!(report.applied, 1);
    assert_eq!(report.skipped, 4);

    let view = p.snapshot(&Address::new("0xfeed")).expect("tree");
    assert_eq!(view.tree.node_count, 5);
    assert!(view.pending_parent_ids().is_empty());
    assert_eq!(view.node(&NodeId::new("3")).map(|n| n.content.as_str()), Some("b"));
}
