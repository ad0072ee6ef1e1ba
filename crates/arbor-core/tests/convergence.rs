//! Exhaustive delivery orders for a small tree: every permutation must
//! converge on the same fingerprint.

use std::sync::Arc;

use arbor_core::event::parser::parse_lines;
use arbor_core::resolve::MapResolver;
use arbor_core::{Address, Event, NodeId, Projector};

const LOG: &str = r#"
{"kind":"TreeCreated","blockNumber":1,"logIndex":0,"timestamp":100,"treeAddress":"0xc0","creator":"0xc","rootContent":"seed"}
{"kind":"NodeCreated","blockNumber":2,"logIndex":0,"timestamp":110,"treeAddress":"0xc0","nodeId":"1","parentId":"0x","content":"seed"}
{"kind":"NodeCreated","blockNumber":3,"logIndex":0,"timestamp":120,"treeAddress":"0xc0","nodeId":"2","parentId":"1"}
{"kind":"NodeCreated","blockNumber":3,"logIndex":1,"timestamp":120,"treeAddress":"0xc0","nodeId":"3","parentId":"2","content":"leaf"}
{"kind":"NodeUpdated","blockNumber":4,"logIndex":0,"timestamp":130,"treeAddress":"0xc0","nodeId":"3","content":"leaf v2"}
{"kind":"NodeUpdated","blockNumber":5,"logIndex":0,"timestamp":140,"treeAddress":"0xc0","nodeId":"1","content":"seed v2"}
"#;

fn log() -> Vec<Event> {
    parse_lines(LOG).expect("valid log")
}

fn resolver() -> Arc<MapResolver> {
    let mut map = MapResolver::new();
    map.insert(Address::new("0xc0"), NodeId::new("2"), "fetched");
    Arc::new(map)
}

/// Every permutation of `items`, by Heap's algorithm.
fn permutations<T: Clone>(items: &[T]) -> Vec<Vec<T>> {
    fn heap<T: Clone>(k: usize, items: &mut [T], out: &mut Vec<Vec<T>>) {
        if k <= 1 {
            out.push(items.to_vec());
            return;
        }
        heap(k - 1, items, out);
        for i in 0..k - 1 {
            if k % 2 == 0 {
                items.swap(i, k - 1);
            } else {
                items.swap(0, k - 1);
            }
            heap(k - 1, items, out);
        }
    }

    let mut work = items.to_vec();
    let mut out = Vec::new();
    heap(work.len(), &mut work, &mut out);
    out
}

fn fingerprint(events: Vec<Event>) -> String {
    let p = Projector::default().with_resolver(resolver());
    p.ingest_all(events);
    p.snapshot(&Address::new("0xc0"))
        .expect("tree projected")
        .fingerprint()
}

#[test]
fn every_delivery_order_converges() {
    let events = log();
    let orders = permutations(&events);
    assert_eq!(orders.len(), 720);

    let expected = fingerprint(events);
    for (i, order) in orders.into_iter().enumerate() {
        assert_eq!(fingerprint(order), expected, "order #{i} diverged");
    }
}

#[test]
fn converged_view_has_expected_shape() {
    let p = Projector::default().with_resolver(resolver());
    p.ingest_all(log().into_iter().rev());
    let view = p.snapshot(&Address::new("0xc0")).expect("tree projected");

    assert_eq!(view.tree.node_count, 3);
    assert_eq!(view.tree.root_content.as_deref(), Some("seed v2"));
    assert_eq!(view.tree.created_at, 100);
    assert_eq!(view.tree.updated_at, 140);
    let contents: Vec<&str> = view.nodes.values().map(|n| n.content.as_str()).collect();
    assert_eq!(contents, vec!["seed v2", "fetched", "leaf v2"]);
}

#[test]
fn duplicated_stream_converges_too() {
    let events = log();
    let mut doubled: Vec<Event> = events.iter().rev().cloned().collect();
    doubled.extend(events.iter().cloned());
    assert_eq!(fingerprint(doubled), fingerprint(events));
}
