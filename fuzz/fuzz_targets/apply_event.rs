#![no_main]

use arbor_core::event::parser::parse_lines_lenient;
use arbor_core::{Projector, merge};
use libfuzzer_sys::fuzz_target;

// Feeds arbitrary logs forwards and backwards: the two projections must
// agree, and redelivery must change nothing.
fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };
    let events = parse_lines_lenient(input).events;
    // Above the default buffer bound, eviction makes the outcome order
    // dependent.
    if events.is_empty() || events.len() > 128 {
        return;
    }

    let forward = Projector::default();
    forward.ingest_all(events.iter().cloned());
    let backward = Projector::default();
    backward.ingest_all(events.iter().rev().cloned());

    for tree in forward.trees() {
        let a = forward.snapshot(&tree);
        let b = backward.snapshot(&tree);
        assert_eq!(a, b, "delivery order changed tree {tree}");
        if let Some(view) = &a {
            assert_eq!(&merge(view, view), view);
        }
    }

    let before: Vec<_> = forward.trees().iter().map(|t| forward.snapshot(t)).collect();
    forward.ingest_all(events);
    let after: Vec<_> = forward.trees().iter().map(|t| forward.snapshot(t)).collect();
    assert_eq!(before, after);
});
