#![no_main]

use arbor_core::event::parser::{ParsedLine, parse_line};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(line) = std::str::from_utf8(data) else {
        return;
    };
    // Any accepted event must survive a trip through its own JSON form.
    if let Ok(ParsedLine::Event(event)) = parse_line(line) {
        let encoded = serde_json::to_string(&event).expect("accepted events encode");
        match parse_line(&encoded) {
            Ok(ParsedLine::Event(again)) => assert_eq!(event, again),
            other => panic!("re-encoded event did not parse: {other:?}"),
        }
    }
});
