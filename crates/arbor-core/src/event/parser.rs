//! JSON-lines event log parser.
//!
//! Each data line is one flat JSON event object. Comment lines start with
//! `#`; blank lines are ignored. Unknown event kinds are skipped with a
//! warning so that newer log producers do not break older readers.

use std::path::Path;

use anyhow::Context;
use serde_json::Value;
use tracing::warn;

use super::Event;
use super::types::EventKind;
use crate::error::ErrorCode;

/// Errors that can occur while parsing an event line.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// The line is not a JSON object.
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    /// The object has no string `kind` field.
    #[error("missing `kind` field")]
    MissingKind,

    /// The `kind` is not one of the known contract events.
    #[error("unknown event kind: '{0}'")]
    UnknownKind(String),

    /// The fields do not match the schema for the kind.
    #[error("schema mismatch for {kind}: {details}")]
    SchemaMismatch { kind: EventKind, details: String },
}

impl ParseError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        ErrorCode::MalformedEvent
    }
}

/// The result of parsing one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedLine {
    Event(Box<Event>),
    Comment(String),
    Blank,
}

/// Parse a single line.
///
/// # Errors
///
/// Returns [`ParseError`] when the line is neither blank, a comment, nor a
/// valid event object.
pub fn parse_line(line: &str) -> Result<ParsedLine, ParseError> {
    let trimmed = line.trim();

    if trimmed.is_empty() {
        return Ok(ParsedLine::Blank);
    }
    if trimmed.starts_with('#') {
        return Ok(ParsedLine::Comment(trimmed.to_string()));
    }

    let value: Value =
        serde_json::from_str(trimmed).map_err(|e| ParseError::InvalidJson(e.to_string()))?;
    if !value.is_object() {
        return Err(ParseError::InvalidJson("expected a JSON object".to_string()));
    }

    let raw_kind = value
        .get("kind")
        .and_then(Value::as_str)
        .ok_or(ParseError::MissingKind)?;
    let kind: EventKind = raw_kind
        .parse()
        .map_err(|_| ParseError::UnknownKind(raw_kind.to_string()))?;

    let event: Event = serde_json::from_value(value).map_err(|e| ParseError::SchemaMismatch {
        kind,
        details: e.to_string(),
    })?;

    Ok(ParsedLine::Event(Box::new(event)))
}

/// Events parsed from a log plus the lines that failed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedLog {
    pub events: Vec<Event>,
    /// `(1-based line number, error)` for each rejected line.
    pub rejected: Vec<(usize, ParseError)>,
    /// Lines skipped because their kind is unknown.
    pub skipped_unknown: usize,
}

/// Parse a whole log, stopping at the first malformed line.
///
/// # Errors
///
/// Returns `(line_number, ParseError)` for the first malformed line
/// (excluding unknown kinds, which are warned and skipped). Line numbers
/// are 1-indexed.
pub fn parse_lines(input: &str) -> Result<Vec<Event>, (usize, ParseError)> {
    let log = scan(input, false)?;
    Ok(log.events)
}

/// Parse a whole log, collecting malformed lines instead of failing.
#[must_use]
pub fn parse_lines_lenient(input: &str) -> ParsedLog {
    // Lenient scanning never returns early.
    scan(input, true).unwrap_or_default()
}

fn scan(input: &str, lenient: bool) -> Result<ParsedLog, (usize, ParseError)> {
    let mut log = ParsedLog::default();

    for (i, line) in input.lines().enumerate() {
        let line_no = i + 1;
        match parse_line(line) {
            Ok(ParsedLine::Event(event)) => log.events.push(*event),
            Ok(ParsedLine::Comment(_) | ParsedLine::Blank) => {}
            Err(ParseError::UnknownKind(raw)) => {
                warn!(line = line_no, kind = %raw, "skipping line with unknown event kind");
                log.skipped_unknown += 1;
            }
            Err(e) if lenient => {
                warn!(line = line_no, error = %e, "skipping malformed event line");
                log.rejected.push((line_no, e));
            }
            Err(e) => return Err((line_no, e)),
        }
    }

    Ok(log)
}

/// Read and parse an event log file.
///
/// # Errors
///
/// Returns an error if the file cannot be read, or (when `lenient` is
/// false) if any line is malformed.
pub fn read_events(path: &Path, lenient: bool) -> anyhow::Result<ParsedLog> {
    let input = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    if lenient {
        return Ok(parse_lines_lenient(&input));
    }

    let events = parse_lines(&input).map_err(|(line_no, e)| {
        anyhow::anyhow!("{}: {}:{line_no}: {e}", e.code(), path.display())
    })?;
    Ok(ParsedLog {
        events,
        ..ParsedLog::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TREE: &str = r#"{"kind":"TreeCreated","blockNumber":1,"logIndex":0,"timestamp":100,"treeAddress":"0xa","creator":"0xc"}"#;
    const ROOT: &str = r#"{"kind":"NodeCreated","blockNumber":1,"logIndex":1,"timestamp":100,"treeAddress":"0xa","nodeId":"1","content":"hello"}"#;

    #[test]
    fn blank_and_comment_lines() {
        assert_eq!(parse_line("   ").expect("blank"), ParsedLine::Blank);
        assert!(matches!(
            parse_line("# exported from indexer").expect("comment"),
            ParsedLine::Comment(_)
        ));
    }

    #[test]
    fn parses_event_line() {
        let ParsedLine::Event(event) = parse_line(ROOT).expect("event") else {
            panic!("expected event");
        };
        assert_eq!(event.kind(), EventKind::NodeCreated);
        assert_eq!(event.log_index, 1);
    }

    #[test]
    fn unknown_kind_is_distinguished() {
        let err = parse_line(r#"{"kind":"NodeBurned","blockNumber":1,"logIndex":0}"#).unwrap_err();
        assert_eq!(err, ParseError::UnknownKind("NodeBurned".to_string()));
    }

    #[test]
    fn schema_mismatch_names_kind() {
        let err = parse_line(r#"{"kind":"NodeCreated","blockNumber":1,"logIndex":0,"treeAddress":"0xa"}"#)
            .unwrap_err();
        assert!(matches!(
            err,
            ParseError::SchemaMismatch {
                kind: EventKind::NodeCreated,
                ..
            }
        ));
    }

    #[test]
    fn strict_parse_reports_line_number() {
        let input = format!("{TREE}\nnot json\n{ROOT}\n");
        let (line_no, err) = parse_lines(&input).unwrap_err();
        assert_eq!(line_no, 2);
        assert!(matches!(err, ParseError::InvalidJson(_)));
    }

    #[test]
    fn lenient_parse_keeps_going() {
        let input = format!(
            "# header\n{TREE}\nnot json\n{{\"kind\":\"Mystery\"}}\n\n{ROOT}\n"
        );
        let log = parse_lines_lenient(&input);
        assert_eq!(log.events.len(), 2);
        assert_eq!(log.rejected.len(), 1);
        assert_eq!(log.rejected[0].0, 3);
        assert_eq!(log.skipped_unknown, 1);
    }

    #[test]
    fn read_events_from_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("events.jsonl");
        std::fs::write(&path, format!("{TREE}\n{ROOT}\n")).expect("write");
        let log = read_events(&path, false).expect("read");
        assert_eq!(log.events.len(), 2);
    }
}
