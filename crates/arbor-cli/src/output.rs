//! Shared output layer: every command renders in pretty, text or JSON form.
//!
//! The mode is resolved once in `main` from the `--json` flag, the `FORMAT`
//! env var, the user config and finally whether stdout is a terminal (see
//! [`arbor_core::config::resolve_config`]).

use std::io::{self, Write};

use arbor_core::error::ErrorCode;
use serde::Serialize;

/// Shared width for human pretty separators.
pub const PRETTY_RULE_WIDTH: usize = 72;

/// Write a horizontal separator used by pretty human output.
pub fn pretty_rule(w: &mut dyn Write) -> io::Result<()> {
    writeln!(w, "{:-<width$}", "", width = PRETTY_RULE_WIDTH)
}

/// Write a section heading followed by a separator.
pub fn pretty_section(w: &mut dyn Write, heading: &str) -> io::Result<()> {
    writeln!(w, "{heading}")?;
    pretty_rule(w)
}

/// Render a left-aligned key/value line in human output.
pub fn pretty_kv(w: &mut dyn Write, key: &str, value: impl AsRef<str>) -> io::Result<()> {
    writeln!(w, "{:<16} {}", format!("{key}:"), value.as_ref())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Sections and rules for people at a terminal.
    Pretty,
    /// Plain lines for pipes and scripts.
    Text,
    Json,
}

impl OutputMode {
    /// Map a resolved mode name (`pretty`, `text`, `json`) to a mode.
    /// Anything else falls back to text.
    #[must_use]
    pub fn from_resolved(raw: &str) -> Self {
        match raw {
            "json" => Self::Json,
            "pretty" => Self::Pretty,
            _ => Self::Text,
        }
    }

    #[must_use]
    pub const fn is_json(self) -> bool {
        matches!(self, Self::Json)
    }

    #[must_use]
    pub const fn is_pretty(self) -> bool {
        matches!(self, Self::Pretty)
    }
}

/// A structured error with optional suggestion and error code.
#[derive(Debug, Serialize)]
pub struct CliError {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    /// Machine-readable code such as `E2002`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl CliError {
    /// An error carrying the code and hint of `code`.
    pub fn from_code(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            suggestion: code.hint().map(str::to_string),
            error_code: Some(code.code().to_string()),
        }
    }
}

/// Render a serializable value to stdout in the requested format.
///
/// JSON mode serializes `value`; the other modes call `human_fn`.
pub fn render<T: Serialize>(
    mode: OutputMode,
    value: &T,
    human_fn: impl FnOnce(&T, &mut dyn Write) -> io::Result<()>,
) -> anyhow::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match mode {
        OutputMode::Json => {
            serde_json::to_writer_pretty(&mut out, value)?;
            writeln!(out)?;
        }
        OutputMode::Pretty | OutputMode::Text => human_fn(value, &mut out)?,
    }
    Ok(())
}

/// Render an error to stderr in the requested format.
pub fn render_error(mode: OutputMode, error: &CliError) -> anyhow::Result<()> {
    let stderr = io::stderr();
    let mut out = stderr.lock();
    write_error(mode, error, &mut out)
}

fn write_error(mode: OutputMode, error: &CliError, out: &mut dyn Write) -> anyhow::Result<()> {
    match mode {
        OutputMode::Json => {
            let wrapper = serde_json::json!({ "error": error });
            serde_json::to_writer_pretty(&mut *out, &wrapper)?;
            writeln!(out)?;
        }
        OutputMode::Pretty | OutputMode::Text => {
            match &error.error_code {
                Some(code) => writeln!(out, "error[{code}]: {}", error.message)?,
                None => writeln!(out, "error: {}", error.message)?,
            }
            if let Some(suggestion) = &error.suggestion {
                writeln!(out, "  suggestion: {suggestion}")?;
            }
        }
    }
    Ok(())
}

/// Shorten `text` to `max` characters on a char boundary, marking the cut.
#[must_use]
pub fn preview(text: &str, max: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max).collect();
    if chars.next().is_some() {
        format!("{head}…")
    } else {
        head
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolved_names_map_to_modes() {
        assert_eq!(OutputMode::from_resolved("json"), OutputMode::Json);
        assert_eq!(OutputMode::from_resolved("pretty"), OutputMode::Pretty);
        assert_eq!(OutputMode::from_resolved("text"), OutputMode::Text);
        assert_eq!(OutputMode::from_resolved("bogus"), OutputMode::Text);
        assert!(OutputMode::Json.is_json());
        assert!(!OutputMode::Text.is_pretty());
    }

    #[test]
    fn error_from_code_carries_hint() {
        let err = CliError::from_code(ErrorCode::TreeNotFound, "tree 0xa not found");
        assert_eq!(err.error_code.as_deref(), Some("E2002"));
        assert!(err.suggestion.is_some());
    }

    #[test]
    fn human_error_names_code() {
        let err = CliError::from_code(ErrorCode::ImportTimeout, "import stalled");
        let mut buf = Vec::new();
        write_error(OutputMode::Text, &err, &mut buf).expect("write");
        let text = String::from_utf8(buf).expect("utf8");
        assert!(text.starts_with("error[E3001]: import stalled"));
    }

    #[test]
    fn json_error_is_wrapped() {
        let err = CliError {
            message: "boom".into(),
            suggestion: None,
            error_code: None,
        };
        let mut buf = Vec::new();
        write_error(OutputMode::Json, &err, &mut buf).expect("write");
        let value: serde_json::Value = serde_json::from_slice(&buf).expect("json");
        assert_eq!(value["error"]["message"], "boom");
        assert!(value["error"].get("suggestion").is_none());
    }

    #[test]
    fn preview_cuts_on_char_boundary() {
        assert_eq!(preview("short", 10), "short");
        assert_eq!(preview("ééééé", 3), "ééé…");
    }

    #[test]
    fn pretty_kv_aligns() {
        let mut buf = Vec::new();
        pretty_kv(&mut buf, "nodes", "3").expect("write");
        assert_eq!(String::from_utf8(buf).expect("utf8"), "nodes:           3\n");
    }
}
