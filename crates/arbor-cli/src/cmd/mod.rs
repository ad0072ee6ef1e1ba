pub mod completions;
pub mod config;
pub mod import;
pub mod replay;
pub mod show;
pub mod sim;
pub mod stats;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use arbor_core::Projector;
use arbor_core::config::ProjectConfig;
use arbor_core::event::parser::{ParsedLog, read_events};
use arbor_core::resolve::MapResolver;
use serde::Serialize;
use tracing::debug;

/// A log line that failed to parse under `--lenient`.
#[derive(Debug, Serialize)]
pub struct RejectedLine {
    pub line: usize,
    pub code: &'static str,
    pub error: String,
}

/// Resolve a user-supplied path against the project root. Absolute paths
/// are kept as given.
pub fn resolve_path(root: &Path, path: &Path) -> PathBuf {
    root.join(path)
}

/// Read an event log and describe the lines it rejected.
pub fn load_log(root: &Path, path: &Path, lenient: bool) -> Result<(ParsedLog, Vec<RejectedLine>)> {
    let log = read_events(&resolve_path(root, path), lenient)?;
    let rejected = log
        .rejected
        .iter()
        .map(|(line, e)| RejectedLine {
            line: *line,
            code: e.code().code(),
            error: e.to_string(),
        })
        .collect();
    debug!(
        events = log.events.len(),
        rejected = log.rejected.len(),
        unknown = log.skipped_unknown,
        "event log loaded"
    );
    Ok((log, rejected))
}

/// A projector for `config`, resolving lightweight nodes from
/// `content_map` when one is given.
pub fn build_projector(
    config: &ProjectConfig,
    root: &Path,
    content_map: Option<&Path>,
) -> Result<Projector> {
    let projector = Projector::new(config.clone());
    let Some(path) = content_map else {
        return Ok(projector);
    };
    let resolver = MapResolver::from_json_file(&resolve_path(root, path))?;
    debug!(entries = resolver.len(), "content map loaded");
    Ok(projector.with_resolver(Arc::new(resolver)))
}
