//! `arbor import` - apply a bulk import request.
//!
//! The request is applied locally; with `--events` an existing log is
//! replayed first so that nodes it already created count as skipped.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use arbor_core::config::ProjectConfig;
use arbor_core::import::{ImportRequest, Importer};
use clap::Args;
use serde::Serialize;

use crate::cmd::replay::TreeSummary;
use crate::cmd::{build_projector, load_log, resolve_path};
use crate::output::{CliError, OutputMode, pretty_kv, pretty_section, render, render_error};

#[derive(Args, Debug)]
pub struct ImportArgs {
    /// JSON import request: `treeAddress`, `creator`, `rootContent`, `nodes`.
    pub request: PathBuf,

    /// Replay this event log before importing.
    #[arg(long, value_name = "FILE")]
    pub events: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct ImportOutput {
    applied: usize,
    skipped: usize,
    summary: TreeSummary,
}

/// Execute `arbor import`.
///
/// # Errors
///
/// Returns an error if the request or log cannot be read, or the import
/// fails part way.
pub fn run_import(
    args: &ImportArgs,
    config: &ProjectConfig,
    output: OutputMode,
    project_root: &Path,
) -> Result<()> {
    let path = resolve_path(project_root, &args.request);
    let raw = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let request: ImportRequest = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse import request {}", path.display()))?;

    let projector = build_projector(config, project_root, None)?;
    if let Some(events) = &args.events {
        let (log, _) = load_log(project_root, events, false)?;
        projector.ingest_all(log.events);
    }

    let report = match Importer::new(&projector).run(&request) {
        Ok(report) => report,
        Err(e) => {
            render_error(output, &CliError::from_code(e.code(), e.to_string()))?;
            bail!("import failed after {} node(s)", e.applied());
        }
    };

    let out = ImportOutput {
        applied: report.applied,
        skipped: report.skipped,
        summary: TreeSummary::collect(&projector, &report.tree),
    };
    render(output, &out, |o, w| render_import_human(o, output, w))
}

fn render_import_human(
    out: &ImportOutput,
    mode: OutputMode,
    w: &mut dyn Write,
) -> std::io::Result<()> {
    if mode.is_pretty() {
        pretty_section(w, &format!("Import into {}", out.summary.tree))?;
    } else {
        writeln!(w, "import {}", out.summary.tree)?;
    }
    pretty_kv(w, "applied", out.applied.to_string())?;
    pretty_kv(w, "skipped", out.skipped.to_string())?;
    pretty_kv(w, "nodes", out.summary.nodes.to_string())?;
    pretty_kv(w, "pending parent", out.summary.pending_parent.to_string())?;
    Ok(())
}
