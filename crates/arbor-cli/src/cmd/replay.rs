//! `arbor replay` - project an event log and report per-tree state.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Result;
use arbor_core::config::ProjectConfig;
use arbor_core::ledger::Checkpoint;
use arbor_core::{Address, EventDigest, Projector, checkpoint};
use clap::Args;
use serde::Serialize;

use crate::cmd::{RejectedLine, build_projector, load_log, resolve_path};
use crate::output::{OutputMode, pretty_kv, pretty_section, render};

#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// JSON-lines event log.
    pub events: PathBuf,

    /// JSON file `{"<tree>": {"<node>": "<content>"}}` serving lightweight
    /// node content.
    #[arg(long, value_name = "FILE")]
    pub content_map: Option<PathBuf>,

    /// Write the ledger checkpoint here after replaying.
    #[arg(long, value_name = "FILE")]
    pub checkpoint: Option<PathBuf>,

    /// Skip malformed lines instead of failing on the first one.
    #[arg(long)]
    pub lenient: bool,

    /// List a one-line digest for each accepted event.
    #[arg(long)]
    pub digests: bool,
}

/// Per-tree state after a replay.
#[derive(Debug, Serialize)]
pub struct TreeSummary {
    pub tree: Address,
    pub known: bool,
    pub nodes: usize,
    pub attached: usize,
    pub pending_parent: usize,
    pub content_pending: usize,
    pub buffered: usize,
    pub dropped: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
}

impl TreeSummary {
    pub fn collect(projector: &Projector, tree: &Address) -> Self {
        let diagnostics = projector.diagnostics(tree).unwrap_or_default();
        let view = projector.snapshot(tree);
        Self {
            tree: tree.clone(),
            known: view.is_some(),
            nodes: view.as_ref().map_or(0, |v| v.tree.node_count),
            attached: view.as_ref().map_or(0, |v| v.attached_ids().len()),
            pending_parent: diagnostics.pending_parent,
            content_pending: diagnostics.content_pending,
            buffered: diagnostics.buffered,
            dropped: diagnostics.dropped,
            fingerprint: view.map(|v| v.fingerprint()),
        }
    }
}

#[derive(Debug, Serialize)]
struct ReplayOutput {
    events_read: usize,
    accepted: usize,
    duplicates: usize,
    skipped_unknown: usize,
    rejected: Vec<RejectedLine>,
    trees: Vec<TreeSummary>,
    checkpoint: Checkpoint,
    #[serde(skip_serializing_if = "Option::is_none")]
    previous_checkpoint: Option<Checkpoint>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    digests: Vec<EventDigest>,
}

/// Execute `arbor replay`.
///
/// # Errors
///
/// Returns an error if the log or content map cannot be read, a line is
/// malformed without `--lenient`, or the checkpoint cannot be written.
pub fn run_replay(
    args: &ReplayArgs,
    config: &ProjectConfig,
    output: OutputMode,
    project_root: &Path,
) -> Result<()> {
    let (log, rejected) = load_log(project_root, &args.events, args.lenient)?;
    let projector = build_projector(config, project_root, args.content_map.as_deref())?;

    let events_read = log.events.len();
    let stats = projector.ingest_all(log.events);
    let trees = projector
        .trees()
        .iter()
        .map(|tree| TreeSummary::collect(&projector, tree))
        .collect();

    let current = projector.checkpoint();
    let previous_checkpoint = match &args.checkpoint {
        Some(path) => {
            let path = resolve_path(project_root, path);
            let previous = checkpoint::load(&path)?;
            checkpoint::save(&path, &current)?;
            previous
        }
        None => None,
    };

    let out = ReplayOutput {
        events_read,
        accepted: stats.accepted,
        duplicates: stats.duplicates,
        skipped_unknown: log.skipped_unknown,
        rejected,
        trees,
        checkpoint: current,
        previous_checkpoint,
        digests: if args.digests { stats.digests } else { Vec::new() },
    };

    render(output, &out, |o, w| render_replay_human(o, output, w))
}

fn render_replay_human(
    out: &ReplayOutput,
    mode: OutputMode,
    w: &mut dyn Write,
) -> std::io::Result<()> {
    if mode.is_pretty() {
        pretty_section(w, "Replay")?;
        pretty_kv(w, "events", out.events_read.to_string())?;
        pretty_kv(w, "accepted", out.accepted.to_string())?;
        pretty_kv(w, "duplicates", out.duplicates.to_string())?;
        if let Some(block) = out.checkpoint.max_block {
            pretty_kv(w, "highest block", block.to_string())?;
        }
        writeln!(w)?;
    } else {
        writeln!(
            w,
            "events={} accepted={} duplicates={} unknown={} rejected={}",
            out.events_read,
            out.accepted,
            out.duplicates,
            out.skipped_unknown,
            out.rejected.len()
        )?;
    }

    for line in &out.rejected {
        writeln!(w, "rejected line {} [{}]: {}", line.line, line.code, line.error)?;
    }
    for digest in &out.digests {
        writeln!(w, "{} {} {}", digest.position, digest.tree, digest.summary)?;
    }
    for tree in &out.trees {
        if !tree.known {
            writeln!(w, "{}  waiting for TreeCreated ({} buffered)", tree.tree, tree.buffered)?;
            continue;
        }
        writeln!(
            w,
            "{}  nodes={} attached={} pending_parent={} content_pending={} dropped={}  {}",
            tree.tree,
            tree.nodes,
            tree.attached,
            tree.pending_parent,
            tree.content_pending,
            tree.dropped,
            tree.fingerprint.as_deref().unwrap_or("-")
        )?;
    }
    Ok(())
}
