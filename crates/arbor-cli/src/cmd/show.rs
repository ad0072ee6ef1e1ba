//! `arbor show` - print one tree's projection as an outline.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use arbor_core::config::ProjectConfig;
use arbor_core::error::ErrorCode;
use arbor_core::{Address, NodeId, TreeView};
use chrono::DateTime;
use clap::Args;
use serde::Serialize;

use crate::cmd::{build_projector, load_log};
use crate::output::{CliError, OutputMode, preview, pretty_kv, pretty_section, render, render_error};

const CONTENT_PREVIEW: usize = 60;

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// JSON-lines event log.
    pub events: PathBuf,

    /// Tree contract address.
    pub tree: String,

    /// JSON file `{"<tree>": {"<node>": "<content>"}}` serving lightweight
    /// node content.
    #[arg(long, value_name = "FILE")]
    pub content_map: Option<PathBuf>,

    /// Remember this node as the tree's selection and mark it in the
    /// outline if it exists.
    #[arg(long, value_name = "NODE")]
    pub select: Option<String>,

    /// Skip malformed lines instead of failing on the first one.
    #[arg(long)]
    pub lenient: bool,
}

#[derive(Debug, Serialize)]
struct ShowOutput {
    #[serde(flatten)]
    view: TreeView,
    selected: Option<NodeId>,
    pending_parent: Vec<NodeId>,
    content_pending: Vec<NodeId>,
}

/// Execute `arbor show`.
///
/// # Errors
///
/// Returns an error if the log cannot be read or the tree never appears in
/// it.
pub fn run_show(
    args: &ShowArgs,
    config: &ProjectConfig,
    output: OutputMode,
    project_root: &Path,
) -> Result<()> {
    let (log, _) = load_log(project_root, &args.events, args.lenient)?;
    let projector = build_projector(config, project_root, args.content_map.as_deref())?;
    projector.ingest_all(log.events);

    let tree = Address::new(&args.tree);
    let Some(view) = projector.snapshot(&tree) else {
        render_error(
            output,
            &CliError::from_code(
                ErrorCode::TreeNotFound,
                format!("tree {tree} has no TreeCreated event in {}", args.events.display()),
            ),
        )?;
        bail!("tree {tree} not found");
    };

    if let Some(node) = &args.select {
        projector.remember_selection(tree.clone(), NodeId::new(node));
    }
    let out = ShowOutput {
        selected: projector.recall_selection(&tree),
        pending_parent: view.pending_parent_ids().into_iter().collect(),
        content_pending: view.content_pending_ids(),
        view,
    };

    render(output, &out, |o, w| render_show_human(o, output, w))
}

fn format_time(timestamp: i64) -> String {
    DateTime::from_timestamp(timestamp, 0).map_or_else(
        || timestamp.to_string(),
        |t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

fn render_show_human(out: &ShowOutput, mode: OutputMode, w: &mut dyn Write) -> std::io::Result<()> {
    let tree = &out.view.tree;
    if mode.is_pretty() {
        pretty_section(w, &format!("Tree {}", tree.address))?;
    } else {
        writeln!(w, "tree {}", tree.address)?;
    }
    pretty_kv(w, "creator", &tree.creator)?;
    pretty_kv(
        w,
        "root",
        tree.root_node_id.as_ref().map_or_else(|| "-".to_string(), NodeId::to_string),
    )?;
    pretty_kv(w, "nodes", tree.node_count.to_string())?;
    pretty_kv(w, "created", format_time(tree.created_at))?;
    pretty_kv(w, "updated", format_time(tree.updated_at))?;
    if let Some(selected) = &out.selected {
        pretty_kv(w, "selected", selected.as_str())?;
    }
    writeln!(w)?;

    for (depth, node) in out.view.outline() {
        let marker = if out.selected.as_ref() == Some(&node.id) { "*" } else { "-" };
        let content = if node.content_pending {
            "(content pending)".to_string()
        } else {
            preview(&node.content, CONTENT_PREVIEW)
        };
        let nft = if node.is_nft_backed() { " [nft]" } else { "" };
        writeln!(w, "{:indent$}{marker} {}{nft}  {content}", "", node.id, indent = depth * 2)?;
    }

    if !out.pending_parent.is_empty() {
        writeln!(w)?;
        writeln!(w, "waiting for a parent:")?;
        for id in &out.pending_parent {
            let parent = out
                .view
                .node(id)
                .and_then(|n| n.parent.as_ref())
                .map_or_else(|| "-".to_string(), NodeId::to_string);
            writeln!(w, "  {id} (parent {parent})")?;
        }
    }
    Ok(())
}
