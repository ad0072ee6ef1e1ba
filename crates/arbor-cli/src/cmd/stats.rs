//! `arbor stats` - activity per UTC day and per user.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Result;
use arbor_core::Projector;
use arbor_core::config::ProjectConfig;
use arbor_core::stats::{ActivityStats, DayStats};
use clap::Args;
use serde::Serialize;

use crate::cmd::load_log;
use crate::output::{OutputMode, pretty_kv, pretty_section, render};

#[derive(Args, Debug)]
pub struct StatsArgs {
    /// JSON-lines event log.
    pub events: PathBuf,

    /// Skip malformed lines instead of failing on the first one.
    #[arg(long)]
    pub lenient: bool,
}

#[derive(Debug, Serialize)]
struct StatsOutput {
    totals: DayStats,
    #[serde(flatten)]
    activity: ActivityStats,
}

/// Execute `arbor stats`.
///
/// # Errors
///
/// Returns an error if the log cannot be read or parsed.
pub fn run_stats(
    args: &StatsArgs,
    config: &ProjectConfig,
    output: OutputMode,
    project_root: &Path,
) -> Result<()> {
    let (log, _) = load_log(project_root, &args.events, args.lenient)?;
    let projector = Projector::new(config.clone());
    projector.ingest_all(log.events);

    let activity = projector.stats();
    let out = StatsOutput {
        totals: activity.totals(),
        activity,
    };
    render(output, &out, |o, w| render_stats_human(o, output, w))
}

fn render_stats_human(
    out: &StatsOutput,
    mode: OutputMode,
    w: &mut dyn Write,
) -> std::io::Result<()> {
    if mode.is_pretty() {
        pretty_section(w, "Activity")?;
    }
    pretty_kv(w, "trees created", out.totals.trees_created.to_string())?;
    pretty_kv(w, "nodes created", out.totals.nodes_created.to_string())?;
    pretty_kv(w, "content updates", out.totals.content_updates.to_string())?;
    pretty_kv(w, "token events", out.totals.token_events.to_string())?;
    if out.activity.undated > 0 {
        pretty_kv(w, "undated", out.activity.undated.to_string())?;
    }

    writeln!(w)?;
    if mode.is_pretty() {
        pretty_section(w, "By day")?;
    }
    for (day, stats) in &out.activity.days {
        writeln!(
            w,
            "{day}  trees={} nodes={} updates={} tokens={}",
            stats.trees_created, stats.nodes_created, stats.content_updates, stats.token_events
        )?;
    }

    writeln!(w)?;
    if mode.is_pretty() {
        pretty_section(w, "By user")?;
    }
    for (user, stats) in &out.activity.users {
        writeln!(
            w,
            "{user}  trees={} nodes={} updates={}",
            stats.trees_created, stats.nodes_created, stats.content_updates
        )?;
    }
    Ok(())
}
