//! `arbor sim` - deterministic convergence campaigns.
//!
//! Runs a seed range through the simulator and reports pass/fail per seed,
//! or replays one seed in detail with `--replay`.

use std::io::Write;
use std::ops::Range;
use std::process;

use anyhow::{Result, anyhow};
use arbor_sim::campaign::{CampaignConfig, format_violation, replay_seed, run_campaign};
use arbor_sim::fingerprint_table;
use clap::Args;
use serde::Serialize;

use crate::output::{OutputMode, pretty_kv, pretty_section, render};

#[derive(Args, Debug)]
pub struct SimArgs {
    /// Seed range to run, as `START..END`.
    #[arg(long, default_value = "0..100", value_parser = parse_seed_range)]
    pub seeds: Range<u64>,

    /// Nodes created per tree.
    #[arg(long, default_value = "12")]
    pub nodes: usize,

    /// Trees per scenario.
    #[arg(long, default_value = "3")]
    pub trees: usize,

    /// Simulated observers.
    #[arg(long, default_value = "3")]
    pub observers: usize,

    /// Delivery fault intensity in percent; scales duplication, reordering
    /// and failed content lookups.
    #[arg(long, default_value = "20", value_parser = clap::value_parser!(u8).range(0..=100))]
    pub faults: u8,

    /// Replay a single seed with trace details instead of running the range.
    #[arg(long, value_name = "SEED")]
    pub replay: Option<u64>,
}

fn parse_seed_range(raw: &str) -> Result<Range<u64>, String> {
    let (start, end) = raw
        .split_once("..")
        .ok_or_else(|| format!("expected START..END, got `{raw}`"))?;
    let start: u64 = start.trim().parse().map_err(|e| format!("bad start `{start}`: {e}"))?;
    let end: u64 = end.trim().parse().map_err(|e| format!("bad end `{end}`: {e}"))?;
    if end <= start {
        return Err(format!("empty seed range {start}..{end}"));
    }
    Ok(start..end)
}

#[derive(Debug, Serialize)]
struct RunOutput {
    seeds_run: usize,
    seeds_passed: usize,
    seeds_failed: usize,
    first_failure: Option<u64>,
    interesting_states_reached: usize,
    all_passed: bool,
    failures: Vec<FailureOutput>,
}

#[derive(Debug, Serialize)]
struct FailureOutput {
    seed: u64,
    violations: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ReplayOutput {
    seed: u64,
    events: usize,
    trace_events: usize,
    observers: usize,
    oracle_passed: bool,
    violations: Vec<String>,
    interesting_state_reached: bool,
    fingerprints: Vec<TreePrints>,
}

#[derive(Debug, Serialize)]
struct TreePrints {
    tree: String,
    fingerprints: Vec<String>,
}

fn campaign_config(args: &SimArgs) -> CampaignConfig {
    let faults = args.faults;
    CampaignConfig {
        seed_range: args.seeds.clone(),
        observers: args.observers,
        trees: args.trees,
        nodes_per_tree: args.nodes,
        updates_per_tree: args.nodes / 2,
        fault_duplicate_percent: faults / 4,
        fault_reorder_percent: faults,
        fault_content_failure_percent: faults / 2,
        ..CampaignConfig::default()
    }
}

/// Execute `arbor sim`.
///
/// Exits with status 1 when any seed violates an invariant.
///
/// # Errors
///
/// Returns an error if the campaign parameters are invalid.
pub fn run_sim(args: &SimArgs, output: OutputMode) -> Result<()> {
    let config = campaign_config(args);
    config.validate().map_err(|e| anyhow!("invalid simulation parameters: {e}"))?;

    if let Some(seed) = args.replay {
        return run_replay(seed, &config, output);
    }

    let report = run_campaign(&config)?;
    let out = RunOutput {
        seeds_run: report.seeds_run,
        seeds_passed: report.seeds_passed,
        seeds_failed: report.failures.len(),
        first_failure: report.first_failure,
        interesting_states_reached: report.interesting_states_reached,
        all_passed: report.all_passed(),
        failures: report
            .failures
            .iter()
            .map(|f| FailureOutput {
                seed: f.seed,
                violations: f.violations.clone(),
            })
            .collect(),
    };
    render(output, &out, |o, w| render_run_human(o, output, w))?;

    if !out.all_passed {
        process::exit(1);
    }
    Ok(())
}

fn run_replay(seed: u64, config: &CampaignConfig, output: OutputMode) -> Result<()> {
    let result = replay_seed(seed, config)?;
    let out = ReplayOutput {
        seed,
        events: result.scenario.events.len(),
        trace_events: result.trace.len(),
        observers: result.states.len(),
        oracle_passed: result.oracle.passed,
        violations: result.oracle.violations.iter().map(format_violation).collect(),
        interesting_state_reached: result.interesting_state_reached,
        fingerprints: fingerprint_table(&result.states)
            .into_iter()
            .map(|(tree, fingerprints)| TreePrints {
                tree: tree.to_string(),
                fingerprints,
            })
            .collect(),
    };
    render(output, &out, |o, w| render_replay_human(o, output, w))?;

    if !out.oracle_passed {
        process::exit(1);
    }
    Ok(())
}

fn render_run_human(
    out: &RunOutput,
    mode: OutputMode,
    w: &mut dyn Write,
) -> std::io::Result<()> {
    if mode.is_pretty() {
        pretty_section(w, "Simulation campaign")?;
    }
    pretty_kv(w, "seeds run", out.seeds_run.to_string())?;
    pretty_kv(w, "passed", out.seeds_passed.to_string())?;
    pretty_kv(w, "failed", out.seeds_failed.to_string())?;
    pretty_kv(w, "interesting", out.interesting_states_reached.to_string())?;
    if let Some(seed) = out.first_failure {
        pretty_kv(w, "first failure", seed.to_string())?;
        writeln!(w, "replay with: arbor sim --replay {seed}")?;
    }
    for failure in &out.failures {
        writeln!(w, "seed {}:", failure.seed)?;
        for violation in &failure.violations {
            writeln!(w, "  {violation}")?;
        }
    }
    Ok(())
}

fn render_replay_human(
    out: &ReplayOutput,
    mode: OutputMode,
    w: &mut dyn Write,
) -> std::io::Result<()> {
    if mode.is_pretty() {
        pretty_section(w, &format!("Seed {}", out.seed))?;
    }
    pretty_kv(w, "events", out.events.to_string())?;
    pretty_kv(w, "trace events", out.trace_events.to_string())?;
    pretty_kv(w, "observers", out.observers.to_string())?;
    pretty_kv(w, "passed", out.oracle_passed.to_string())?;
    pretty_kv(w, "interesting", out.interesting_state_reached.to_string())?;
    for violation in &out.violations {
        writeln!(w, "  {violation}")?;
    }
    for tree in &out.fingerprints {
        writeln!(w, "{}", tree.tree)?;
        for (observer, print) in tree.fingerprints.iter().enumerate() {
            writeln!(w, "  observer {observer}: {print}")?;
        }
    }
    Ok(())
}
