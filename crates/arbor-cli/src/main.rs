#![forbid(unsafe_code)]

mod cmd;
mod output;

use std::env;
use std::path::PathBuf;

use anyhow::Context;
use arbor_core::config::resolve_config;
use clap::{CommandFactory, Parser, Subcommand};
use output::OutputMode;
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "arbor: event-sourced projector for on-chain content trees",
    long_about = None
)]
struct Cli {
    /// Enable debug logging when ARBOR_LOG is not set.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    /// Project root holding `.arbor/config.toml`; relative paths resolve
    /// against it. Defaults to the current directory.
    #[arg(long, global = true, value_name = "DIR")]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Projection",
        about = "Project an event log and report per-tree state",
        long_about = "Replay a JSON-lines event log through the projector in file order. \
                      Duplicates are ignored, early events wait for their tree or parent, \
                      and lightweight nodes are resolved from --content-map.",
        after_help = "EXAMPLES:\n    # Replay a log\n    arbor replay events.jsonl\n\n    \
                      # Resolve lightweight content and keep a checkpoint\n    \
                      arbor replay events.jsonl --content-map content.json \
                      --checkpoint cp.json\n\n    \
                      # Skip malformed lines and list event digests\n    \
                      arbor replay events.jsonl --lenient --digests --json"
    )]
    Replay(cmd::replay::ReplayArgs),

    #[command(
        next_help_heading = "Projection",
        about = "Show one tree as an outline",
        after_help = "EXAMPLES:\n    # Outline a tree\n    arbor show events.jsonl 0xabc\n\n    \
                      # Mark a selected node\n    arbor show events.jsonl 0xabc --select 4"
    )]
    Show(cmd::show::ShowArgs),

    #[command(
        next_help_heading = "Projection",
        about = "Activity per UTC day and per user",
        after_help = "EXAMPLES:\n    arbor stats events.jsonl --json"
    )]
    Stats(cmd::stats::StatsArgs),

    #[command(
        next_help_heading = "Projection",
        about = "Apply a bulk import request",
        after_help = "EXAMPLES:\n    # Import on top of an existing log\n    \
                      arbor import request.json --events events.jsonl"
    )]
    Import(cmd::import::ImportArgs),

    #[command(
        next_help_heading = "Verification",
        about = "Run a deterministic convergence campaign",
        long_about = "Simulate several observers receiving the same chain history through \
                      delayed, duplicated and reordered push channels, with flaky content \
                      lookups and occasional pull snapshots, then check they converge.",
        after_help = "EXAMPLES:\n    # 100 seeds with defaults\n    arbor sim\n\n    \
                      # Bigger trees, heavier faults\n    \
                      arbor sim --seeds 0..50 --nodes 40 --faults 60\n\n    \
                      # Inspect one seed\n    arbor sim --replay 17"
    )]
    Sim(cmd::sim::SimArgs),

    #[command(
        next_help_heading = "Setup",
        about = "Print the effective configuration"
    )]
    Config(cmd::config::ConfigArgs),

    #[command(
        next_help_heading = "Setup",
        about = "Generate shell completion scripts",
        after_help = "EXAMPLES:\n    \
                      arbor completions bash > ~/.local/share/bash-completion/completions/arbor"
    )]
    Completions(cmd::completions::CompletionsArgs),
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_env("ARBOR_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if verbose || env::var("DEBUG").is_ok() {
            "arbor=debug,info"
        } else {
            "arbor=info,warn"
        })
    });

    let format = env::var("ARBOR_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());
    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let project_root = match &cli.root {
        Some(root) => root.clone(),
        None => env::current_dir().context("Failed to read current directory")?,
    };
    let effective = resolve_config(&project_root, cli.json)?;
    let output = OutputMode::from_resolved(&effective.resolved_output);
    debug!(root = %project_root.display(), ?output, "configuration resolved");

    match &cli.command {
        Commands::Replay(args) => {
            cmd::replay::run_replay(args, &effective.project, output, &project_root)
        }
        Commands::Show(args) => {
            cmd::show::run_show(args, &effective.project, output, &project_root)
        }
        Commands::Stats(args) => {
            cmd::stats::run_stats(args, &effective.project, output, &project_root)
        }
        Commands::Import(args) => {
            cmd::import::run_import(args, &effective.project, output, &project_root)
        }
        Commands::Sim(args) => cmd::sim::run_sim(args, output),
        Commands::Config(args) => {
            cmd::config::run_config(args, &effective, output, &project_root)
        }
        Commands::Completions(args) => {
            let mut command = Cli::command();
            cmd::completions::run_completions(args.shell, &mut command)
        }
    }
}
