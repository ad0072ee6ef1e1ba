//! `arbor config` - print the effective configuration.

use std::path::Path;

use anyhow::{Context, Result};
use arbor_core::config::EffectiveConfig;
use clap::Args;

use crate::output::{OutputMode, pretty_section, render};

#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Print only the project settings, as TOML.
    #[arg(long)]
    pub project: bool,
}

/// Execute `arbor config`.
///
/// # Errors
///
/// Returns an error if the configuration cannot be encoded.
pub fn run_config(
    args: &ConfigArgs,
    effective: &EffectiveConfig,
    output: OutputMode,
    project_root: &Path,
) -> Result<()> {
    let project_toml =
        toml::to_string_pretty(&effective.project).context("Failed to encode project config")?;

    if args.project && !output.is_json() {
        print!("{project_toml}");
        return Ok(());
    }
    if args.project {
        return render(output, &effective.project, |_, _| Ok(()));
    }

    let config_file = project_root.join(".arbor/config.toml");
    render(output, effective, |e, w| {
        if output.is_pretty() {
            pretty_section(w, "Project")?;
        }
        let state = if config_file.exists() { "" } else { " (not present, defaults)" };
        writeln!(w, "# {}{state}", config_file.display())?;
        write!(w, "{project_toml}")?;
        writeln!(w)?;
        if output.is_pretty() {
            pretty_section(w, "User")?;
        }
        writeln!(w, "output = {}", e.user.output.as_deref().unwrap_or("-"))?;
        writeln!(w, "resolved output = {}", e.resolved_output)
    })
}
