use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::io::IsTerminal;
use std::path::Path;
use std::time::Duration;

/// Per-project settings, read from `<root>/.arbor/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub buffer: BufferConfig,
    #[serde(default)]
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub pull: PullConfig,
    #[serde(default)]
    pub import: ImportConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferConfig {
    /// Events a single tree may hold while waiting on a tree or node.
    #[serde(default = "default_max_buffered_events")]
    pub max_buffered_events: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            max_buffered_events: default_max_buffered_events(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolverConfig {
    #[serde(default = "default_resolver_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_resolver_timeout_ms(),
        }
    }
}

impl ResolverConfig {
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_pull_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for PullConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            timeout_ms: default_pull_timeout_ms(),
        }
    }
}

impl PullConfig {
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportConfig {
    #[serde(default = "default_ack_timeout_ms")]
    pub ack_timeout_ms: u64,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            ack_timeout_ms: default_ack_timeout_ms(),
        }
    }
}

impl ImportConfig {
    #[must_use]
    pub const fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserConfig {
    #[serde(default)]
    pub output: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveConfig {
    pub project: ProjectConfig,
    pub user: UserConfig,
    pub resolved_output: String,
}

/// Load the project config. A missing file yields defaults.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_project_config(project_root: &Path) -> Result<ProjectConfig> {
    let path = project_root.join(".arbor/config.toml");
    if !path.exists() {
        return Ok(ProjectConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<ProjectConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Load the user config from the platform config directory.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_user_config() -> Result<UserConfig> {
    let Some(config_dir) = dirs::config_dir() else {
        return Ok(UserConfig::default());
    };

    let path = config_dir.join("arbor/config.toml");
    if !path.exists() {
        return Ok(UserConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<UserConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Project config, user config and the output mode they resolve to.
///
/// # Errors
///
/// Propagates load failures from either config file.
pub fn resolve_config(project_root: &Path, cli_json: bool) -> Result<EffectiveConfig> {
    let project = load_project_config(project_root)?;
    let user = load_user_config()?;

    let env_format = env::var("FORMAT").ok();
    let resolved_output = resolve_output(cli_json, user.output.as_deref(), env_format.as_deref());

    Ok(EffectiveConfig {
        project,
        user,
        resolved_output,
    })
}

fn resolve_output(cli_json: bool, user_output: Option<&str>, env_format: Option<&str>) -> String {
    fn normalize_output_mode(raw: &str) -> Option<&'static str> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pretty" | "human" => Some("pretty"),
            "text" | "table" => Some("text"),
            "json" => Some("json"),
            _ => None,
        }
    }

    if cli_json {
        return "json".to_string();
    }

    if let Some(mode) = env_format.and_then(normalize_output_mode) {
        return mode.to_string();
    }

    if let Some(mode) = user_output.and_then(normalize_output_mode) {
        return mode.to_string();
    }

    if std::io::stdout().is_terminal() {
        "pretty".to_string()
    } else {
        "text".to_string()
    }
}

const fn default_max_buffered_events() -> usize {
    256
}

const fn default_resolver_timeout_ms() -> u64 {
    2_000
}

const fn default_pull_timeout_ms() -> u64 {
    5_000
}

const fn default_ack_timeout_ms() -> u64 {
    30_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_project_config_uses_defaults() {
        let root = tempfile::tempdir().expect("temp dir must be created");
        let cfg = load_project_config(root.path()).expect("load should succeed");
        assert_eq!(cfg.buffer.max_buffered_events, 256);
        assert_eq!(cfg.resolver.timeout(), Duration::from_secs(2));
        assert!(!cfg.pull.enabled);
        assert_eq!(cfg.import.ack_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn partial_project_config_keeps_other_defaults() {
        let root = tempfile::tempdir().expect("temp dir must be created");
        std::fs::create_dir_all(root.path().join(".arbor")).expect("create .arbor");
        std::fs::write(
            root.path().join(".arbor/config.toml"),
            "[buffer]\nmax_buffered_events = 8\n\n[pull]\nenabled = true\n",
        )
        .expect("write config");

        let cfg = load_project_config(root.path()).expect("load should succeed");
        assert_eq!(cfg.buffer.max_buffered_events, 8);
        assert!(cfg.pull.enabled);
        assert_eq!(cfg.pull.timeout_ms, 5_000);
        assert_eq!(cfg.resolver.timeout_ms, 2_000);
    }

    #[test]
    fn malformed_project_config_names_the_file() {
        let root = tempfile::tempdir().expect("temp dir must be created");
        std::fs::create_dir_all(root.path().join(".arbor")).expect("create .arbor");
        std::fs::write(root.path().join(".arbor/config.toml"), "[buffer\n").expect("write");

        let err = load_project_config(root.path()).unwrap_err();
        assert!(format!("{err}").contains("config.toml"));
    }

    #[test]
    fn cli_json_overrides_env_and_config() {
        assert_eq!(resolve_output(true, Some("pretty"), Some("text")), "json");
    }

    #[test]
    fn legacy_aliases_are_normalized() {
        assert_eq!(resolve_output(false, Some("table"), Some("human")), "pretty");
        assert_eq!(resolve_output(false, Some("human"), Some("table")), "text");
    }

    #[test]
    fn unknown_env_falls_back_to_user_config() {
        assert_eq!(resolve_output(false, Some("json"), Some("yaml")), "json");
    }
}
