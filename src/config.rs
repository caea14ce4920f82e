//! Configuration loading and defaults.
//!
//! Configuration comes from a TOML file (`./liaison.toml`, then
//! `~/.config/liaison/liaison.toml`, or an explicit `--config` path) merged
//! over built-in defaults. The file is optional; a missing file means
//! defaults.

use crate::error::ConfigError;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Config file name searched in the working directory and config root.
const CONFIG_FILE_NAME: &str = "liaison.toml";

/// Default agent executable names probed on PATH, in order.
pub const DEFAULT_CLI_CANDIDATES: [&str; 2] = ["claude", "claude-code"];
/// System prompt passed to every generation.
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are Claude Code, Anthropic's official CLI for programming.";
/// Ceiling on agent-internal turns per generation.
pub const DEFAULT_MAX_TURNS: u32 = 10;

/// Resolved runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Explicit agent executable path; checked before PATH candidates.
    pub cli_path: Option<PathBuf>,
    /// Executable names probed on PATH when no explicit path is set.
    pub cli_candidates: Vec<String>,
    /// Working directory for agent generations; current dir fallback.
    pub project_root: Option<PathBuf>,
    /// When set, sensitive tools run without pausing for confirmation.
    pub auto_approve: bool,
    /// `--max-turns` ceiling passed to the agent.
    pub max_turns: u32,
    /// `--system-prompt` passed to the agent.
    pub system_prompt: String,
    /// Optional bound on one generation's wall-clock run; unbounded when
    /// unset. On expiry the generation is killed and a timeout error is
    /// surfaced.
    pub turn_timeout_secs: Option<u64>,
    /// Approval preferences file; defaults next to the project root.
    pub approvals_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cli_path: None,
            cli_candidates: DEFAULT_CLI_CANDIDATES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            project_root: None,
            auto_approve: true,
            max_turns: DEFAULT_MAX_TURNS,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            turn_timeout_secs: None,
            approvals_file: None,
        }
    }
}

/// Raw TOML file shape before defaults are applied.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    agent: AgentSection,
    session: SessionSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AgentSection {
    cli_path: Option<String>,
    cli_candidates: Option<Vec<String>>,
    system_prompt: Option<String>,
    max_turns: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SessionSection {
    project_root: Option<String>,
    auto_approve: Option<bool>,
    turn_timeout_secs: Option<u64>,
    approvals_file: Option<String>,
}

/// Load configuration from disk.
///
/// `path_override` is an explicit config file path (from `--config`); it must
/// exist. Without it, search `./liaison.toml` then the user config root, and
/// fall back to defaults when neither exists.
pub fn load_config(path_override: Option<&Path>) -> Result<Config, ConfigError> {
    let text = match path_override {
        Some(path) => Some(std::fs::read_to_string(path)?),
        None => read_first_existing(&search_paths()),
    };
    let file: FileConfig = match text {
        Some(text) => toml::from_str(&text)?,
        None => FileConfig::default(),
    };
    resolve(file)
}

/// Merge file values over defaults and validate.
fn resolve(file: FileConfig) -> Result<Config, ConfigError> {
    let defaults = Config::default();
    let config = Config {
        cli_path: file.agent.cli_path.map(PathBuf::from),
        cli_candidates: file
            .agent
            .cli_candidates
            .unwrap_or(defaults.cli_candidates),
        project_root: file.session.project_root.map(PathBuf::from),
        auto_approve: file.session.auto_approve.unwrap_or(defaults.auto_approve),
        max_turns: file.agent.max_turns.unwrap_or(defaults.max_turns),
        system_prompt: file.agent.system_prompt.unwrap_or(defaults.system_prompt),
        turn_timeout_secs: file.session.turn_timeout_secs,
        approvals_file: file.session.approvals_file.map(PathBuf::from),
    };
    if config.max_turns == 0 {
        return Err(ConfigError::Invalid("agent.max_turns must be at least 1".into()));
    }
    if config.cli_candidates.is_empty() && config.cli_path.is_none() {
        return Err(ConfigError::Invalid(
            "agent.cli_candidates cannot be empty without agent.cli_path".into(),
        ));
    }
    if let Some(0) = config.turn_timeout_secs {
        return Err(ConfigError::Invalid(
            "session.turn_timeout_secs must be positive when set".into(),
        ));
    }
    Ok(config)
}

/// Config file candidates in precedence order.
fn search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(CONFIG_FILE_NAME)];
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".config").join("liaison").join(CONFIG_FILE_NAME));
    }
    paths
}

fn read_first_existing(paths: &[PathBuf]) -> Option<String> {
    paths
        .iter()
        .find_map(|path| std::fs::read_to_string(path).ok())
}
