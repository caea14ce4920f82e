//! CLI argument parsing via clap.

use clap::Parser;

/// Drive a non-interactive CLI coding agent as a stateful chat session.
#[derive(Debug, Parser)]
#[command(name = "liaison", version, long_version = Box::leak(liaison::build_info::cli_version_text().into_boxed_str()) as &'static str)]
pub struct Args {
    /// Message to send as the first turn of the session.
    pub prompt: Option<String>,

    /// Path to config file (default: ./liaison.toml or ~/.config/liaison/liaison.toml).
    #[arg(short = 'c', long = "config")]
    pub config: Option<String>,

    /// Override the agent executable path.
    #[arg(long = "cli")]
    pub cli: Option<String>,

    /// Working directory for agent runs (default: current directory).
    #[arg(long = "project-root")]
    pub project_root: Option<String>,

    /// Pause for confirmation before sensitive tools (Write, Edit, Bash)
    /// instead of auto-approving them.
    #[arg(long = "ask")]
    pub ask: bool,

    /// Kill a generation that runs longer than this many seconds.
    #[arg(long = "timeout-secs")]
    pub timeout_secs: Option<u64>,
}
