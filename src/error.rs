//! Unified error types for the orchestrator.

use std::fmt;
use std::time::Duration;

// ---------------------------------------------------------------------------
// ProtocolError
// ---------------------------------------------------------------------------

/// Errors arising from the line-delimited JSON wire protocol.
#[derive(Debug)]
pub enum ProtocolError {
    /// A stdout line that is not valid JSON or does not match the event schema.
    Parse { preview: String, detail: String },
    /// The conversation history could not be serialized for the stdin payload.
    Encode(serde_json::Error),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse { preview, detail } => {
                write!(f, "unparseable protocol line `{preview}`: {detail}")
            }
            Self::Encode(e) => write!(f, "failed to encode conversation history: {e}"),
        }
    }
}

impl std::error::Error for ProtocolError {}

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Errors when loading or parsing configuration.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Toml(toml::de::Error),
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "io: {e}"),
            Self::Toml(e) => write!(f, "toml: {e}"),
            Self::Invalid(msg) => write!(f, "invalid config: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        Self::Toml(e)
    }
}

// ---------------------------------------------------------------------------
// LaunchError
// ---------------------------------------------------------------------------

/// Errors while starting one agent generation.
#[derive(Debug)]
pub enum LaunchError {
    /// No usable agent executable in config or on PATH.
    ExecutableNotFound,
    /// The subprocess could not be spawned.
    Spawn(std::io::Error),
    /// The payload could not be written to the subprocess stdin.
    Stdin(std::io::Error),
}

impl fmt::Display for LaunchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExecutableNotFound => {
                write!(f, "agent executable not found; configure agent.cli_path or install it on PATH")
            }
            Self::Spawn(e) => write!(f, "failed to spawn agent process: {e}"),
            Self::Stdin(e) => write!(f, "failed to write turn payload to agent stdin: {e}"),
        }
    }
}

impl std::error::Error for LaunchError {}

// ---------------------------------------------------------------------------
// SessionError — top-level
// ---------------------------------------------------------------------------

/// Top-level error type for session orchestration.
#[derive(Debug)]
pub enum SessionError {
    Launch(LaunchError),
    Protocol(ProtocolError),
    /// Read/write failure on one of the generation's pipes.
    Stream(std::io::Error),
    /// The configured turn timeout elapsed; the generation was killed.
    Timeout(Duration),
    /// The session actor is gone and can no longer accept commands.
    ChannelClosed,
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Launch(e) => write!(f, "launch: {e}"),
            Self::Protocol(e) => write!(f, "protocol: {e}"),
            Self::Stream(e) => write!(f, "stream: {e}"),
            Self::Timeout(limit) => write!(
                f,
                "agent turn timed out after {}s; the process was killed",
                limit.as_secs()
            ),
            Self::ChannelClosed => write!(f, "session command channel closed"),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<LaunchError> for SessionError {
    fn from(e: LaunchError) -> Self {
        Self::Launch(e)
    }
}

impl From<ProtocolError> for SessionError {
    fn from(e: ProtocolError) -> Self {
        Self::Protocol(e)
    }
}
