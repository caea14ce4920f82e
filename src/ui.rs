//! UI sink collaborator interface.
//!
//! The orchestrator never renders anything itself; every user-visible effect
//! goes through this trait. Frontends answer questions and approvals by
//! sending commands back through the session handle, not via callbacks.

use crate::approval::ApprovalRequest;
use crate::protocol::TokenUsage;

/// Sender name used for agent-authored messages.
pub const AGENT_SENDER: &str = "agent";
/// Sender name used for orchestrator-authored messages.
pub const SYSTEM_SENDER: &str = "system";

/// Kind of a chat message, for distinct rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Regular assistant text.
    Agent,
    /// Assistant reasoning, tagged distinctly from regular text.
    Thinking,
    /// A question the human must answer before the turn can continue.
    Question,
    /// Orchestrator status and housekeeping messages.
    System,
    /// Error output (agent stderr, protocol errors surfaced to the human).
    Error,
}

/// Severity of a status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLevel {
    Info,
    Working,
    Success,
    Warn,
    Error,
}

/// Rendering surface driven by the session actor.
pub trait UiSink: Send + Sync {
    /// Append one chat message.
    fn post_message(&self, sender: &str, text: &str, kind: MessageKind);

    /// Toggle the busy indicator for the active turn.
    fn set_working(&self, working: bool);

    /// Show which tool the agent is currently executing, or clear it.
    fn set_current_tool(&self, tool: Option<&str>);

    /// Report token accounting from the latest assistant message.
    fn report_token_usage(&self, usage: TokenUsage);

    /// Update the one-line session status.
    fn set_status(&self, text: &str, level: StatusLevel);

    /// Present a pending approval request. The decision comes back through
    /// the session handle.
    fn present_approval(&self, request: &ApprovalRequest);

    /// Present a pending question with optional multiple-choice options. The
    /// answer comes back through the session handle.
    fn present_question(&self, text: &str, options: &[String]);
}
