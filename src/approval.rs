//! Approval gate for sensitive tool invocations.
//!
//! The gate is a pure decision: given a tool name, the auto-approve flag, and
//! the allow-list store, does this invocation require pausing the generation
//! for human confirmation? Request construction and the per-tool description
//! formatting live here too.

use crate::textutil::truncate_with_suffix;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Mutex;

/// Tool names that always require confirmation unless exempted.
pub const SENSITIVE_TOOLS: [&str; 3] = ["Write", "Edit", "Bash"];

/// Maximum characters of a Bash command shown in descriptions.
const COMMAND_PREVIEW_CHARS: usize = 60;
/// Maximum characters of Write content carried as a preview.
const CONTENT_PREVIEW_CHARS: usize = 200;

/// Immutable record describing one pause-worthy tool invocation.
///
/// Constructed once per pause event and discarded after a decision is
/// recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalRequest {
    pub tool_name: String,
    pub tool_use_id: String,
    pub file_path: Option<String>,
    pub operation: String,
    pub description: String,
    pub content_preview: Option<String>,
}

impl ApprovalRequest {
    /// Human-readable block shown when presenting the request.
    pub fn display_text(&self) -> String {
        let mut text = String::from("Permission request\n\n");
        if !self.description.is_empty() {
            text.push_str(&self.description);
            text.push_str("\n\n");
        }
        text.push_str("Details:\n");
        text.push_str(&format!("- Tool: {}", self.tool_name));
        text.push_str(&format!("\n- Operation: {}", self.operation));
        if let Some(path) = &self.file_path {
            text.push_str(&format!("\n- File: {path}"));
        }
        if let Some(preview) = &self.content_preview {
            text.push_str(&format!("\n- Content preview: {preview}"));
        }
        text.push_str("\n\nDo you want to approve this operation?");
        text
    }
}

/// Human decision for a pending approval request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalDecision {
    Approve,
    ApproveForSession,
    ApproveAlways,
    Deny,
}

/// Allow-list store consulted by the gate.
///
/// Session-scoped names are cleared on session reset; persistent names
/// outlive the process. Storage is an external collaborator concern.
pub trait ApprovalStore: Send + Sync {
    fn is_approved(&self, tool_name: &str) -> bool;
    fn approve_for_session(&self, tool_name: &str);
    fn approve_persistently(&self, tool_name: &str);
    fn clear_session(&self);
}

/// Decide whether a tool invocation must pause for confirmation.
pub fn requires_pause(tool_name: &str, auto_approve: bool, store: &dyn ApprovalStore) -> bool {
    if auto_approve {
        return false;
    }
    if store.is_approved(tool_name) {
        return false;
    }
    SENSITIVE_TOOLS.contains(&tool_name)
}

/// Build one approval request from a `tool_use` block's fields.
pub fn build_request(tool_name: &str, tool_use_id: &str, input: &Value) -> ApprovalRequest {
    let file_path = input
        .get("file_path")
        .and_then(Value::as_str)
        .map(str::to_string);
    let content_preview = input
        .get("content")
        .and_then(Value::as_str)
        .map(|content| truncate_with_suffix(content, CONTENT_PREVIEW_CHARS, "..."));

    ApprovalRequest {
        tool_name: tool_name.to_string(),
        tool_use_id: tool_use_id.to_string(),
        file_path,
        operation: operation_for(tool_name),
        description: describe_tool_use(tool_name, input),
        content_preview,
    }
}

/// Deterministic per-tool description line.
pub fn describe_tool_use(tool_name: &str, input: &Value) -> String {
    match tool_name {
        "Write" => {
            let path = input.get("file_path").and_then(Value::as_str).unwrap_or("file");
            format!("The agent wants to write to the file `{path}`")
        }
        "Edit" => {
            let path = input.get("file_path").and_then(Value::as_str).unwrap_or("file");
            format!("The agent wants to edit the file `{path}`")
        }
        "Bash" => {
            let command = input.get("command").and_then(Value::as_str).unwrap_or("command");
            let command = truncate_with_suffix(command, COMMAND_PREVIEW_CHARS, "...");
            format!("The agent wants to run the command `{command}`")
        }
        other => format!("The agent wants to use the {other} tool"),
    }
}

/// Operation label: lowercased tool name, except Bash which runs a command.
fn operation_for(tool_name: &str) -> String {
    if tool_name == "Bash" {
        "command".to_string()
    } else {
        tool_name.to_lowercase()
    }
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// Allow-list store keeping both scopes in memory.
///
/// Used by tests and embeddings that do not want on-disk preferences; see
/// `prefs::JsonApprovalStore` for the persistent variant.
#[derive(Debug, Default)]
pub struct MemoryApprovalStore {
    inner: Mutex<MemoryScopes>,
}

#[derive(Debug, Default)]
struct MemoryScopes {
    session: HashSet<String>,
    persistent: HashSet<String>,
}

impl MemoryApprovalStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ApprovalStore for MemoryApprovalStore {
    fn is_approved(&self, tool_name: &str) -> bool {
        let scopes = self.inner.lock().expect("approval store lock poisoned");
        scopes.session.contains(tool_name) || scopes.persistent.contains(tool_name)
    }

    fn approve_for_session(&self, tool_name: &str) {
        let mut scopes = self.inner.lock().expect("approval store lock poisoned");
        scopes.session.insert(tool_name.to_string());
    }

    fn approve_persistently(&self, tool_name: &str) {
        let mut scopes = self.inner.lock().expect("approval store lock poisoned");
        scopes.persistent.insert(tool_name.to_string());
    }

    fn clear_session(&self) {
        let mut scopes = self.inner.lock().expect("approval store lock poisoned");
        scopes.session.clear();
    }
}
