//! Shared test fixtures for codec/launcher/session test modules.
//!
//! Keeping tiny but reusable helpers here prevents each test module from
//! rebuilding ad-hoc temp-dir and recording-sink code.

use crate::approval::ApprovalRequest;
use crate::protocol::TokenUsage;
use crate::ui::{MessageKind, StatusLevel, UiSink};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

static TEST_DIR_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Temporary directory fixture with best-effort cleanup.
///
/// This helper is intentionally simple and std-only so unit tests can use it
/// without introducing new dependencies.
#[derive(Debug)]
pub struct TestTempDir {
    path: PathBuf,
}

impl TestTempDir {
    /// Create a unique temporary directory with a readable prefix.
    pub fn new(prefix: &str) -> Self {
        let suffix = TEST_DIR_COUNTER.fetch_add(1, Ordering::Relaxed);
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        let dir = std::env::temp_dir().join(format!("liaison-{prefix}-{millis}-{suffix}"));
        fs::create_dir_all(&dir).expect("failed to create temporary fixture directory");
        Self { path: dir }
    }

    /// Root directory path for this fixture.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Build a child path under the fixture root.
    pub fn child(&self, relative: &str) -> PathBuf {
        self.path.join(relative)
    }

    /// Write UTF-8 text to a child path, creating parent directories as needed.
    pub fn write_text(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.child(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("failed to create parent directories for fixture");
        }
        fs::write(&path, content).expect("failed to write fixture file");
        path
    }
}

impl Drop for TestTempDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}

/// UI sink that records every call for assertions.
#[derive(Debug, Default)]
pub struct RecordingSink {
    state: Mutex<RecordedCalls>,
}

#[derive(Debug, Default)]
struct RecordedCalls {
    messages: Vec<(String, String, MessageKind)>,
    working: bool,
    tools: Vec<Option<String>>,
    usages: Vec<TokenUsage>,
    statuses: Vec<(String, StatusLevel)>,
    approvals: Vec<ApprovalRequest>,
    questions: Vec<(String, Vec<String>)>,
}

impl RecordingSink {
    pub fn messages_of_kind(&self, kind: MessageKind) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .messages
            .iter()
            .filter(|(_, _, k)| *k == kind)
            .map(|(_, text, _)| text.clone())
            .collect()
    }

    pub fn statuses(&self) -> Vec<(String, StatusLevel)> {
        self.state.lock().unwrap().statuses.clone()
    }

    pub fn approvals(&self) -> Vec<ApprovalRequest> {
        self.state.lock().unwrap().approvals.clone()
    }

    pub fn questions(&self) -> Vec<(String, Vec<String>)> {
        self.state.lock().unwrap().questions.clone()
    }

    pub fn usages(&self) -> Vec<TokenUsage> {
        self.state.lock().unwrap().usages.clone()
    }

    pub fn working(&self) -> bool {
        self.state.lock().unwrap().working
    }

    pub fn last_tool(&self) -> Option<String> {
        self.state.lock().unwrap().tools.last().cloned().flatten()
    }
}

impl UiSink for RecordingSink {
    fn post_message(&self, sender: &str, text: &str, kind: MessageKind) {
        self.state.lock().unwrap().messages.push((
            sender.to_string(),
            text.to_string(),
            kind,
        ));
    }

    fn set_working(&self, working: bool) {
        self.state.lock().unwrap().working = working;
    }

    fn set_current_tool(&self, tool: Option<&str>) {
        self.state
            .lock()
            .unwrap()
            .tools
            .push(tool.map(str::to_string));
    }

    fn report_token_usage(&self, usage: TokenUsage) {
        self.state.lock().unwrap().usages.push(usage);
    }

    fn set_status(&self, text: &str, level: StatusLevel) {
        self.state
            .lock()
            .unwrap()
            .statuses
            .push((text.to_string(), level));
    }

    fn present_approval(&self, request: &ApprovalRequest) {
        self.state.lock().unwrap().approvals.push(request.clone());
    }

    fn present_question(&self, text: &str, options: &[String]) {
        self.state
            .lock()
            .unwrap()
            .questions
            .push((text.to_string(), options.to_vec()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_dir_fixture_writes_and_resolves_paths() {
        let fixture = TestTempDir::new("fixture");
        let file = fixture.write_text("nested/file.txt", "hello");
        assert_eq!(fs::read_to_string(file).unwrap(), "hello");
    }

    #[test]
    fn recording_sink_captures_calls() {
        let sink = RecordingSink::default();
        sink.post_message("agent", "hi", MessageKind::Agent);
        sink.set_current_tool(Some("Read"));
        sink.set_status("working", StatusLevel::Working);
        assert_eq!(sink.messages_of_kind(MessageKind::Agent), vec!["hi"]);
        assert_eq!(sink.last_tool(), Some("Read".to_string()));
        assert_eq!(sink.statuses().len(), 1);
    }
}
