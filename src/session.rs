//! Session state machine actor.
//!
//! The actor owns the conversation history, the lifecycle phase, and the
//! handle to the live generation (if any). Human entrypoints and the
//! generation's protocol events are serialized through one `tokio::select!`
//! loop, making every state transition single-writer: a stale generation's
//! event can never race a just-issued relaunch. Events are tagged with a
//! generation id and dropped once that generation has been terminated.

use crate::approval::{self, ApprovalDecision, ApprovalRequest, ApprovalStore};
use crate::config::Config;
use crate::error::SessionError;
use crate::history::{ConversationHistory, Turn};
use crate::launcher::{self, CliResolver, GenerationEvent, GenerationHandle};
use crate::protocol::{self, AssistantMessage, ContentBlock, StreamEvent, ASK_USER_QUESTION_TOOL};
use crate::textutil::preview;
use crate::ui::{MessageKind, StatusLevel, UiSink, AGENT_SENDER, SYSTEM_SENDER};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// Lifecycle phase of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// No generation running; ready for a new message.
    Idle,
    /// A generation is alive and its stream is being read.
    Dispatching,
    /// Paused on a question (or a denial); the next input is the answer.
    AwaitingAnswer,
    /// Paused on an approval request.
    AwaitingApproval,
    /// The last turn failed; a fresh message starts over.
    Error,
}

/// Control-plane commands accepted by the session actor.
#[derive(Debug)]
pub enum SessionCommand {
    /// Send a user message, or answer the pending question when paused on one.
    SendMessage { text: String },
    /// Answer the pending question by picking one of its suggested options.
    ChooseOption { label: String },
    /// Resolve the pending approval request.
    Approve { decision: ApprovalDecision },
    /// Toggle auto-approval for subsequent generations.
    SetAutoApprove { enabled: bool },
    /// Start a new conversation: clear history and session approvals.
    Reset,
    /// Observe current phase and history.
    Inspect {
        reply: oneshot::Sender<SessionSnapshot>,
    },
    /// Tear down any live generation and stop the actor.
    Shutdown,
}

/// Point-in-time view of the session for frontends and tests.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub turns: Vec<Turn>,
    pub auto_approve: bool,
    pub generation_live: bool,
}

/// Handle for sending commands to a spawned session actor.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    /// Send one command to the session actor.
    pub async fn send(&self, command: SessionCommand) -> Result<(), SessionError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| SessionError::ChannelClosed)
    }

    /// Fetch a snapshot of the current session state.
    pub async fn snapshot(&self) -> Result<SessionSnapshot, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::Inspect { reply }).await?;
        rx.await.map_err(|_| SessionError::ChannelClosed)
    }
}

/// Bootstrap inputs for the session actor.
pub struct SessionSpawnConfig {
    pub config: Config,
    pub resolver: Arc<dyn CliResolver>,
    pub approvals: Arc<dyn ApprovalStore>,
    pub ui: Arc<dyn UiSink>,
}

/// Spawn a session actor and return its command handle.
pub fn spawn_session(spawn: SessionSpawnConfig) -> SessionHandle {
    let (command_tx, mut command_rx) = mpsc::channel::<SessionCommand>(64);
    let (events_tx, mut events_rx) = mpsc::unbounded_channel::<GenerationEvent>();

    let mut actor = SessionActor::new(spawn, events_tx);

    tokio::spawn(async move {
        loop {
            tokio::select! {
                command = command_rx.recv() => match command {
                    Some(SessionCommand::Shutdown) | None => {
                        actor.teardown();
                        break;
                    }
                    Some(command) => actor.handle_command(command),
                },
                Some(event) = events_rx.recv() => actor.handle_generation_event(event),
            }
        }
    });

    SessionHandle {
        commands: command_tx,
    }
}

struct SessionActor {
    config: Config,
    resolver: Arc<dyn CliResolver>,
    approvals: Arc<dyn ApprovalStore>,
    ui: Arc<dyn UiSink>,
    history: ConversationHistory,
    phase: SessionPhase,
    auto_approve: bool,
    /// Accumulates "question + eventual answer" until it becomes a turn.
    pending: String,
    pending_approval: Option<ApprovalRequest>,
    current: Option<GenerationHandle>,
    next_generation: u64,
    events_tx: mpsc::UnboundedSender<GenerationEvent>,
}

impl SessionActor {
    fn new(
        spawn: SessionSpawnConfig,
        events_tx: mpsc::UnboundedSender<GenerationEvent>,
    ) -> Self {
        let auto_approve = spawn.config.auto_approve;
        Self {
            config: spawn.config,
            resolver: spawn.resolver,
            approvals: spawn.approvals,
            ui: spawn.ui,
            history: ConversationHistory::new(),
            phase: SessionPhase::Idle,
            auto_approve,
            pending: String::new(),
            pending_approval: None,
            current: None,
            next_generation: 1,
            events_tx,
        }
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::SendMessage { text } => self.handle_send_message(text),
            SessionCommand::ChooseOption { label } => self.handle_choose_option(label),
            SessionCommand::Approve { decision } => self.handle_approval(decision),
            SessionCommand::SetAutoApprove { enabled } => {
                self.auto_approve = enabled;
                let mode = if enabled { "enabled" } else { "disabled" };
                self.ui
                    .set_status(&format!("auto-approval {mode}"), StatusLevel::Info);
            }
            SessionCommand::Reset => self.handle_reset(),
            SessionCommand::Inspect { reply } => {
                let _ = reply.send(self.snapshot());
            }
            // Shutdown is intercepted by the actor loop.
            SessionCommand::Shutdown => {}
        }
    }

    fn handle_send_message(&mut self, text: String) {
        match self.phase {
            SessionPhase::AwaitingAnswer => {
                // The buffered question (or denial context) plus the answer
                // becomes one user turn.
                let content = format!("{}\n\n[answer: {text}]", self.pending);
                self.pending.clear();
                self.history.append(Turn::user(content));
                self.launch();
            }
            SessionPhase::Dispatching => {
                self.ui
                    .set_status("a turn is already in progress", StatusLevel::Warn);
            }
            SessionPhase::AwaitingApproval => {
                self.ui.set_status(
                    "waiting for an approval decision before continuing",
                    StatusLevel::Warn,
                );
            }
            SessionPhase::Idle | SessionPhase::Error => {
                self.history.append(Turn::user(text));
                self.launch();
            }
        }
    }

    fn handle_choose_option(&mut self, label: String) {
        if self.phase != SessionPhase::AwaitingAnswer {
            self.ui
                .set_status("no question is awaiting an answer", StatusLevel::Warn);
            return;
        }
        // The chosen label itself is the answer turn; no confirmation step.
        self.pending.clear();
        self.history.append(Turn::user(label));
        self.launch();
    }

    fn handle_approval(&mut self, decision: ApprovalDecision) {
        if self.phase != SessionPhase::AwaitingApproval {
            self.ui
                .set_status("no approval is pending", StatusLevel::Warn);
            return;
        }
        let Some(request) = self.pending_approval.take() else {
            tracing::warn!("awaiting approval with no pending request; resetting to idle");
            self.phase = SessionPhase::Idle;
            return;
        };

        match decision {
            ApprovalDecision::Deny => {
                let target = match &request.file_path {
                    Some(path) => format!("{} on {path}", request.tool_name),
                    None => request.tool_name.clone(),
                };
                self.pending = format!(
                    "[operation denied: {target}. The user will provide new instructions.]"
                );
                self.phase = SessionPhase::AwaitingAnswer;
                self.ui.post_message(
                    SYSTEM_SENDER,
                    &format!(
                        "Operation denied: {target} was cancelled. Provide instructions on how to proceed."
                    ),
                    MessageKind::System,
                );
                self.ui.set_status(
                    "operation denied; waiting for instructions",
                    StatusLevel::Warn,
                );
            }
            ApprovalDecision::Approve
            | ApprovalDecision::ApproveForSession
            | ApprovalDecision::ApproveAlways => {
                match decision {
                    ApprovalDecision::ApproveForSession => {
                        self.approvals.approve_for_session(&request.tool_name);
                    }
                    ApprovalDecision::ApproveAlways => {
                        self.approvals.approve_persistently(&request.tool_name);
                    }
                    _ => {}
                }
                let mut content =
                    String::from("Please proceed with the approved operation:\n");
                content.push_str(&format!("- Tool: {}", request.tool_name));
                if let Some(path) = &request.file_path {
                    content.push_str(&format!("\n- File: {path}"));
                }
                content.push_str("\n\nThe operation was approved. Please continue executing.");
                self.history.append(Turn::user(content));
                self.ui
                    .set_status("approved; continuing", StatusLevel::Info);
                self.launch();
            }
        }
    }

    fn handle_reset(&mut self) {
        self.abort_current();
        self.history.reset();
        self.pending.clear();
        self.pending_approval = None;
        self.approvals.clear_session();
        self.phase = SessionPhase::Idle;
        self.ui.set_working(false);
        self.ui.set_current_tool(None);
        self.ui.set_status("new conversation", StatusLevel::Info);
    }

    // -----------------------------------------------------------------------
    // Generation events
    // -----------------------------------------------------------------------

    fn handle_generation_event(&mut self, event: GenerationEvent) {
        let generation = match &event {
            GenerationEvent::Event { generation, .. }
            | GenerationEvent::Stderr { generation, .. }
            | GenerationEvent::Exited { generation, .. }
            | GenerationEvent::Faulted { generation, .. } => *generation,
        };
        // Events from a terminated generation must never be processed; this
        // also covers lines that were already queued before the kill landed.
        if self.current.as_ref().map(|g| g.id) != Some(generation) {
            tracing::debug!(generation, "dropping event from stale generation");
            return;
        }

        match event {
            GenerationEvent::Event { event, .. } => self.handle_stream_event(event),
            GenerationEvent::Stderr { line, .. } => {
                self.ui.post_message(
                    SYSTEM_SENDER,
                    &format!("[error] {line}"),
                    MessageKind::Error,
                );
            }
            GenerationEvent::Exited {
                exit_code,
                timed_out,
                ..
            } => self.handle_exited(exit_code, timed_out),
            GenerationEvent::Faulted { error, .. } => self.fail(error),
        }
    }

    fn handle_stream_event(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::Text { text } => {
                self.ui.post_message(AGENT_SENDER, &text, MessageKind::Agent);
            }
            // Internal tool-result echoes are never surfaced.
            StreamEvent::User {} => {}
            StreamEvent::Assistant { message } => {
                if let Some(message) = message {
                    self.process_assistant(message);
                }
            }
            StreamEvent::System {} => {
                tracing::debug!("agent system event");
            }
            StreamEvent::Error { error } => {
                let text = error.unwrap_or_else(|| "agent reported an error".to_string());
                self.ui
                    .post_message(SYSTEM_SENDER, &text, MessageKind::Error);
                self.ui.set_status("agent error", StatusLevel::Error);
            }
            StreamEvent::Result {
                permission_denials,
                total_cost_usd,
                duration_ms,
                duration_api_ms,
                num_turns,
                result,
            } => {
                if let Some(result) = &result {
                    tracing::debug!("result text: {}", preview(result, 120));
                }
                self.handle_result(
                    permission_denials,
                    total_cost_usd,
                    duration_ms,
                    duration_api_ms,
                    num_turns,
                );
            }
            StreamEvent::Unknown => {
                tracing::debug!("ignoring unrecognized agent event type");
            }
        }
    }

    fn process_assistant(&mut self, message: AssistantMessage) {
        if let Some(usage) = message.usage {
            self.ui.report_token_usage(usage);
        }

        let mut full_text = String::new();
        for block in message.content {
            match block {
                ContentBlock::Text { text } => {
                    full_text.push_str(&text);
                    // Text after a tool means the tool finished.
                    self.ui.set_current_tool(None);
                }
                ContentBlock::Thinking { thinking } => {
                    if !thinking.is_empty() {
                        self.ui
                            .post_message(AGENT_SENDER, &thinking, MessageKind::Thinking);
                    }
                }
                ContentBlock::ToolUse { id, name, input } => {
                    if name == ASK_USER_QUESTION_TOOL {
                        self.enter_question(&input);
                        return;
                    }
                    if approval::requires_pause(&name, self.auto_approve, self.approvals.as_ref())
                    {
                        let request = approval::build_request(&name, &id, &input);
                        self.enter_approval(request);
                        return;
                    }
                    self.ui.set_current_tool(Some(&name));
                }
                ContentBlock::Other => {}
            }
        }

        // Text blocks are concatenated in order and emitted as one message;
        // other block kinds never contribute to it.
        if !full_text.is_empty() {
            self.history.append(Turn::assistant(full_text.clone()));
            self.ui
                .post_message(AGENT_SENDER, &full_text, MessageKind::Agent);
        }
    }

    fn handle_result(
        &mut self,
        denials: Vec<protocol::PermissionDenial>,
        total_cost_usd: f64,
        duration_ms: u64,
        duration_api_ms: u64,
        num_turns: u32,
    ) {
        if !denials.is_empty() {
            // A denied result supersedes normal completion.
            let total = denials.len();
            let first_pausing = denials.into_iter().find(|denial| {
                approval::requires_pause(
                    &denial.tool_name,
                    self.auto_approve,
                    self.approvals.as_ref(),
                )
            });
            match first_pausing {
                Some(denial) => {
                    if total > 1 {
                        // Only the first denial is handled; make the rest
                        // visible instead of dropping them silently.
                        tracing::warn!(
                            skipped = total - 1,
                            "multiple permission denials in one result; handling the first only"
                        );
                        self.ui.post_message(
                            SYSTEM_SENDER,
                            &format!(
                                "Note: {} additional permission denial(s) were reported and not handled.",
                                total - 1
                            ),
                            MessageKind::System,
                        );
                    }
                    let request = approval::build_request(
                        &denial.tool_name,
                        &denial.tool_use_id,
                        &denial.tool_input,
                    );
                    self.enter_approval(request);
                }
                None => {
                    // Every denied tool is exempt by now (approved meanwhile
                    // or auto-approval turned on); the turn still did not
                    // complete successfully.
                    self.phase = SessionPhase::Idle;
                    self.ui.set_working(false);
                    self.ui.set_current_tool(None);
                    self.ui.set_status(
                        &format!("turn ended with {total} permission denial(s)"),
                        StatusLevel::Warn,
                    );
                }
            }
            return;
        }

        tracing::info!(
            duration_ms,
            duration_api_ms,
            num_turns,
            "agent turn completed"
        );
        self.phase = SessionPhase::Idle;
        self.ui.set_working(false);
        self.ui.set_current_tool(None);
        self.ui.set_status(
            &format!("done (${total_cost_usd:.4})"),
            StatusLevel::Success,
        );
    }

    fn handle_exited(&mut self, exit_code: Option<i32>, timed_out: bool) {
        self.current = None;
        if timed_out {
            let limit = Duration::from_secs(self.config.turn_timeout_secs.unwrap_or_default());
            self.fail(SessionError::Timeout(limit));
            return;
        }
        if self.phase == SessionPhase::Dispatching {
            // The generation ended without a result event or a pause.
            self.phase = SessionPhase::Error;
            self.ui.set_working(false);
            self.ui.set_current_tool(None);
            let code = exit_code
                .map(|code| code.to_string())
                .unwrap_or_else(|| "killed".to_string());
            self.ui.set_status(
                &format!("agent process exited unexpectedly (exit: {code})"),
                StatusLevel::Error,
            );
        }
    }

    // -----------------------------------------------------------------------
    // Pauses
    // -----------------------------------------------------------------------

    fn enter_question(&mut self, input: &serde_json::Value) {
        let prompt = protocol::extract_question(input);
        // The agent cannot receive an answer mid-run: stdin is already
        // closed. Kill the generation now and relaunch once answered.
        self.abort_current();
        self.phase = SessionPhase::AwaitingAnswer;
        self.pending = prompt.text.clone();
        self.pending_approval = None;
        self.ui.set_working(false);
        self.ui.set_current_tool(None);
        self.ui
            .post_message(AGENT_SENDER, &prompt.text, MessageKind::Question);
        self.ui.present_question(&prompt.text, &prompt.options);
        self.ui
            .set_status("waiting for your answer", StatusLevel::Working);
    }

    fn enter_approval(&mut self, request: ApprovalRequest) {
        self.abort_current();
        self.phase = SessionPhase::AwaitingApproval;
        self.pending.clear();
        self.ui.set_working(false);
        self.ui.set_current_tool(None);
        self.ui.present_approval(&request);
        self.ui
            .set_status("waiting for approval", StatusLevel::Working);
        self.pending_approval = Some(request);
    }

    // -----------------------------------------------------------------------
    // Launch and teardown
    // -----------------------------------------------------------------------

    fn launch(&mut self) {
        // Relaunch is never concurrent with the generation it replaces.
        self.abort_current();

        let Some(program) = self.resolver.resolve() else {
            self.fail(crate::error::LaunchError::ExecutableNotFound.into());
            return;
        };
        let payload = match protocol::encode_turns(self.history.turns()) {
            Ok(payload) => payload,
            Err(err) => {
                self.fail(err.into());
                return;
            }
        };

        let id = self.next_generation;
        self.next_generation += 1;
        match launcher::spawn_generation(
            id,
            &program,
            &self.config,
            self.auto_approve,
            payload,
            self.events_tx.clone(),
        ) {
            Ok(handle) => {
                self.current = Some(handle);
                self.phase = SessionPhase::Dispatching;
                self.ui.set_working(true);
                self.ui.set_status("working", StatusLevel::Working);
            }
            Err(err) => self.fail(err.into()),
        }
    }

    fn abort_current(&mut self) {
        if let Some(generation) = self.current.take() {
            tracing::debug!(generation = generation.id, "terminating generation");
            generation.terminate();
        }
    }

    fn fail(&mut self, error: SessionError) {
        self.abort_current();
        self.phase = SessionPhase::Error;
        self.ui.set_working(false);
        self.ui.set_current_tool(None);
        self.ui.set_status(&error.to_string(), StatusLevel::Error);
    }

    fn teardown(&mut self) {
        self.abort_current();
        self.ui.set_working(false);
        self.ui.set_current_tool(None);
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            phase: self.phase,
            turns: self.history.snapshot(),
            auto_approve: self.auto_approve,
            generation_live: self.current.is_some(),
        }
    }
}
