//! CLI entry point for liaison.
//!
//! A minimal line-oriented frontend: chat output goes to stdout, status and
//! diagnostics to stderr, and each stdin line is routed according to the
//! session phase (message, answer, option pick, or approval decision).

mod cli;

use clap::Parser;
use liaison::approval::{ApprovalDecision, ApprovalRequest};
use liaison::config::load_config;
use liaison::launcher::PathResolver;
use liaison::prefs::JsonApprovalStore;
use liaison::protocol::TokenUsage;
use liaison::session::{
    spawn_session, SessionCommand, SessionHandle, SessionPhase, SessionSpawnConfig,
};
use liaison::ui::{MessageKind, StatusLevel, UiSink};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Keep stdout clean for chat output; diagnostics go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = cli::Args::parse();

    let mut config = match load_config(args.config.as_deref().map(Path::new)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    };

    // Apply CLI overrides.
    if let Some(cli_path) = &args.cli {
        config.cli_path = Some(PathBuf::from(cli_path));
    }
    if let Some(root) = &args.project_root {
        config.project_root = Some(PathBuf::from(root));
    }
    if args.ask {
        config.auto_approve = false;
    }
    if args.timeout_secs.is_some() {
        config.turn_timeout_secs = args.timeout_secs;
    }

    let approvals_path = config
        .approvals_file
        .clone()
        .unwrap_or_else(|| JsonApprovalStore::default_path(config.project_root.as_deref()));
    let approvals = Arc::new(JsonApprovalStore::open(approvals_path));
    let resolver = Arc::new(PathResolver::from_config(&config));
    let sink = Arc::new(ConsoleSink::default());

    eprintln!("liaison {}", liaison::build_info::startup_metadata_line());

    let handle = spawn_session(SessionSpawnConfig {
        config,
        resolver,
        approvals,
        ui: sink.clone(),
    });

    if let Some(prompt) = args.prompt {
        send_or_exit(&handle, SessionCommand::SendMessage { text: prompt }).await;
    }

    run_input_loop(&handle, &sink).await;
    let _ = handle.send(SessionCommand::Shutdown).await;
}

/// Read stdin lines and route them by the current session phase.
async fn run_input_loop(handle: &SessionHandle, sink: &Arc<ConsoleSink>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) | Err(_) => break,
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        match input {
            "/quit" | "/exit" => break,
            "/reset" => {
                send_or_exit(handle, SessionCommand::Reset).await;
                continue;
            }
            "/auto on" => {
                send_or_exit(handle, SessionCommand::SetAutoApprove { enabled: true }).await;
                continue;
            }
            "/auto off" => {
                send_or_exit(handle, SessionCommand::SetAutoApprove { enabled: false }).await;
                continue;
            }
            _ => {}
        }

        let phase = match handle.snapshot().await {
            Ok(snapshot) => snapshot.phase,
            Err(_) => break,
        };
        match phase {
            SessionPhase::AwaitingApproval => match parse_decision(input) {
                Some(decision) => {
                    send_or_exit(handle, SessionCommand::Approve { decision }).await;
                }
                None => {
                    eprintln!("~ reply with [y]es, [s]ession, [a]lways, or [n]o");
                }
            },
            SessionPhase::AwaitingAnswer => {
                // Bare numbers pick the matching suggested option.
                let picked = input
                    .parse::<usize>()
                    .ok()
                    .and_then(|n| n.checked_sub(1))
                    .and_then(|index| sink.option_label(index));
                let command = match picked {
                    Some(label) => SessionCommand::ChooseOption { label },
                    None => SessionCommand::SendMessage {
                        text: input.to_string(),
                    },
                };
                send_or_exit(handle, command).await;
            }
            _ => {
                send_or_exit(
                    handle,
                    SessionCommand::SendMessage {
                        text: input.to_string(),
                    },
                )
                .await;
            }
        }
    }
}

async fn send_or_exit(handle: &SessionHandle, command: SessionCommand) {
    if handle.send(command).await.is_err() {
        eprintln!("error: session ended");
        std::process::exit(1);
    }
}

/// Map one input line to an approval decision.
fn parse_decision(input: &str) -> Option<ApprovalDecision> {
    match input.to_ascii_lowercase().as_str() {
        "y" | "yes" | "approve" => Some(ApprovalDecision::Approve),
        "s" | "session" => Some(ApprovalDecision::ApproveForSession),
        "a" | "always" => Some(ApprovalDecision::ApproveAlways),
        "n" | "no" | "deny" => Some(ApprovalDecision::Deny),
        _ => None,
    }
}

/// Line-printing UI sink. Remembers the last presented options so numeric
/// input can be mapped back to an option label.
#[derive(Default)]
struct ConsoleSink {
    options: Mutex<Vec<String>>,
}

impl ConsoleSink {
    fn option_label(&self, index: usize) -> Option<String> {
        self.options.lock().unwrap().get(index).cloned()
    }
}

impl UiSink for ConsoleSink {
    fn post_message(&self, sender: &str, text: &str, kind: MessageKind) {
        match kind {
            MessageKind::Thinking => println!("{sender} (thinking): {text}"),
            MessageKind::Error => eprintln!("{sender}: {text}"),
            _ => println!("{sender}: {text}"),
        }
    }

    fn set_working(&self, working: bool) {
        if working {
            eprintln!("... working");
        }
    }

    fn set_current_tool(&self, tool: Option<&str>) {
        if let Some(tool) = tool {
            eprintln!("... running {tool}");
        }
    }

    fn report_token_usage(&self, usage: TokenUsage) {
        eprintln!(
            "... tokens: {} in / {} out / {} cached",
            usage.input_tokens, usage.output_tokens, usage.cache_read_input_tokens
        );
    }

    fn set_status(&self, text: &str, level: StatusLevel) {
        let marker = match level {
            StatusLevel::Info => "-",
            StatusLevel::Working => "...",
            StatusLevel::Success => "ok:",
            StatusLevel::Warn => "~",
            StatusLevel::Error => "!",
        };
        eprintln!("{marker} {text}");
    }

    fn present_approval(&self, request: &ApprovalRequest) {
        println!("{}", request.display_text());
        println!("approve? [y]es / [s]ession / [a]lways / [n]o");
    }

    fn present_question(&self, _text: &str, options: &[String]) {
        // The question text itself arrives as a Question message.
        let mut stored = self.options.lock().unwrap();
        *stored = options.to_vec();
        if !options.is_empty() {
            for (index, label) in options.iter().enumerate() {
                println!("  {}. {label}", index + 1);
            }
            println!("pick an option by number, or type an answer");
        }
    }
}
