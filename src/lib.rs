//! Liaison — a session orchestrator for a non-interactive CLI coding agent.
//!
//! The external agent holds no session state: every conversational turn
//! spawns one subprocess, resends the entire history on stdin, and streams
//! newline-delimited JSON events back on stdout. This crate owns process
//! spawning and teardown, the wire codec, the append-only history, and the
//! cooperative state machine that pauses the agent whenever it asks the human
//! a question or requests permission for a sensitive operation.
//!
//! # Quick start
//!
//! ```no_run
//! use liaison::approval::MemoryApprovalStore;
//! use liaison::config::Config;
//! use liaison::launcher::PathResolver;
//! use liaison::session::{spawn_session, SessionCommand, SessionSpawnConfig};
//! use std::sync::Arc;
//!
//! # async fn example(ui: Arc<dyn liaison::ui::UiSink>) {
//! let config = Config::default();
//! let resolver = Arc::new(PathResolver::from_config(&config));
//! let handle = spawn_session(SessionSpawnConfig {
//!     config,
//!     resolver,
//!     approvals: Arc::new(MemoryApprovalStore::new()),
//!     ui,
//! });
//! handle
//!     .send(SessionCommand::SendMessage { text: "list the files".into() })
//!     .await
//!     .unwrap();
//! # }
//! ```

pub mod approval;
pub mod build_info;
pub mod config;
pub mod error;
pub mod history;
pub mod launcher;
pub mod prefs;
pub mod protocol;
pub mod session;
#[cfg(test)]
pub mod testsupport;
pub mod textutil;
pub mod ui;
