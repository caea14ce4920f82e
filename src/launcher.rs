//! Agent process launching and per-generation stream plumbing.
//!
//! Each conversational turn spawns one agent subprocess generation: the full
//! history is written to its stdin (then stdin is closed, which is the only
//! end-of-turn signal the agent understands), and two background reader loops
//! decode stdout/stderr until exit. A supervisor task waits for the process,
//! joins the readers, and reports the outcome. Cancellation is a watch
//! channel checked on every read iteration; forceful kill is the only way to
//! stop a generation early.

use crate::config::Config;
use crate::error::{LaunchError, SessionError};
use crate::protocol::{self, StreamEvent};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{mpsc, watch};

// ---------------------------------------------------------------------------
// Executable resolution
// ---------------------------------------------------------------------------

/// Locates the agent executable; consulted once per launch.
pub trait CliResolver: Send + Sync {
    fn resolve(&self) -> Option<PathBuf>;
}

/// Default resolver: explicit configured path first, then PATH candidates.
#[derive(Debug, Clone)]
pub struct PathResolver {
    configured: Option<PathBuf>,
    candidates: Vec<String>,
}

impl PathResolver {
    pub fn from_config(config: &Config) -> Self {
        Self {
            configured: config.cli_path.clone(),
            candidates: config.cli_candidates.clone(),
        }
    }
}

impl CliResolver for PathResolver {
    fn resolve(&self) -> Option<PathBuf> {
        if let Some(path) = &self.configured {
            if path.is_file() {
                return Some(path.clone());
            }
            tracing::warn!(
                "configured agent path {} does not exist; falling back to PATH",
                path.display()
            );
        }
        let path_var = std::env::var_os("PATH")?;
        find_on_path(&path_var, &self.candidates)
    }
}

/// Probe PATH directories for each candidate name, candidate-major so the
/// preferred name wins anywhere on PATH over a later name earlier on it.
fn find_on_path(path_var: &std::ffi::OsStr, candidates: &[String]) -> Option<PathBuf> {
    for candidate in candidates {
        for dir in std::env::split_paths(path_var) {
            let full = dir.join(candidate);
            if full.is_file() {
                return Some(full);
            }
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Command construction
// ---------------------------------------------------------------------------

/// Deterministic argument vector for one generation.
pub fn build_args(config: &Config, auto_approve: bool) -> Vec<String> {
    vec![
        "-p".to_string(),
        "--system-prompt".to_string(),
        config.system_prompt.clone(),
        "--verbose".to_string(),
        "--output-format".to_string(),
        "stream-json".to_string(),
        "--permission-mode".to_string(),
        if auto_approve {
            "bypassPermissions".to_string()
        } else {
            "default".to_string()
        },
        "--max-turns".to_string(),
        config.max_turns.to_string(),
    ]
}

/// Working directory for generations: project root, else current dir.
fn working_dir(config: &Config) -> PathBuf {
    if let Some(root) = &config.project_root {
        return root.clone();
    }
    match std::env::current_dir() {
        Ok(dir) => {
            tracing::warn!(
                "no project root configured; running agent in {}",
                dir.display()
            );
            dir
        }
        Err(_) => PathBuf::from("."),
    }
}

// ---------------------------------------------------------------------------
// Generation lifecycle
// ---------------------------------------------------------------------------

/// Events produced by one generation's background tasks, tagged with the
/// generation id so the session can drop events from a terminated generation.
#[derive(Debug)]
pub(crate) enum GenerationEvent {
    /// One decoded protocol event from stdout.
    Event { generation: u64, event: StreamEvent },
    /// One stderr line.
    Stderr { generation: u64, line: String },
    /// Process exit after readers were joined.
    Exited {
        generation: u64,
        exit_code: Option<i32>,
        timed_out: bool,
    },
    /// Pipe-level failure that terminated this generation.
    Faulted {
        generation: u64,
        error: SessionError,
    },
}

/// Control handle for one live generation held by the session.
#[derive(Debug)]
pub(crate) struct GenerationHandle {
    pub(crate) id: u64,
    cancel: watch::Sender<bool>,
}

impl GenerationHandle {
    /// Request forceful termination; readers and supervisor react to the
    /// cancellation signal, kill the process, and drain out.
    pub(crate) fn terminate(&self) {
        let _ = self.cancel.send(true);
    }
}

/// Spawn one agent generation: process, payload write, readers, supervisor.
pub(crate) fn spawn_generation(
    id: u64,
    program: &Path,
    config: &Config,
    auto_approve: bool,
    payload: String,
    events: mpsc::UnboundedSender<GenerationEvent>,
) -> Result<GenerationHandle, LaunchError> {
    let mut command = Command::new(program);
    command
        .args(build_args(config, auto_approve))
        .current_dir(working_dir(config))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        // Backstop: if the session is dropped mid-turn, the runtime reaps the
        // child when its owning future goes away.
        .kill_on_drop(true);

    let mut child = command.spawn().map_err(LaunchError::Spawn)?;
    tracing::debug!(generation = id, pid = child.id(), "agent generation spawned");

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| LaunchError::Spawn(std::io::Error::other("child stdin not captured")))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| LaunchError::Spawn(std::io::Error::other("child stdout not captured")))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| LaunchError::Spawn(std::io::Error::other("child stderr not captured")))?;

    let (cancel_tx, _) = watch::channel(false);
    let limit = config.turn_timeout_secs.map(Duration::from_secs);

    let stdout_task = spawn_stdout_reader(id, stdout, events.clone(), cancel_tx.subscribe());
    let stderr_task = spawn_stderr_reader(id, stderr, events.clone(), cancel_tx.subscribe());

    let mut cancel_rx = cancel_tx.subscribe();
    tokio::spawn(async move {
        if let Err(err) = write_payload(stdin, &payload).await {
            let _ = child.start_kill();
            let _ = child.wait().await;
            let _ = stdout_task.await;
            let _ = stderr_task.await;
            let _ = events.send(GenerationEvent::Faulted {
                generation: id,
                error: SessionError::Launch(LaunchError::Stdin(err)),
            });
            return;
        }

        let mut timed_out = false;
        let exit = match limit {
            Some(limit) => {
                match tokio::time::timeout(limit, wait_or_cancel(&mut child, &mut cancel_rx)).await
                {
                    Ok(exit) => exit,
                    Err(_) => {
                        timed_out = true;
                        let _ = child.start_kill();
                        child.wait().await
                    }
                }
            }
            None => wait_or_cancel(&mut child, &mut cancel_rx).await,
        };

        // Readers see closed pipes as ordinary end-of-stream once the process
        // is gone; join them before reporting exit.
        let _ = stdout_task.await;
        let _ = stderr_task.await;

        match exit {
            Ok(status) => {
                tracing::debug!(generation = id, code = ?status.code(), timed_out, "agent generation exited");
                let _ = events.send(GenerationEvent::Exited {
                    generation: id,
                    exit_code: status.code(),
                    timed_out,
                });
            }
            Err(err) => {
                let _ = events.send(GenerationEvent::Faulted {
                    generation: id,
                    error: SessionError::Stream(err),
                });
            }
        }
    });

    Ok(GenerationHandle {
        id,
        cancel: cancel_tx,
    })
}

/// Write the encoded history and close stdin to signal end of turn.
async fn write_payload(mut stdin: ChildStdin, payload: &str) -> std::io::Result<()> {
    stdin.write_all(payload.as_bytes()).await?;
    stdin.write_all(b"\n").await?;
    stdin.flush().await?;
    // Dropping the handle closes the pipe; the agent treats end-of-input as
    // "turn is complete, begin processing".
    drop(stdin);
    Ok(())
}

/// Wait for natural exit, or kill on the cancellation signal.
async fn wait_or_cancel(
    child: &mut Child,
    cancel: &mut watch::Receiver<bool>,
) -> std::io::Result<std::process::ExitStatus> {
    tokio::select! {
        status = child.wait() => status,
        _ = cancel.changed() => {
            let _ = child.start_kill();
            child.wait().await
        }
    }
}

fn spawn_stdout_reader(
    id: u64,
    stdout: tokio::process::ChildStdout,
    events: mpsc::UnboundedSender<GenerationEvent>,
    mut cancel: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stdout).lines();
        loop {
            tokio::select! {
                _ = cancel.changed() => break,
                line = lines.next_line() => match line {
                    Ok(Some(line)) => {
                        let trimmed = line.trim();
                        if trimmed.is_empty() {
                            continue;
                        }
                        match protocol::parse_line(trimmed) {
                            Ok(event) => {
                                if events
                                    .send(GenerationEvent::Event {
                                        generation: id,
                                        event,
                                    })
                                    .is_err()
                                {
                                    break;
                                }
                            }
                            Err(err) => {
                                // Malformed lines never abort the session.
                                tracing::warn!(generation = id, "skipping agent output line: {err}");
                            }
                        }
                    }
                    Ok(None) => break,
                    Err(err) => {
                        let _ = events.send(GenerationEvent::Faulted {
                            generation: id,
                            error: SessionError::Stream(err),
                        });
                        break;
                    }
                },
            }
        }
    })
}

fn spawn_stderr_reader(
    id: u64,
    stderr: tokio::process::ChildStderr,
    events: mpsc::UnboundedSender<GenerationEvent>,
    mut cancel: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        loop {
            tokio::select! {
                _ = cancel.changed() => break,
                line = lines.next_line() => match line {
                    Ok(Some(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        if events
                            .send(GenerationEvent::Stderr {
                                generation: id,
                                line,
                            })
                            .is_err()
                        {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(err) => {
                        tracing::warn!(generation = id, "agent stderr read error: {err}");
                        break;
                    }
                },
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testsupport::TestTempDir;

    fn test_config(root: &TestTempDir) -> Config {
        Config {
            project_root: Some(root.path().to_path_buf()),
            ..Config::default()
        }
    }

    #[test]
    fn build_args_maps_auto_approve_to_bypass() {
        let config = Config::default();
        let args = build_args(&config, true);
        let mode_index = args
            .iter()
            .position(|a| a == "--permission-mode")
            .expect("mode flag present");
        assert_eq!(args[mode_index + 1], "bypassPermissions");
    }

    #[test]
    fn build_args_asks_by_default_mode_when_not_auto() {
        let args = build_args(&Config::default(), false);
        assert!(args.contains(&"default".to_string()));
        assert!(!args.contains(&"bypassPermissions".to_string()));
    }

    #[test]
    fn build_args_carries_fixed_flags() {
        let config = Config {
            max_turns: 7,
            system_prompt: "be brief".into(),
            ..Config::default()
        };
        let args = build_args(&config, false);
        assert_eq!(args[0], "-p");
        assert!(args.windows(2).any(|w| w[0] == "--system-prompt" && w[1] == "be brief"));
        assert!(args.windows(2).any(|w| w[0] == "--output-format" && w[1] == "stream-json"));
        assert!(args.windows(2).any(|w| w[0] == "--max-turns" && w[1] == "7"));
        assert!(args.contains(&"--verbose".to_string()));
    }

    // Ensures candidate order wins over PATH directory order.
    #[test]
    fn find_on_path_is_candidate_major() {
        let first = TestTempDir::new("path-a");
        let second = TestTempDir::new("path-b");
        first.write_text("beta", "");
        second.write_text("alpha", "");
        let path_var = std::env::join_paths([first.path(), second.path()]).unwrap();
        let found = find_on_path(
            &path_var,
            &["alpha".to_string(), "beta".to_string()],
        )
        .expect("should find a candidate");
        assert_eq!(found, second.child("alpha"));
    }

    #[test]
    fn find_on_path_returns_none_when_absent() {
        let dir = TestTempDir::new("path-empty");
        let path_var = std::env::join_paths([dir.path()]).unwrap();
        assert!(find_on_path(&path_var, &["missing".to_string()]).is_none());
    }

    #[test]
    fn resolver_prefers_existing_configured_path() {
        let dir = TestTempDir::new("resolver");
        let cli = dir.write_text("agent-bin", "#!/bin/sh\n");
        let resolver = PathResolver {
            configured: Some(cli.clone()),
            candidates: vec!["does-not-exist-anywhere".to_string()],
        };
        assert_eq!(resolver.resolve(), Some(cli));
    }

    #[cfg(unix)]
    mod process_tests {
        use super::*;
        use std::os::unix::fs::PermissionsExt;

        /// Write an executable stub agent script.
        fn write_stub(dir: &TestTempDir, name: &str, body: &str) -> std::path::PathBuf {
            let path = dir.write_text(name, &format!("#!/bin/sh\n{body}\n"));
            let mut perms = std::fs::metadata(&path).unwrap().permissions();
            perms.set_mode(0o755);
            std::fs::set_permissions(&path, perms).unwrap();
            path
        }

        async fn next_event(
            rx: &mut mpsc::UnboundedReceiver<GenerationEvent>,
        ) -> GenerationEvent {
            tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("event within timeout")
                .expect("channel open")
        }

        // Ensures a well-behaved stub produces a result event then exit.
        #[tokio::test]
        async fn generation_emits_events_then_exit() {
            let dir = TestTempDir::new("gen-ok");
            let stub = write_stub(
                &dir,
                "agent",
                r#"cat >/dev/null
printf '%s\n' '{"type":"text","text":"hi"}'
printf '%s\n' '{"type":"result","total_cost_usd":0.01}'"#,
            );
            let config = test_config(&dir);
            let (tx, mut rx) = mpsc::unbounded_channel();
            let handle =
                spawn_generation(1, &stub, &config, true, "[]".to_string(), tx).unwrap();
            assert_eq!(handle.id, 1);

            let first = next_event(&mut rx).await;
            assert!(
                matches!(
                    &first,
                    GenerationEvent::Event { generation: 1, event: StreamEvent::Text { text } }
                    if text == "hi"
                ),
                "got: {first:?}"
            );
            let second = next_event(&mut rx).await;
            assert!(matches!(
                second,
                GenerationEvent::Event {
                    event: StreamEvent::Result { .. },
                    ..
                }
            ));
            let third = next_event(&mut rx).await;
            assert!(matches!(
                third,
                GenerationEvent::Exited {
                    exit_code: Some(0),
                    timed_out: false,
                    ..
                }
            ));
        }

        // Ensures malformed lines are skipped without ending the stream.
        #[tokio::test]
        async fn malformed_lines_are_skipped() {
            let dir = TestTempDir::new("gen-bad-line");
            let stub = write_stub(
                &dir,
                "agent",
                r#"cat >/dev/null
printf '%s\n' 'this is not json'
printf '%s\n' '{"type":"text","text":"still here"}'"#,
            );
            let config = test_config(&dir);
            let (tx, mut rx) = mpsc::unbounded_channel();
            let _handle =
                spawn_generation(2, &stub, &config, true, "[]".to_string(), tx).unwrap();

            let first = next_event(&mut rx).await;
            assert!(
                matches!(
                    &first,
                    GenerationEvent::Event { event: StreamEvent::Text { text }, .. }
                    if text == "still here"
                ),
                "got: {first:?}"
            );
        }

        // Ensures terminate kills a long-running generation promptly.
        #[tokio::test]
        async fn terminate_kills_generation() {
            let dir = TestTempDir::new("gen-kill");
            let stub = write_stub(
                &dir,
                "agent",
                r#"cat >/dev/null
sleep 30
printf '%s\n' '{"type":"result"}'"#,
            );
            let config = test_config(&dir);
            let (tx, mut rx) = mpsc::unbounded_channel();
            let handle =
                spawn_generation(3, &stub, &config, true, "[]".to_string(), tx).unwrap();

            tokio::time::sleep(Duration::from_millis(100)).await;
            handle.terminate();

            let event = next_event(&mut rx).await;
            match event {
                GenerationEvent::Exited { exit_code, .. } => {
                    // Killed by signal, so no exit code on unix.
                    assert_eq!(exit_code, None);
                }
                other => panic!("expected exit event, got {other:?}"),
            }
        }

        // Ensures the configured timeout kills the generation and flags it.
        #[tokio::test]
        async fn turn_timeout_kills_and_flags() {
            let dir = TestTempDir::new("gen-timeout");
            let stub = write_stub(
                &dir,
                "agent",
                r#"cat >/dev/null
sleep 30"#,
            );
            let config = Config {
                turn_timeout_secs: Some(1),
                ..test_config(&dir)
            };
            let (tx, mut rx) = mpsc::unbounded_channel();
            let _handle =
                spawn_generation(4, &stub, &config, true, "[]".to_string(), tx).unwrap();

            let event = next_event(&mut rx).await;
            assert!(
                matches!(event, GenerationEvent::Exited { timed_out: true, .. }),
                "got: {event:?}"
            );
        }

        // Ensures stderr lines surface as stderr events.
        #[tokio::test]
        async fn stderr_lines_are_forwarded() {
            let dir = TestTempDir::new("gen-stderr");
            let stub = write_stub(
                &dir,
                "agent",
                r#"cat >/dev/null
echo 'something went wrong' >&2"#,
            );
            let config = test_config(&dir);
            let (tx, mut rx) = mpsc::unbounded_channel();
            let _handle =
                spawn_generation(5, &stub, &config, true, "[]".to_string(), tx).unwrap();

            let event = next_event(&mut rx).await;
            assert!(
                matches!(
                    &event,
                    GenerationEvent::Stderr { line, .. } if line.contains("something went wrong")
                ),
                "got: {event:?}"
            );
        }

        #[tokio::test]
        async fn spawn_missing_program_is_a_launch_error() {
            let dir = TestTempDir::new("gen-missing");
            let config = test_config(&dir);
            let (tx, _rx) = mpsc::unbounded_channel();
            let err = spawn_generation(
                6,
                Path::new("/nonexistent/agent-binary"),
                &config,
                true,
                "[]".to_string(),
                tx,
            )
            .unwrap_err();
            assert!(matches!(err, LaunchError::Spawn(_)));
        }
    }
}
