//! Agent channel backed by the Claude CLI.
//!
//! Every message spawns one `claude -p` process with stream-json output.
//! Stdout lines are forwarded verbatim as `Output` events, so classification
//! sees the same framing any other channel would deliver. Conversation
//! continuity is carried by `--resume <session-id>`.

use crate::agents::base::{AgentChannel, AgentError};
use async_trait::async_trait;
use sc_protocol::{
    AgentExit, ChannelEvent, LoadAgentRequest, LoadAgentResult, SendMessageRequest,
    SendMessageResult,
};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{broadcast, Mutex};
use tokio_stream::wrappers::LinesStream;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const EVENT_CAPACITY: usize = 1024;

/// Claude CLI channel.
pub struct ClaudeCliChannel {
    binary: PathBuf,
    /// Prompt used to load an agent, with an `{agent_id}` placeholder.
    load_prompt: String,
    events: broadcast::Sender<ChannelEvent>,
    running: Arc<Mutex<RunningProcesses>>,
    next_process: AtomicU64,
}

/// Process currently serving each agent, tagged with a spawn counter.
type RunningProcesses = HashMap<String, (u64, CancellationToken)>;

impl ClaudeCliChannel {
    /// Create a channel for the given `claude` executable.
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            binary: binary.into(),
            load_prompt: "/{agent_id}".to_string(),
            events,
            running: Arc::new(Mutex::new(HashMap::new())),
            next_process: AtomicU64::new(0),
        }
    }

    /// Locate `claude` on `PATH`.
    pub fn locate() -> Result<Self, AgentError> {
        which::which("claude")
            .map(Self::new)
            .map_err(|e| AgentError::NotAvailable(format!("claude CLI not found on PATH: {e}")))
    }

    /// Override the agent load prompt.
    pub fn with_load_prompt(mut self, template: impl Into<String>) -> Self {
        self.load_prompt = template.into();
        self
    }

    fn build_command(&self, project_path: &str, prompt: &str, session_id: Option<&str>) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("-p").arg(prompt);
        cmd.arg("--output-format").arg("stream-json");
        cmd.arg("--verbose");
        cmd.arg("--permission-mode").arg("bypassPermissions");

        if let Some(sid) = session_id {
            cmd.arg("--resume").arg(sid);
        }

        cmd.current_dir(project_path);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);
        cmd
    }

    async fn spawn(
        &self,
        agent_id: &str,
        mut cmd: Command,
        is_load_phase: bool,
    ) -> Result<ProcessDriver, AgentError> {
        let child = cmd
            .spawn()
            .map_err(|e| AgentError::SpawnFailed(format!("{}: {e}", self.binary.display())))?;

        let cancel = CancellationToken::new();
        let process = self.next_process.fetch_add(1, Ordering::Relaxed);
        if let Some((_, previous)) = self
            .running
            .lock()
            .await
            .insert(agent_id.to_string(), (process, cancel.clone()))
        {
            previous.cancel();
        }

        Ok(ProcessDriver {
            agent_id: agent_id.to_string(),
            process,
            child,
            cancel,
            is_load_phase,
            events: self.events.clone(),
            running: Arc::clone(&self.running),
        })
    }
}

#[async_trait]
impl AgentChannel for ClaudeCliChannel {
    async fn load_agent(&self, request: LoadAgentRequest) -> LoadAgentResult {
        let prompt = self.load_prompt.replace("{agent_id}", &request.agent_id);
        let cmd = self.build_command(&request.project_path, &prompt, None);

        let result = match self.spawn(&request.agent_id, cmd, true).await {
            Ok(driver) => {
                let exit = driver.drive().await;
                match (&exit.session_id, exit.code) {
                    _ if exit.cancelled => LoadAgentResult::failed("cancelled"),
                    (Some(sid), Some(0)) => LoadAgentResult::loaded(sid.clone()),
                    (None, Some(0)) => LoadAgentResult::failed("agent did not report a session id"),
                    _ => LoadAgentResult::failed(
                        exit.error
                            .unwrap_or_else(|| format!("load exited with {:?}", exit.code)),
                    ),
                }
            }
            Err(e) => LoadAgentResult::failed(e.to_string()),
        };

        let _ = self.events.send(ChannelEvent::AgentLoaded {
            agent_id: request.agent_id,
            session_id: result.session_id.clone(),
            error: result.error.clone(),
        });
        result
    }

    async fn send_message(&self, request: SendMessageRequest) -> SendMessageResult {
        let cmd = self.build_command(
            &request.project_path,
            &request.message,
            request.session_id.as_deref(),
        );

        match self.spawn(&request.agent_id, cmd, false).await {
            Ok(driver) => {
                tokio::spawn(driver.drive());
                SendMessageResult::sent()
            }
            Err(e) => SendMessageResult::failed(e.to_string()),
        }
    }

    async fn cancel_message(&self, agent_id: &str) -> bool {
        match self.running.lock().await.remove(agent_id) {
            Some((_, token)) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<ChannelEvent> {
        self.events.subscribe()
    }
}

/// One spawned process, streamed until it exits or is cancelled.
struct ProcessDriver {
    agent_id: String,
    process: u64,
    child: Child,
    cancel: CancellationToken,
    is_load_phase: bool,
    events: broadcast::Sender<ChannelEvent>,
    running: Arc<Mutex<RunningProcesses>>,
}

impl ProcessDriver {
    /// Forward stdout as `Output` events and emit the final `Exit`.
    async fn drive(mut self) -> AgentExit {
        let stderr_task = self.child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut buf = String::new();
                let _ = stderr.read_to_string(&mut buf).await;
                buf
            })
        });

        let mut session_id = None;
        let mut cancelled = false;

        if let Some(stdout) = self.child.stdout.take() {
            let mut lines = LinesStream::new(BufReader::new(stdout).lines());
            loop {
                tokio::select! {
                    _ = self.cancel.cancelled() => {
                        cancelled = true;
                        break;
                    }
                    line = lines.next() => match line {
                        Some(Ok(line)) => {
                            if let Some(sid) = extract_session_id(&line) {
                                session_id = Some(sid);
                            }
                            let _ = self.events.send(ChannelEvent::Output {
                                agent_id: self.agent_id.clone(),
                                chunk: format!("{line}\n"),
                                is_load_phase: self.is_load_phase,
                            });
                        }
                        Some(Err(e)) => {
                            warn!(agent_id = %self.agent_id, error = %e, "Failed to read agent output");
                            break;
                        }
                        None => break,
                    }
                }
            }
        }

        if cancelled || self.cancel.is_cancelled() {
            cancelled = true;
            if let Err(e) = self.child.kill().await {
                debug!(agent_id = %self.agent_id, error = %e, "Agent process already gone");
            }
        }

        let status = self.child.wait().await;
        // Grandchildren of a killed process may keep stderr open.
        let stderr = match stderr_task {
            Some(task) if cancelled => {
                task.abort();
                String::new()
            }
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };

        {
            let mut running = self.running.lock().await;
            if running
                .get(&self.agent_id)
                .is_some_and(|(process, _)| *process == self.process)
            {
                running.remove(&self.agent_id);
            }
        }

        let exit = match status {
            Ok(status) => AgentExit {
                code: status.code(),
                signal: exit_signal(&status),
                error: (!status.success() && !stderr.trim().is_empty())
                    .then(|| stderr.trim().to_string()),
                session_id,
                cancelled,
                is_load_phase: self.is_load_phase,
            },
            Err(e) => AgentExit {
                code: None,
                signal: None,
                error: Some(e.to_string()),
                session_id,
                cancelled,
                is_load_phase: self.is_load_phase,
            },
        };

        let _ = self.events.send(ChannelEvent::Exit {
            agent_id: self.agent_id.clone(),
            exit: exit.clone(),
        });
        exit
    }
}

/// Session id carried by a stream-json line, if any.
fn extract_session_id(line: &str) -> Option<String> {
    let value: Value = serde_json::from_str(line.trim()).ok()?;
    value
        .get("session_id")
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[cfg(unix)]
fn exit_signal(status: &ExitStatus) -> Option<String> {
    use std::os::unix::process::ExitStatusExt;

    status.signal().map(|signal| match signal {
        2 => "SIGINT".to_string(),
        9 => "SIGKILL".to_string(),
        15 => "SIGTERM".to_string(),
        other => format!("signal {other}"),
    })
}

#[cfg(not(unix))]
fn exit_signal(_status: &ExitStatus) -> Option<String> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_session_id() {
        assert_eq!(
            extract_session_id(r#"{"type":"system","session_id":"abc-123"}"#),
            Some("abc-123".to_string())
        );
        assert_eq!(extract_session_id(r#"{"type":"assistant"}"#), None);
        assert_eq!(extract_session_id("plain text"), None);
    }

    #[test]
    fn test_build_command_resumes_session() {
        let channel = ClaudeCliChannel::new("claude");
        let cmd = channel.build_command(".", "*develop-story", Some("sid-1"));
        let args: Vec<_> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        assert_eq!(&args[..2], &["-p", "*develop-story"]);
        assert!(args.windows(2).any(|w| w == ["--output-format", "stream-json"]));
        assert!(args.windows(2).any(|w| w == ["--resume", "sid-1"]));
    }

    #[tokio::test]
    async fn test_cancel_without_process() {
        let channel = ClaudeCliChannel::new("claude");
        assert!(!channel.cancel_message("dev").await);
    }

    #[cfg(unix)]
    mod process {
        use super::*;
        use sc_protocol::ProjectProfile;
        use std::os::unix::fs::PermissionsExt;
        use std::time::Duration;

        fn fake_claude(dir: &tempfile::TempDir, body: &str) -> PathBuf {
            let path = dir.path().join("claude");
            std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        async fn next_exit(rx: &mut broadcast::Receiver<ChannelEvent>) -> (Vec<String>, AgentExit) {
            let mut chunks = Vec::new();
            loop {
                match tokio::time::timeout(Duration::from_secs(10), rx.recv()).await {
                    Ok(Ok(ChannelEvent::Output { chunk, .. })) => chunks.push(chunk),
                    Ok(Ok(ChannelEvent::Exit { exit, .. })) => return (chunks, exit),
                    Ok(Ok(_)) => {}
                    other => panic!("channel ended unexpectedly: {other:?}"),
                }
            }
        }

        #[tokio::test]
        async fn test_load_agent_reports_session() {
            let dir = tempfile::tempdir().unwrap();
            let binary = fake_claude(
                &dir,
                r#"echo '{"type":"system","session_id":"sess-42"}'
echo '{"type":"result","result":"loaded"}'"#,
            );
            let channel = ClaudeCliChannel::new(binary);
            let mut rx = channel.subscribe();

            let result = channel
                .load_agent(LoadAgentRequest {
                    agent_id: "sm".to_string(),
                    project_path: dir.path().to_string_lossy().into_owned(),
                    profile: ProjectProfile::Method,
                    command: "*create-story".to_string(),
                })
                .await;

            assert!(result.success);
            assert_eq!(result.session_id.as_deref(), Some("sess-42"));

            let (chunks, exit) = next_exit(&mut rx).await;
            assert_eq!(chunks.len(), 2);
            assert!(exit.is_load_phase);
            assert_eq!(exit.code, Some(0));
        }

        #[tokio::test]
        async fn test_load_prompt_template_names_the_agent() {
            let dir = tempfile::tempdir().unwrap();
            let binary = fake_claude(
                &dir,
                r#"echo '{"type":"system","session_id":"sess-7"}'
echo "$2""#,
            );
            let channel = ClaudeCliChannel::new(binary).with_load_prompt("activate {agent_id}");
            let mut rx = channel.subscribe();

            let result = channel
                .load_agent(LoadAgentRequest {
                    agent_id: "game-sm".to_string(),
                    project_path: dir.path().to_string_lossy().into_owned(),
                    profile: ProjectProfile::GameDev,
                    command: "*create-story".to_string(),
                })
                .await;
            assert!(result.success);

            let (chunks, _) = next_exit(&mut rx).await;
            assert_eq!(chunks.last().map(String::as_str), Some("activate game-sm\n"));
        }

        #[tokio::test]
        async fn test_send_message_streams_until_exit() {
            let dir = tempfile::tempdir().unwrap();
            let binary = fake_claude(&dir, "echo 'working'\necho 'All done.'\nexit 3");
            let channel = ClaudeCliChannel::new(binary);
            let mut rx = channel.subscribe();

            let sent = channel
                .send_message(SendMessageRequest {
                    agent_id: "dev".to_string(),
                    project_path: dir.path().to_string_lossy().into_owned(),
                    message: "*develop-story".to_string(),
                    session_id: Some("sess-42".to_string()),
                })
                .await;
            assert!(sent.success);

            let (chunks, exit) = next_exit(&mut rx).await;
            assert_eq!(chunks, vec!["working\n", "All done.\n"]);
            assert_eq!(exit.code, Some(3));
            assert!(exit.is_failure_code());
            assert!(!exit.is_load_phase);
        }

        #[tokio::test]
        async fn test_cancel_message_kills_process() {
            let dir = tempfile::tempdir().unwrap();
            let binary = fake_claude(&dir, "echo 'starting'\nexec sleep 30");
            let channel = ClaudeCliChannel::new(binary);
            let mut rx = channel.subscribe();

            channel
                .send_message(SendMessageRequest {
                    agent_id: "dev".to_string(),
                    project_path: dir.path().to_string_lossy().into_owned(),
                    message: "go".to_string(),
                    session_id: None,
                })
                .await;

            match rx.recv().await {
                Ok(ChannelEvent::Output { chunk, .. }) => assert_eq!(chunk, "starting\n"),
                other => panic!("unexpected event: {other:?}"),
            }
            assert!(channel.cancel_message("dev").await);

            let (_, exit) = next_exit(&mut rx).await;
            assert!(exit.cancelled);
            assert!(!channel.cancel_message("dev").await);
        }

        #[tokio::test]
        async fn test_spawn_failure_is_reported() {
            let channel = ClaudeCliChannel::new("/nonexistent/claude-xyz");
            let result = channel
                .send_message(SendMessageRequest {
                    agent_id: "dev".to_string(),
                    project_path: ".".to_string(),
                    message: "go".to_string(),
                    session_id: None,
                })
                .await;
            assert!(!result.success);
            assert!(result.error.unwrap_or_default().contains("claude-xyz"));
        }
    }
}
