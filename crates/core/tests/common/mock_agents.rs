//! Scripted agent channel for deterministic orchestration tests.

use async_trait::async_trait;
use sc_core::agents::AgentChannel;
use sc_protocol::{
    AgentExit, ChannelEvent, LoadAgentRequest, LoadAgentResult, SendMessageRequest,
    SendMessageResult,
};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::AbortHandle;

/// What the scripted agent does with one message.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Stream `text` and exit with `code`, after `delay`.
    Exit {
        text: String,
        code: Option<i32>,
        delay: Duration,
    },
    /// Never answer.
    Hang,
}

impl Reply {
    pub fn text(text: &str) -> Self {
        Self::Exit {
            text: text.to_string(),
            code: Some(0),
            delay: Duration::ZERO,
        }
    }

    #[allow(dead_code)]
    pub fn failing(text: &str, code: i32) -> Self {
        Self::Exit {
            text: text.to_string(),
            code: Some(code),
            delay: Duration::ZERO,
        }
    }

    #[allow(dead_code)]
    pub fn delayed(text: &str, delay_ms: u64) -> Self {
        Self::Exit {
            text: text.to_string(),
            code: Some(0),
            delay: Duration::from_millis(delay_ms),
        }
    }
}

/// An [`AgentChannel`] that answers from per-agent scripts.
///
/// Agents without a script left answer `"Task complete."`. Replies are
/// framed as stream-json assistant messages, split over two chunks, so the
/// decoder sees line reassembly too.
///
/// `cancel_message` kills a pending delayed reply and emits a cancelled
/// exit, like a real process being killed. With `set_kill_on_cancel(false)`
/// the pending reply still arrives later, as from a process that ignored
/// the kill.
pub struct ScriptedChannel {
    events: broadcast::Sender<ChannelEvent>,
    scripts: Mutex<HashMap<String, VecDeque<Reply>>>,
    failing_loads: Mutex<HashSet<String>>,
    sent: Mutex<Vec<(String, String)>>,
    loads: Mutex<Vec<String>>,
    cancels: Mutex<Vec<String>>,
    pending: Mutex<HashMap<String, AbortHandle>>,
    kill_on_cancel: AtomicBool,
}

#[allow(dead_code)]
impl ScriptedChannel {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            events,
            scripts: Mutex::new(HashMap::new()),
            failing_loads: Mutex::new(HashSet::new()),
            sent: Mutex::new(Vec::new()),
            loads: Mutex::new(Vec::new()),
            cancels: Mutex::new(Vec::new()),
            pending: Mutex::new(HashMap::new()),
            kill_on_cancel: AtomicBool::new(true),
        }
    }

    /// Queue replies for `agent_id`, in order.
    pub fn script(&self, agent_id: &str, replies: impl IntoIterator<Item = Reply>) {
        self.scripts
            .lock()
            .unwrap()
            .entry(agent_id.to_string())
            .or_default()
            .extend(replies);
    }

    pub fn fail_load(&self, agent_id: &str) {
        self.failing_loads
            .lock()
            .unwrap()
            .insert(agent_id.to_string());
    }

    /// Every `(agent_id, message)` sent so far.
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    /// Messages sent to `agent_id`.
    pub fn sent_to(&self, agent_id: &str) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|(agent, _)| agent == agent_id)
            .map(|(_, message)| message)
            .collect()
    }

    pub fn loads(&self) -> Vec<String> {
        self.loads.lock().unwrap().clone()
    }

    pub fn cancels(&self) -> Vec<String> {
        self.cancels.lock().unwrap().clone()
    }

    pub fn set_kill_on_cancel(&self, value: bool) {
        self.kill_on_cancel.store(value, Ordering::SeqCst);
    }

    /// Emit an exit for `agent_id` as if some process of it ended now.
    pub fn emit_exit(&self, agent_id: &str, exit: AgentExit) {
        let _ = self.events.send(ChannelEvent::Exit {
            agent_id: agent_id.to_string(),
            exit,
        });
    }

    fn next_reply(&self, agent_id: &str) -> Reply {
        self.scripts
            .lock()
            .unwrap()
            .get_mut(agent_id)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Reply::text("Task complete."))
    }
}

fn frame(text: &str) -> String {
    let line = serde_json::json!({
        "type": "assistant",
        "message": { "content": [{ "type": "text", "text": text }] }
    });
    format!("{line}\n")
}

fn emit_reply(
    events: &broadcast::Sender<ChannelEvent>,
    agent_id: &str,
    session_id: Option<String>,
    text: &str,
    code: Option<i32>,
) {
    let framed = frame(text);
    let mid = (0..=framed.len() / 2)
        .rev()
        .find(|i| framed.is_char_boundary(*i))
        .unwrap_or(0);
    let (head, tail) = framed.split_at(mid);
    for chunk in [head, tail] {
        let _ = events.send(ChannelEvent::Output {
            agent_id: agent_id.to_string(),
            chunk: chunk.to_string(),
            is_load_phase: false,
        });
    }
    let _ = events.send(ChannelEvent::Exit {
        agent_id: agent_id.to_string(),
        exit: AgentExit {
            code,
            session_id,
            ..Default::default()
        },
    });
}

#[async_trait]
impl AgentChannel for ScriptedChannel {
    async fn load_agent(&self, request: LoadAgentRequest) -> LoadAgentResult {
        let agent_id = request.agent_id;
        self.loads.lock().unwrap().push(agent_id.clone());

        if self.failing_loads.lock().unwrap().contains(&agent_id) {
            let _ = self.events.send(ChannelEvent::AgentLoaded {
                agent_id,
                session_id: None,
                error: Some("agent definition not found".to_string()),
            });
            return LoadAgentResult::failed("agent definition not found");
        }

        let session_id = format!("session-{agent_id}");
        let _ = self.events.send(ChannelEvent::Output {
            agent_id: agent_id.clone(),
            chunk: "Loading persona... What's next?\n".to_string(),
            is_load_phase: true,
        });
        let _ = self.events.send(ChannelEvent::AgentLoaded {
            agent_id,
            session_id: Some(session_id.clone()),
            error: None,
        });
        LoadAgentResult::loaded(session_id)
    }

    async fn send_message(&self, request: SendMessageRequest) -> SendMessageResult {
        let agent_id = request.agent_id;
        self.sent
            .lock()
            .unwrap()
            .push((agent_id.clone(), request.message));

        match self.next_reply(&agent_id) {
            Reply::Hang => {}
            Reply::Exit { text, code, delay } if delay.is_zero() => {
                emit_reply(&self.events, &agent_id, request.session_id, &text, code);
            }
            Reply::Exit { text, code, delay } => {
                let events = self.events.clone();
                let session_id = request.session_id;
                let agent = agent_id.clone();
                let task = tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    emit_reply(&events, &agent, session_id, &text, code);
                });
                self.pending
                    .lock()
                    .unwrap()
                    .insert(agent_id, task.abort_handle());
            }
        }
        SendMessageResult::sent()
    }

    async fn cancel_message(&self, agent_id: &str) -> bool {
        self.cancels.lock().unwrap().push(agent_id.to_string());
        if !self.kill_on_cancel.load(Ordering::SeqCst) {
            return true;
        }
        if let Some(task) = self.pending.lock().unwrap().remove(agent_id) {
            task.abort();
        }
        self.emit_exit(
            agent_id,
            AgentExit {
                code: None,
                signal: Some("SIGTERM".to_string()),
                cancelled: true,
                ..Default::default()
            },
        );
        true
    }

    fn subscribe(&self) -> broadcast::Receiver<ChannelEvent> {
        self.events.subscribe()
    }
}
