//! One agent step: request, stream, classify, maybe auto-reply, repeat.
//!
//! A session subscribes to the channel before issuing any request, loads the
//! agent when no session id is known yet, sends the command and then consumes
//! events of its agent until an exit can be resolved. Exits marked cancelled
//! only end the session when its own run was cancelled. Exits whose output the
//! classifier reads as an issue prompt get a canned reply and the session
//! waits for the next exit of the same step.

use crate::agents::{AgentChannel, ConversationLog};
use crate::classifier::{strip_ansi, ChunkDecoder, OutputClassifier};
use crate::engine::error::{CycleError, CycleResult};
use crate::state::CycleStore;
use sc_protocol::{
    ChannelEvent, ConversationMessage, CycleSettings, Event, LoadAgentRequest, RunId,
    SendMessageRequest,
};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Session ids per agent id, shared by all steps of a story.
pub(crate) type SessionMap = Mutex<HashMap<String, String>>;

pub(crate) struct AgentSession<'a> {
    pub channel: &'a dyn AgentChannel,
    pub conversation: &'a dyn ConversationLog,
    pub classifier: &'a dyn OutputClassifier,
    pub store: &'a CycleStore,
    pub sessions: &'a SessionMap,
    pub settings: &'a CycleSettings,
    pub project_path: &'a str,
    pub run: &'a RunId,
    pub cancel: &'a CancellationToken,
    pub agent_id: &'a str,
    pub command: String,
}

/// Text accumulated since the last request of the session.
#[derive(Default)]
struct OutputBuffer {
    decoder: ChunkDecoder,
    text: String,
}

impl OutputBuffer {
    fn push(&mut self, chunk: &str) {
        let decoded = self.decoder.push(chunk);
        self.text.push_str(&decoded);
    }

    /// Flush the decoder and return the ANSI-stripped text.
    fn settle(&mut self) -> String {
        let rest = self.decoder.finish();
        self.text.push_str(&rest);
        strip_ansi(&self.text)
    }

    fn clear(&mut self) {
        self.decoder.reset();
        self.text.clear();
    }
}

impl AgentSession<'_> {
    pub(crate) async fn run(self) -> CycleResult<()> {
        let mut events = self.channel.subscribe();
        let agent_id = self.agent_id;

        self.conversation
            .append(agent_id, ConversationMessage::user(self.command.clone()));
        self.conversation
            .append(agent_id, ConversationMessage::assistant_placeholder());

        if self.known_session().is_none() {
            self.load(&mut events).await?;
        } else {
            self.discard_queued(&mut events)?;
        }

        self.send(self.command.clone()).await?;

        let mut output = OutputBuffer::default();
        let mut auto_replies: u32 = 0;

        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(agent_id, skipped, "Agent channel lagged, output dropped");
                    continue;
                }
                Err(RecvError::Closed) => return Err(CycleError::ChannelClosed),
            };
            if event.agent_id() != agent_id {
                continue;
            }

            let exit = match event {
                ChannelEvent::Output {
                    chunk,
                    is_load_phase: false,
                    ..
                } => {
                    output.push(&chunk);
                    continue;
                }
                ChannelEvent::AgentLoaded {
                    error: Some(message),
                    ..
                } => {
                    return Err(CycleError::LoadFailed {
                        agent_id: agent_id.to_string(),
                        message,
                    })
                }
                ChannelEvent::Exit { exit, .. } if !exit.is_load_phase => exit,
                _ => continue,
            };

            if !self.store.is_current(self.run) {
                return Err(CycleError::StaleRun);
            }
            if exit.cancelled {
                if self.cancel.is_cancelled() {
                    return Err(CycleError::Cancelled);
                }
                // A process killed for an earlier run of this agent.
                debug!(agent_id, "Ignoring exit of a cancelled process");
                output.clear();
                continue;
            }
            if exit.is_failure_code() {
                return Err(CycleError::NonZeroExit {
                    agent_id: agent_id.to_string(),
                    code: exit.code,
                    signal: exit.signal,
                });
            }
            if let Some(session_id) = &exit.session_id {
                self.remember_session(session_id);
            }

            let mut text = output.settle();
            let threshold = self.settings.timing.short_output_chars;
            if auto_replies > 0 && text.trim().chars().count() < threshold {
                debug!(agent_id, chars = text.len(), "Short reply, waiting for more output");
                let recheck = Duration::from_millis(self.settings.timing.short_output_recheck_ms);
                self.drain_for(&mut events, &mut output, recheck).await?;
                text = output.settle();
            }

            let verdict = self.classifier.classify(&text);
            debug!(agent_id, %verdict, "Classified agent output");

            if verdict.completes_step() {
                self.conversation.complete_pending(agent_id, text.trim());
                return Ok(());
            }

            let limit = self.settings.agents.max_auto_replies;
            if auto_replies >= limit {
                return Err(CycleError::AutoReplyLimit {
                    agent_id: agent_id.to_string(),
                    limit,
                });
            }
            auto_replies += 1;
            self.auto_reply(&text).await?;
            output.clear();
        }
    }

    async fn load(&self, events: &mut broadcast::Receiver<ChannelEvent>) -> CycleResult<()> {
        let agent_id = self.agent_id;
        let result = self
            .channel
            .load_agent(LoadAgentRequest {
                agent_id: agent_id.to_string(),
                project_path: self.project_path.to_string(),
                profile: self.settings.profile,
                command: self.command.clone(),
            })
            .await;

        if !result.success {
            return Err(CycleError::LoadFailed {
                agent_id: agent_id.to_string(),
                message: result.error.unwrap_or_else(|| "unknown error".to_string()),
            });
        }
        if let Some(session_id) = &result.session_id {
            self.remember_session(session_id);
        }

        // Load-phase output is not part of the reply.
        self.discard_queued(events)?;

        self.store.log(self.run, format!("Loaded agent {agent_id}"));
        Ok(())
    }

    /// Drop everything already queued before the command goes out; only a
    /// failed load of this agent is still reported.
    fn discard_queued(&self, events: &mut broadcast::Receiver<ChannelEvent>) -> CycleResult<()> {
        let agent_id = self.agent_id;
        loop {
            match events.try_recv() {
                Ok(ChannelEvent::AgentLoaded {
                    agent_id: loaded,
                    error: Some(message),
                    ..
                }) if loaded == agent_id => {
                    return Err(CycleError::LoadFailed {
                        agent_id: agent_id.to_string(),
                        message,
                    })
                }
                Ok(_) | Err(TryRecvError::Lagged(_)) => continue,
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return Ok(()),
            }
        }
    }

    async fn send(&self, message: String) -> CycleResult<()> {
        let result = self
            .channel
            .send_message(SendMessageRequest {
                agent_id: self.agent_id.to_string(),
                project_path: self.project_path.to_string(),
                message,
                session_id: self.known_session(),
            })
            .await;

        if result.success {
            Ok(())
        } else {
            Err(CycleError::SendFailed {
                agent_id: self.agent_id.to_string(),
                message: result.error.unwrap_or_else(|| "unknown error".to_string()),
            })
        }
    }

    async fn auto_reply(&self, text: &str) -> CycleResult<()> {
        let agent_id = self.agent_id;
        tokio::time::sleep(Duration::from_millis(
            self.settings.timing.auto_reply_settle_ms,
        ))
        .await;
        if !self.store.is_current(self.run) {
            return Err(CycleError::StaleRun);
        }

        let label = if self.classifier.fix_is_first_option(text) {
            "fix first option"
        } else {
            "first option"
        };
        let reply = self.settings.agents.auto_reply.clone();

        self.conversation.complete_pending(agent_id, text.trim());
        self.conversation
            .append(agent_id, ConversationMessage::user(reply.clone()));
        self.conversation
            .append(agent_id, ConversationMessage::assistant_placeholder());

        self.send(reply.clone()).await?;

        info!(agent_id, reply = %reply, label, "Sent automatic reply");
        self.store.log(
            self.run,
            format!("Auto-replied \"{reply}\" to {agent_id} ({label})"),
        );
        self.store.emit(Event::AutoReplySent {
            run_id: self.run.clone(),
            agent_id: agent_id.to_string(),
            reply,
            label: label.to_string(),
        });
        Ok(())
    }

    /// Keep collecting output of this agent for `window`.
    async fn drain_for(
        &self,
        events: &mut broadcast::Receiver<ChannelEvent>,
        output: &mut OutputBuffer,
        window: Duration,
    ) -> CycleResult<()> {
        let deadline = Instant::now() + window;
        loop {
            match tokio::time::timeout_at(deadline, events.recv()).await {
                Err(_elapsed) => return Ok(()),
                Ok(Ok(ChannelEvent::Output {
                    agent_id,
                    chunk,
                    is_load_phase: false,
                })) if agent_id == self.agent_id => output.push(&chunk),
                Ok(Ok(_)) | Ok(Err(RecvError::Lagged(_))) => {}
                Ok(Err(RecvError::Closed)) => return Err(CycleError::ChannelClosed),
            }
        }
    }

    fn known_session(&self) -> Option<String> {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(self.agent_id)
            .cloned()
    }

    fn remember_session(&self, session_id: &str) {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(self.agent_id.to_string(), session_id.to_string());
        self.store.set_session(self.run, session_id);
    }
}
