//! Per-agent conversation log.

use sc_protocol::{ConversationMessage, MessageRole};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Append-only record of what was said to and by each agent.
///
/// The orchestrator appends the user message and a pending assistant
/// placeholder before a request is issued, then fills the placeholder once
/// the agent's reply has been classified.
pub trait ConversationLog: Send + Sync {
    fn append(&self, agent_id: &str, message: ConversationMessage);

    /// Fill the most recent pending assistant placeholder of `agent_id`.
    fn complete_pending(&self, agent_id: &str, content: &str);

    fn messages(&self, agent_id: &str) -> Vec<ConversationMessage>;
}

/// [`ConversationLog`] kept in memory for the lifetime of the engine.
#[derive(Debug, Default)]
pub struct InMemoryConversationLog {
    by_agent: Mutex<HashMap<String, Vec<ConversationMessage>>>,
}

impl InMemoryConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Vec<ConversationMessage>>> {
        self.by_agent.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ConversationLog for InMemoryConversationLog {
    fn append(&self, agent_id: &str, message: ConversationMessage) {
        self.lock()
            .entry(agent_id.to_string())
            .or_default()
            .push(message);
    }

    fn complete_pending(&self, agent_id: &str, content: &str) {
        let mut by_agent = self.lock();
        let pending = by_agent.get_mut(agent_id).and_then(|messages| {
            messages
                .iter_mut()
                .rev()
                .find(|m| m.pending && m.role == MessageRole::Assistant)
        });
        if let Some(message) = pending {
            message.content = content.to_string();
            message.pending = false;
        }
    }

    fn messages(&self, agent_id: &str) -> Vec<ConversationMessage> {
        self.lock().get(agent_id).cloned().unwrap_or_default()
    }
}
