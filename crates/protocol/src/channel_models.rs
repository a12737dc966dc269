//! Request, response and event shapes of the engine's collaborators.
//!
//! The orchestration core never spawns processes or runs git itself. It
//! talks to an agent channel, a git collaborator and a story status
//! collaborator through the shapes defined here. Collaborators report
//! failures inside the result records instead of failing the call.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::step_models::ProjectProfile;

/// Initialise an agent before its first command.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
#[serde(rename_all = "camelCase")]
pub struct LoadAgentRequest {
    pub agent_id: String,
    pub project_path: String,
    pub profile: ProjectProfile,
    /// The command that will follow the load, for channels that need it up front.
    pub command: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq, TS)]
#[serde(rename_all = "camelCase")]
pub struct LoadAgentResult {
    pub success: bool,
    pub session_id: Option<String>,
    pub error: Option<String>,
}

impl LoadAgentResult {
    pub fn loaded(session_id: impl Into<String>) -> Self {
        Self {
            success: true,
            session_id: Some(session_id.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            session_id: None,
            error: Some(error.into()),
        }
    }
}

/// Send a message to an already loaded agent.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub agent_id: String,
    pub project_path: String,
    pub message: String,
    pub session_id: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq, TS)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageResult {
    pub success: bool,
    pub error: Option<String>,
}

impl SendMessageResult {
    pub fn sent() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

/// How the process behind one agent message ended.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq, TS)]
#[serde(rename_all = "camelCase")]
pub struct AgentExit {
    /// Exit code, `None` when the process was killed by a signal.
    pub code: Option<i32>,
    pub signal: Option<String>,
    pub error: Option<String>,
    pub session_id: Option<String>,
    #[serde(default)]
    pub cancelled: bool,
    /// Set when the exiting process was the load-phase process.
    #[serde(default)]
    pub is_load_phase: bool,
}

impl AgentExit {
    /// A clean exit with code 0.
    pub fn success() -> Self {
        Self {
            code: Some(0),
            ..Default::default()
        }
    }

    /// Whether the exit carries a non-null, non-zero code.
    pub fn is_failure_code(&self) -> bool {
        matches!(self.code, Some(code) if code != 0)
    }
}

/// Events emitted by an agent channel, each scoped to an agent id.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum ChannelEvent {
    /// A raw stream fragment: JSON framed, plain text, or ANSI-decorated.
    Output {
        agent_id: String,
        chunk: String,
        is_load_phase: bool,
    },

    /// Fired once after the load phase.
    AgentLoaded {
        agent_id: String,
        session_id: Option<String>,
        error: Option<String>,
    },

    /// Fired when the process spawned for a message terminates.
    Exit { agent_id: String, exit: AgentExit },
}

impl ChannelEvent {
    pub fn agent_id(&self) -> &str {
        match self {
            Self::Output { agent_id, .. }
            | Self::AgentLoaded { agent_id, .. }
            | Self::Exit { agent_id, .. } => agent_id,
        }
    }
}

/// Generic outcome of a git or status operation.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq, TS)]
#[serde(rename_all = "camelCase")]
pub struct OpResult {
    pub success: bool,
    pub error: Option<String>,
}

impl OpResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }

    /// The error text, or an empty string.
    pub fn error_text(&self) -> &str {
        self.error.as_deref().unwrap_or_default()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq, TS)]
#[serde(rename_all = "camelCase")]
pub struct CreateBranchResult {
    pub success: bool,
    #[serde(default)]
    pub already_exists: bool,
    pub error: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq, TS)]
#[serde(rename_all = "camelCase")]
pub struct MergeResult {
    pub success: bool,
    #[serde(default)]
    pub has_conflicts: bool,
    pub error: Option<String>,
}

/// Author of a conversation record.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, TS)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

/// One record of the per-agent conversation log.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
#[serde(rename_all = "camelCase")]
pub struct ConversationMessage {
    pub role: MessageRole,
    pub content: String,
    /// Assistant placeholder awaiting the agent's reply.
    pub pending: bool,
}

impl ConversationMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
            pending: false,
        }
    }

    pub fn assistant_placeholder() -> Self {
        Self {
            role: MessageRole::Assistant,
            content: String::new(),
            pending: true,
        }
    }
}
