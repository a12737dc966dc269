//! Base AgentChannel trait and supporting types.

use async_trait::async_trait;
use sc_protocol::{
    ChannelEvent, LoadAgentRequest, LoadAgentResult, SendMessageRequest, SendMessageResult,
};
use thiserror::Error;
use tokio::sync::broadcast;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AgentError {
    #[error("Agent channel not available: {0}")]
    NotAvailable(String),
    #[error("Failed to spawn agent process: {0}")]
    SpawnFailed(String),
}

/// Transport to the external agent processes.
///
/// Requests report failures in their result records. Output and process
/// lifecycle arrive asynchronously as [`ChannelEvent`]s, each scoped to an
/// agent id. Callers must subscribe before issuing the request whose events
/// they want to see.
#[async_trait]
pub trait AgentChannel: Send + Sync {
    /// Initialise an agent and obtain a session id.
    ///
    /// Also emits [`ChannelEvent::AgentLoaded`].
    async fn load_agent(&self, request: LoadAgentRequest) -> LoadAgentResult;

    /// Dispatch a message; the reply streams in as `Output` events and ends
    /// with an `Exit` event.
    async fn send_message(&self, request: SendMessageRequest) -> SendMessageResult;

    /// Terminate the process currently serving `agent_id`.
    ///
    /// Returns whether there was anything to cancel.
    async fn cancel_message(&self, agent_id: &str) -> bool;

    fn subscribe(&self) -> broadcast::Receiver<ChannelEvent>;
}
