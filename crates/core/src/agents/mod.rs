//! Agent channel abstraction and conversation log.
//!
//! This module provides the `AgentChannel` trait (Adapter Pattern) consumed
//! by the orchestrators, the Claude CLI implementation of it, and the
//! per-agent conversation log.

pub mod adapters;
pub mod base;
pub mod conversation;

pub use adapters::ClaudeCliChannel;
pub use base::{AgentChannel, AgentError};
pub use conversation::{ConversationLog, InMemoryConversationLog};
