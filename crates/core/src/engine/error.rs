//! Error types for cycle orchestration.

use thiserror::Error;

/// Everything that can halt a step, a run, or reject an operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CycleError {
    /// The agent failed to initialise.
    #[error("Failed to load agent {agent_id}: {message}")]
    LoadFailed { agent_id: String, message: String },

    /// The channel rejected the message.
    #[error("Failed to send message to {agent_id}: {message}")]
    SendFailed { agent_id: String, message: String },

    /// Cancelled by the user or by the system.
    #[error("cancelled")]
    Cancelled,

    /// The agent process failed.
    #[error("Agent {agent_id} exited with {}", describe_exit(.code, .signal))]
    NonZeroExit {
        agent_id: String,
        code: Option<i32>,
        signal: Option<String>,
    },

    /// Merging the story branch produced conflicts.
    #[error("Merge conflict merging {branch} into {target}: {message}")]
    MergeConflict {
        branch: String,
        target: String,
        message: String,
    },

    #[error("Git operation failed: {0}")]
    GitFailed(String),

    #[error("Failed to update story status: {0}")]
    StatusUpdateFailed(String),

    /// The agent step ran past its deadline.
    #[error("Agent {agent_id} did not finish within {secs}s")]
    Timeout { agent_id: String, secs: u64 },

    /// The agent kept asking for decisions.
    #[error("Agent {agent_id} still asking after {limit} automatic replies")]
    AutoReplyLimit { agent_id: String, limit: u32 },

    /// The event belonged to a superseded run; never surfaced in state.
    #[error("stale run")]
    StaleRun,

    #[error("A cycle is already running")]
    AlreadyRunning,

    #[error("No cycle is running")]
    NotRunning,

    #[error("Nothing to retry")]
    NothingToRetry,

    /// The agent channel stopped delivering events.
    #[error("Agent channel closed")]
    ChannelClosed,
}

impl CycleError {
    /// Whether this error is a superseded run rather than a real failure.
    pub fn is_stale(&self) -> bool {
        matches!(self, Self::StaleRun)
    }
}

fn describe_exit(code: &Option<i32>, signal: &Option<String>) -> String {
    match (code, signal) {
        (Some(code), _) => format!("code {code}"),
        (None, Some(signal)) => format!("signal {signal}"),
        (None, None) => "no exit code".to_string(),
    }
}

/// Type alias for Result with CycleError.
pub type CycleResult<T> = Result<T, CycleError>;
