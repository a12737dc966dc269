//! Inter-process communication protocol.
//!
//! The protocol follows an Operation/Event pattern:
//! - `Op`: commands sent from the front end to the engine
//! - `Event`: lifecycle notifications sent from the engine to the front end
//!
//! State itself is not pushed through events; front ends read snapshots of
//! [`SingleCycleState`](crate::SingleCycleState) and
//! [`EpicQueueState`](crate::EpicQueueState) and use events as change hints
//! and as a live log.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::cycle_models::{EpicQueueState, RunId, SingleCycleState};
use crate::step_models::{StepStatus, StoryRef};

/// Operations sent from the front end to the engine.
///
/// Uses tagged enum serialization for TypeScript compatibility:
/// ```json
/// {
///   "type": "startCycle",
///   "payload": { "story": { "id": "1-2-login", "filePath": "docs/stories/1-2-login.md" } }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum Op {
    /// Run one story through the full pipeline.
    StartCycle { story: StoryRef },

    /// Cancel the running single-story cycle.
    CancelCycle,

    /// Resume the last cycle from its first incomplete step.
    RetryCycle,

    /// Run a queue of stories belonging to one epic.
    StartEpic {
        epic_id: String,
        stories: Vec<StoryRef>,
    },

    /// Cancel the running epic queue and its current cycle.
    CancelEpic,

    /// Resume a halted epic queue at the failed story.
    RetryEpic,

    /// Return a finished or halted epic queue to setup.
    ResetEpic,

    /// Toggle the minimized flag of the cycle panel.
    SetMinimized { minimized: bool },

    /// Request the current single-cycle state.
    GetCycleState,

    /// Request the current epic queue state.
    GetEpicState,
}

/// Direct reply to an [`Op`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum OpReply {
    /// The operation was applied.
    Ack,

    /// A single-story run was started or resumed.
    RunStarted { run_id: RunId },

    CycleState { state: SingleCycleState },

    EpicState { state: EpicQueueState },

    /// The operation was rejected.
    Rejected { reason: String },
}

/// Events sent from the engine to the front end.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum Event {
    /// A single-story run started or resumed.
    CycleStarted {
        run_id: RunId,
        story_id: String,
        start_step: usize,
        total_steps: usize,
    },

    /// A step changed status.
    StepStatusChanged {
        run_id: RunId,
        step_index: usize,
        step_id: String,
        status: StepStatus,
    },

    /// A line was appended to the run log.
    CycleLog { run_id: RunId, line: String },

    /// An automatic reply was sent to an agent.
    AutoReplySent {
        run_id: RunId,
        agent_id: String,
        reply: String,
        label: String,
    },

    /// Every step finished.
    CycleCompleted { run_id: RunId, story_id: String },

    /// A step failed and the run halted.
    CycleFailed {
        run_id: RunId,
        story_id: String,
        step_index: usize,
        error: String,
    },

    /// The run was cancelled.
    CycleCancelled { run_id: RunId, story_id: String },

    /// An epic queue started.
    EpicStarted { epic_id: String, stories: usize },

    /// The epic queue moved to a story.
    EpicStoryStarted {
        epic_id: String,
        index: usize,
        story_id: String,
    },

    /// Every story of the epic completed.
    EpicCompleted { epic_id: String },

    /// The epic queue halted.
    EpicHalted {
        epic_id: String,
        index: usize,
        error: String,
    },
}
