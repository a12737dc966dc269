//! Runtime state records for single-story cycles and epic queues.
//!
//! These records are owned and mutated by the orchestrators in `sc-core`.
//! Everything else (the UI, the CLI, the epic orchestrator watching a single
//! cycle) only ever reads snapshots of them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;
use uuid::Uuid;

use crate::step_models::StepStatus;

/// Identifier of one execution attempt of a pipeline.
///
/// A fresh id is minted on every start and every retry. Asynchronous
/// completions capture the id they were issued under and are dropped when it
/// no longer matches the orchestrator's current run.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash, TS)]
pub struct RunId(pub String);

impl RunId {
    /// Mint a new run id for `story_id`.
    ///
    /// Format: `<story-id>:<unix-millis>:<8 hex chars>`.
    pub fn mint(story_id: &str) -> Self {
        let millis = Utc::now().timestamp_millis();
        let nonce = Uuid::new_v4().simple().to_string();
        Self(format!("{story_id}:{millis}:{}", &nonce[..8]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Observable state of the single-story orchestrator.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, TS)]
#[serde(rename_all = "camelCase")]
pub struct SingleCycleState {
    pub is_running: bool,

    pub story_id: Option<String>,

    /// Current run, `None` once a run has been cancelled or before any start.
    pub run_id: Option<RunId>,

    /// Index of the step being executed, or of the last step touched.
    pub current_step: usize,

    pub total_steps: usize,

    /// One status per step; always `total_steps` long.
    pub step_statuses: Vec<StepStatus>,

    pub error: Option<String>,

    /// Index of the step that halted the run, if any.
    pub failed_step: Option<usize>,

    /// Append-only product log of the run.
    pub logs: Vec<String>,

    /// Conversation continuity token for the agent channel.
    pub session_id: Option<String>,

    pub minimized: bool,
}

impl SingleCycleState {
    /// Index of the first step that is neither completed nor skipped.
    pub fn first_incomplete_step(&self) -> Option<usize> {
        self.step_statuses.iter().position(|s| !s.is_done())
    }

    /// Whether the last run went through every step.
    pub fn is_complete(&self) -> bool {
        !self.is_running
            && self.total_steps > 0
            && self.step_statuses.iter().all(|s| s.is_done())
    }
}

/// Lifecycle phase of an epic queue.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default, TS)]
#[serde(rename_all = "lowercase")]
pub enum EpicPhase {
    /// No queue yet.
    #[default]
    Setup,
    Running,
    Complete,
    /// Halted on a story failure or cancellation.
    Error,
}

/// Status of one story within an epic queue.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default, TS)]
#[serde(rename_all = "lowercase")]
pub enum StoryStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Error,
}

/// Observable state of the epic queue orchestrator.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, TS)]
#[serde(rename_all = "camelCase")]
pub struct EpicQueueState {
    pub phase: EpicPhase,

    pub is_running: bool,

    pub epic_id: Option<String>,

    /// Story ids in execution order; fixed when the epic run starts.
    pub story_queue: Vec<String>,

    pub current_story_index: usize,

    /// One status per queued story.
    pub story_statuses: Vec<StoryStatus>,

    pub start_time: Option<DateTime<Utc>>,

    pub error: Option<String>,
}

impl EpicQueueState {
    /// Story id at `current_story_index`.
    pub fn current_story(&self) -> Option<&str> {
        self.story_queue
            .get(self.current_story_index)
            .map(String::as_str)
    }

    pub fn completed_count(&self) -> usize {
        self.story_statuses
            .iter()
            .filter(|s| **s == StoryStatus::Completed)
            .count()
    }
}
