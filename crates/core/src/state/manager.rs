//! Operation dispatcher for the orchestration engine.
//!
//! The CycleService is the single entry point a front end talks to. It owns
//! both orchestrators, shares one event channel between them and turns
//! incoming [`Op`]s into orchestrator calls.

use crate::agents::{ClaudeCliChannel, InMemoryConversationLog};
use crate::classifier::HeuristicClassifier;
use crate::config::ProjectConfig;
use crate::engine::{CycleDeps, CycleError, EpicQueueOrchestrator, SingleCycleOrchestrator};
use crate::git::CliGit;
use crate::story::{find_story_file, StoryFileStatus};
use anyhow::{Context, Result};
use sc_protocol::{Event, Op, OpReply, StoryRef};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::debug;

const EVENT_CAPACITY: usize = 256;

/// Owns the orchestrators of one project.
pub struct CycleService {
    config: ProjectConfig,
    epic: EpicQueueOrchestrator,
    events_tx: broadcast::Sender<Event>,
}

impl CycleService {
    /// Create a service over explicit collaborators.
    pub fn new(config: ProjectConfig, deps: CycleDeps) -> Self {
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);
        let cycle = SingleCycleOrchestrator::new(config.clone(), deps, events_tx.clone());
        let settle = Duration::from_millis(config.settings.timing.story_settle_ms);
        let epic = EpicQueueOrchestrator::new(cycle, settle, events_tx.clone());

        Self {
            config,
            epic,
            events_tx,
        }
    }

    /// Create a service backed by the `claude` CLI, the `git` CLI and the
    /// story files of the project.
    ///
    /// # Errors
    ///
    /// Returns an error if the `claude` binary cannot be found.
    pub fn from_config(config: ProjectConfig) -> Result<Self> {
        let channel = ClaudeCliChannel::locate().context("Failed to set up the agent channel")?;
        let git = CliGit::new().with_force_paths(vec![config.settings.stories_dir.clone()]);

        let deps = CycleDeps {
            channel: Arc::new(channel),
            git: Arc::new(git),
            status: Arc::new(StoryFileStatus::new(config.project_root.clone())),
            conversation: Arc::new(InMemoryConversationLog::new()),
            classifier: Arc::new(HeuristicClassifier::new(
                config.settings.timing.classifier_window_chars,
            )),
        };
        Ok(Self::new(config, deps))
    }

    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    pub fn cycle(&self) -> &SingleCycleOrchestrator {
        self.epic.cycle()
    }

    pub fn epic(&self) -> &EpicQueueOrchestrator {
        &self.epic
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<Event> {
        self.events_tx.subscribe()
    }

    /// Build a [`StoryRef`] for `story_id`, locating its file under the
    /// stories directory. Falls back to `<stories-dir>/<story-id>.md`.
    pub fn resolve_story(&self, story_id: &str) -> StoryRef {
        let stories_dir = self.config.stories_dir();
        let path = find_story_file(&stories_dir, story_id)
            .unwrap_or_else(|| stories_dir.join(format!("{story_id}.md")));
        StoryRef::new(story_id, path.to_string_lossy())
    }

    /// Apply `op`. Operations the orchestrators refuse come back as
    /// [`OpReply::Rejected`].
    pub async fn handle(&self, op: Op) -> OpReply {
        debug!(?op, "Handling op");
        let result = match op {
            Op::StartCycle { story } => {
                let story = self.with_file(story);
                self.cycle()
                    .start(story)
                    .map(|handle| OpReply::RunStarted {
                        run_id: handle.run_id().clone(),
                    })
            }
            Op::CancelCycle => self.cycle().cancel().await.map(|()| OpReply::Ack),
            Op::RetryCycle => self.cycle().retry().map(|handle| OpReply::RunStarted {
                run_id: handle.run_id().clone(),
            }),
            Op::StartEpic { epic_id, stories } => {
                let stories = stories.into_iter().map(|s| self.with_file(s)).collect();
                self.epic
                    .start_epic_cycle(&epic_id, stories)
                    .map(|()| OpReply::Ack)
            }
            Op::CancelEpic => self.epic.cancel().await.map(|()| OpReply::Ack),
            Op::RetryEpic => self.epic.retry().map(|()| OpReply::Ack),
            Op::ResetEpic => self.epic.reset().map(|()| OpReply::Ack),
            Op::SetMinimized { minimized } => {
                self.cycle().set_minimized(minimized);
                Ok(OpReply::Ack)
            }
            Op::GetCycleState => Ok(OpReply::CycleState {
                state: self.cycle().snapshot(),
            }),
            Op::GetEpicState => Ok(OpReply::EpicState {
                state: self.epic.snapshot(),
            }),
        };

        result.unwrap_or_else(|e: CycleError| OpReply::Rejected {
            reason: e.to_string(),
        })
    }

    /// Fill in a missing story file path.
    fn with_file(&self, story: StoryRef) -> StoryRef {
        if story.file_path.is_empty() {
            self.resolve_story(&story.id)
        } else {
            story
        }
    }
}
