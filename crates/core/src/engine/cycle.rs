//! Single-story orchestrator.
//!
//! Drives one story through its step plan. Execution happens on a spawned
//! task; the public operations only mint runs, flip control state and hand
//! back a [`RunHandle`]. Each run owns a [`RunId`] and a cancellation token:
//! the id keeps late completions out of the state, the token wakes whatever
//! the run is waiting on.

use crate::config::ProjectConfig;
use crate::engine::error::{CycleError, CycleResult};
use crate::engine::session::{AgentSession, SessionMap};
use crate::engine::CycleDeps;
use crate::git::{GitStepContext, GitStepExecutor, GitStepOutcome};
use crate::plan::{build_steps, render_template};
use crate::state::CycleStore;
use sc_protocol::{
    ChannelEvent, Event, RunId, SingleCycleState, Step, StepKind, StepStatus, StoryRef,
};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// How a run ended, as seen by whoever awaits its [`RunHandle`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Failed {
        step_index: Option<usize>,
        message: String,
    },
    Cancelled,
    /// A newer run took over the state before this one finished.
    Superseded,
}

impl RunOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// A spawned run.
pub struct RunHandle {
    run_id: RunId,
    task: JoinHandle<RunOutcome>,
}

impl RunHandle {
    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    /// Wait for the run to end.
    pub async fn wait(self) -> RunOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => RunOutcome::Failed {
                step_index: None,
                message: format!("run task aborted: {e}"),
            },
        }
    }
}

enum StepOutcome {
    Completed,
    Skipped(String),
}

impl From<GitStepOutcome> for StepOutcome {
    fn from(outcome: GitStepOutcome) -> Self {
        match outcome {
            GitStepOutcome::Completed => Self::Completed,
            GitStepOutcome::Skipped(reason) => Self::Skipped(reason),
        }
    }
}

struct ActiveRun {
    run_id: RunId,
    cancel: CancellationToken,
    /// Agent of the step in flight, if it is an agent step.
    agent_id: Option<String>,
}

#[derive(Default)]
struct Control {
    story: Option<StoryRef>,
    steps: Arc<Vec<Step>>,
    active: Option<ActiveRun>,
}

struct Inner {
    config: ProjectConfig,
    deps: CycleDeps,
    git_steps: GitStepExecutor,
    store: CycleStore,
    control: Mutex<Control>,
    sessions: SessionMap,
}

/// Orchestrates the step plan of one story at a time.
///
/// Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct SingleCycleOrchestrator {
    inner: Arc<Inner>,
}

impl SingleCycleOrchestrator {
    pub fn new(config: ProjectConfig, deps: CycleDeps, events: broadcast::Sender<Event>) -> Self {
        let git_steps = GitStepExecutor::new(Arc::clone(&deps.git), config.settings.git.clone());
        Self {
            inner: Arc::new(Inner {
                config,
                deps,
                git_steps,
                store: CycleStore::new(events),
                control: Mutex::new(Control::default()),
                sessions: SessionMap::default(),
            }),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SingleCycleState> {
        self.inner.store.subscribe()
    }

    pub fn snapshot(&self) -> SingleCycleState {
        self.inner.store.snapshot()
    }

    pub fn set_minimized(&self, minimized: bool) {
        self.inner.store.set_minimized(minimized);
    }

    /// Whether a run is in flight.
    pub fn is_running(&self) -> bool {
        self.inner.control().active.is_some()
    }

    /// Start the full plan for `story`.
    ///
    /// # Errors
    ///
    /// `AlreadyRunning` while another run is active.
    #[instrument(skip_all, fields(story_id = %story.id))]
    pub fn start(&self, story: StoryRef) -> CycleResult<RunHandle> {
        let settings = &self.inner.config.settings;
        let steps = Arc::new(build_steps(settings.profile, settings.review_rounds));
        let run_id = RunId::mint(&story.id);
        let cancel = CancellationToken::new();

        {
            let mut control = self.inner.control();
            if control.active.is_some() {
                return Err(CycleError::AlreadyRunning);
            }
            control.story = Some(story.clone());
            control.steps = Arc::clone(&steps);
            control.active = Some(ActiveRun {
                run_id: run_id.clone(),
                cancel: cancel.clone(),
                agent_id: None,
            });
            self.inner
                .sessions
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clear();
            self.inner.store.start_run(&run_id, &story.id, steps.len());
        }

        info!(run_id = %run_id, steps = steps.len(), "Starting cycle");
        Ok(self.spawn(run_id, cancel, story, steps, 0))
    }

    /// Resume the last run at its first step that is neither completed nor
    /// skipped.
    ///
    /// # Errors
    ///
    /// `AlreadyRunning` while a run is active, `NothingToRetry` when no story
    /// has run yet or every step is done.
    pub fn retry(&self) -> CycleResult<RunHandle> {
        let run_id;
        let cancel = CancellationToken::new();
        let (story, steps, from) = {
            let mut control = self.inner.control();
            if control.active.is_some() {
                return Err(CycleError::AlreadyRunning);
            }
            let story = control.story.clone().ok_or(CycleError::NothingToRetry)?;
            let from = self
                .inner
                .store
                .snapshot()
                .first_incomplete_step()
                .ok_or(CycleError::NothingToRetry)?;

            run_id = RunId::mint(&story.id);
            control.active = Some(ActiveRun {
                run_id: run_id.clone(),
                cancel: cancel.clone(),
                agent_id: None,
            });
            self.inner.store.resume_run(&run_id, from);
            (story, Arc::clone(&control.steps), from)
        };

        info!(story_id = %story.id, run_id = %run_id, from, "Retrying cycle");
        Ok(self.spawn(run_id, cancel, story, steps, from))
    }

    /// Cancel the active run.
    ///
    /// Completed steps stay completed; the step in flight becomes `Error`.
    /// When an agent step is in flight its process is killed and the call
    /// returns once that process has exited or the wait has run out.
    ///
    /// # Errors
    ///
    /// `NotRunning` when nothing is running.
    pub async fn cancel(&self) -> CycleResult<()> {
        let active = self
            .inner
            .control()
            .active
            .take()
            .ok_or(CycleError::NotRunning)?;

        self.inner.store.cancel_run();
        active.cancel.cancel();
        info!(run_id = %active.run_id, "Cancelled cycle");

        if let Some(agent_id) = active.agent_id {
            self.inner.stop_agent(&agent_id).await;
        }
        Ok(())
    }

    fn spawn(
        &self,
        run_id: RunId,
        cancel: CancellationToken,
        story: StoryRef,
        steps: Arc<Vec<Step>>,
        from: usize,
    ) -> RunHandle {
        let inner = Arc::clone(&self.inner);
        let run = run_id.clone();
        let task = tokio::spawn(async move {
            let outcome = inner.run_steps(&run, &cancel, &story, &steps, from).await;
            inner.release(&run);
            outcome
        });
        RunHandle { run_id, task }
    }
}

impl Inner {
    fn control(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drop the control entry of `run` if it is still the active one.
    fn release(&self, run: &RunId) {
        let mut control = self.control();
        if control.active.as_ref().is_some_and(|a| &a.run_id == run) {
            control.active = None;
        }
    }

    /// Kill the process serving `agent_id` and wait, bounded by
    /// `cancel_exit_wait_ms`, for its exit.
    ///
    /// A later session of the same agent subscribes after this returns, so
    /// the exit of the killed process never reaches it.
    async fn stop_agent(&self, agent_id: &str) {
        let mut events = self.deps.channel.subscribe();
        if !self.deps.channel.cancel_message(agent_id).await {
            return;
        }

        let wait = Duration::from_millis(self.config.settings.timing.cancel_exit_wait_ms);
        let exited = tokio::time::timeout(wait, async {
            loop {
                match events.recv().await {
                    Ok(ChannelEvent::Exit { agent_id: id, .. }) if id == agent_id => return,
                    Ok(_) | Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => return,
                }
            }
        })
        .await;
        if exited.is_err() {
            warn!(agent_id, ?wait, "Agent process did not exit after cancel");
        }
    }

    fn set_active_agent(&self, run: &RunId, agent_id: Option<&str>) {
        let mut control = self.control();
        if let Some(active) = control.active.as_mut().filter(|a| &a.run_id == run) {
            active.agent_id = agent_id.map(str::to_string);
        }
    }

    async fn run_steps(
        &self,
        run: &RunId,
        cancel: &CancellationToken,
        story: &StoryRef,
        steps: &[Step],
        from: usize,
    ) -> RunOutcome {
        let total = steps.len();

        for (index, step) in steps.iter().enumerate().skip(from) {
            if cancel.is_cancelled() {
                return RunOutcome::Cancelled;
            }
            let started = self.store.set_step_status(
                run,
                index,
                &step.id,
                StepStatus::Running,
                Some(format!("Step {}/{total}: {}", index + 1, step.name)),
            );
            if !started {
                return RunOutcome::Superseded;
            }

            match self.execute_step(run, cancel, story, step).await {
                Ok(StepOutcome::Completed) => {
                    self.store.set_step_status(
                        run,
                        index,
                        &step.id,
                        StepStatus::Completed,
                        Some(format!("{} completed", step.name)),
                    );
                }
                Ok(StepOutcome::Skipped(reason)) => {
                    self.store.set_step_status(
                        run,
                        index,
                        &step.id,
                        StepStatus::Skipped,
                        Some(format!("{} skipped: {reason}", step.name)),
                    );
                }
                Err(_) if cancel.is_cancelled() => return RunOutcome::Cancelled,
                Err(e) if e.is_stale() || !self.store.is_current(run) => {
                    return RunOutcome::Superseded
                }
                Err(e) => {
                    let message = e.to_string();
                    warn!(step = %step.id, error = %message, "Step failed");
                    self.store.fail_run(run, index, &step.id, &message);
                    return RunOutcome::Failed {
                        step_index: Some(index),
                        message,
                    };
                }
            }
        }

        if self.store.complete_run(run) {
            info!(story_id = %story.id, "Cycle completed");
            RunOutcome::Completed
        } else {
            RunOutcome::Superseded
        }
    }

    async fn execute_step(
        &self,
        run: &RunId,
        cancel: &CancellationToken,
        story: &StoryRef,
        step: &Step,
    ) -> CycleResult<StepOutcome> {
        let project_path = self.config.project_path();

        match &step.kind {
            StepKind::Status { new_status } => {
                let result = self
                    .deps
                    .status
                    .update_story_status(&story.file_path, new_status)
                    .await;
                if result.success {
                    Ok(StepOutcome::Completed)
                } else {
                    Err(CycleError::StatusUpdateFailed(
                        result.error_text().to_string(),
                    ))
                }
            }
            StepKind::Git {
                action,
                commit_message,
            } => {
                let ctx = GitStepContext {
                    project_path: &project_path,
                    story,
                    step_id: &step.id,
                };
                let work = self
                    .git_steps
                    .execute(*action, commit_message.as_deref(), ctx);
                tokio::select! {
                    _ = cancel.cancelled() => Err(CycleError::Cancelled),
                    outcome = work => outcome.map(StepOutcome::from),
                }
            }
            StepKind::Agent { agent_id, command } => {
                self.set_active_agent(run, Some(agent_id));
                let result = self
                    .agent_step(run, cancel, story, step, agent_id, command, &project_path)
                    .await;
                self.set_active_agent(run, None);
                result.map(|()| StepOutcome::Completed)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn agent_step(
        &self,
        run: &RunId,
        cancel: &CancellationToken,
        story: &StoryRef,
        step: &Step,
        agent_id: &str,
        command: &str,
        project_path: &str,
    ) -> CycleResult<()> {
        let session = AgentSession {
            channel: self.deps.channel.as_ref(),
            conversation: self.deps.conversation.as_ref(),
            classifier: self.deps.classifier.as_ref(),
            store: &self.store,
            sessions: &self.sessions,
            settings: &self.config.settings,
            project_path,
            run,
            cancel,
            agent_id,
            command: render_template(command, story, &step.id),
        };

        let secs = self.config.settings.agents.step_timeout_secs;
        let result = tokio::select! {
            _ = cancel.cancelled() => Err(CycleError::Cancelled),
            result = with_deadline(session.run(), agent_id, secs) => result,
        };

        if matches!(result, Err(CycleError::Timeout { .. })) {
            warn!(agent_id, secs, "Agent step timed out, cancelling the process");
            self.stop_agent(agent_id).await;
        }
        result
    }
}

/// Bound `work` by `secs` seconds; `0` means no bound.
async fn with_deadline<F>(work: F, agent_id: &str, secs: u64) -> CycleResult<()>
where
    F: Future<Output = CycleResult<()>>,
{
    if secs == 0 {
        return work.await;
    }
    tokio::time::timeout(Duration::from_secs(secs), work)
        .await
        .unwrap_or_else(|_| {
            Err(CycleError::Timeout {
                agent_id: agent_id.to_string(),
                secs,
            })
        })
}
