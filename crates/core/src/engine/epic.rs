//! Epic queue orchestrator.
//!
//! Runs a fixed queue of stories through the [`SingleCycleOrchestrator`],
//! one story at a time, halting the queue on the first story that does not
//! complete. Every start, retry, cancel and reset bumps a generation counter;
//! a driver task only touches the queue while its generation is current.

use crate::engine::cycle::{RunHandle, RunOutcome, SingleCycleOrchestrator};
use crate::engine::error::{CycleError, CycleResult};
use crate::state::EpicStore;
use sc_protocol::{EpicPhase, EpicQueueState, Event, StoryRef};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

#[derive(Default)]
struct EpicControl {
    stories: Vec<StoryRef>,
    generation: u64,
    cancel: CancellationToken,
    /// A driver task owns the queue.
    driving: bool,
}

struct EpicInner {
    cycle: SingleCycleOrchestrator,
    store: EpicStore,
    story_settle: Duration,
    control: Mutex<EpicControl>,
}

/// Drives a queue of stories through the single-story pipeline.
#[derive(Clone)]
pub struct EpicQueueOrchestrator {
    inner: Arc<EpicInner>,
}

impl EpicQueueOrchestrator {
    /// `story_settle` is the pause between a completed story and the next.
    pub fn new(
        cycle: SingleCycleOrchestrator,
        story_settle: Duration,
        events: broadcast::Sender<Event>,
    ) -> Self {
        Self {
            inner: Arc::new(EpicInner {
                cycle,
                store: EpicStore::new(events),
                story_settle,
                control: Mutex::new(EpicControl::default()),
            }),
        }
    }

    pub fn cycle(&self) -> &SingleCycleOrchestrator {
        &self.inner.cycle
    }

    pub fn subscribe(&self) -> watch::Receiver<EpicQueueState> {
        self.inner.store.subscribe()
    }

    pub fn snapshot(&self) -> EpicQueueState {
        self.inner.store.snapshot()
    }

    /// Queue `stories` and start the first one.
    ///
    /// An empty queue completes immediately.
    ///
    /// # Errors
    ///
    /// `AlreadyRunning` while a queue or a single cycle is running.
    #[instrument(skip_all, fields(epic_id = %epic_id, stories = stories.len()))]
    pub fn start_epic_cycle(&self, epic_id: &str, stories: Vec<StoryRef>) -> CycleResult<()> {
        let mut control = self.inner.control();
        if control.driving || self.inner.cycle.is_running() {
            return Err(CycleError::AlreadyRunning);
        }
        control.generation += 1;

        if stories.is_empty() {
            control.stories.clear();
            self.inner.store.complete_empty(epic_id);
            info!("Empty epic queue, nothing to run");
            return Ok(());
        }

        let ids = stories.iter().map(|s| s.id.clone()).collect();
        control.stories = stories;
        control.cancel = CancellationToken::new();
        control.driving = true;
        self.inner.store.start(epic_id, ids);

        let generation = control.generation;
        let cancel = control.cancel.clone();
        drop(control);

        info!("Starting epic queue");
        tokio::spawn(Arc::clone(&self.inner).drive(generation, cancel, 0, false));
        Ok(())
    }

    /// Resume a halted queue at the story it halted on.
    ///
    /// # Errors
    ///
    /// `AlreadyRunning` while the queue or a cycle is running,
    /// `NothingToRetry` unless the queue is in the `Error` phase.
    pub fn retry(&self) -> CycleResult<()> {
        let mut control = self.inner.control();
        if control.driving || self.inner.cycle.is_running() {
            return Err(CycleError::AlreadyRunning);
        }
        let state = self.inner.store.snapshot();
        if state.phase != EpicPhase::Error {
            return Err(CycleError::NothingToRetry);
        }

        control.generation += 1;
        control.cancel = CancellationToken::new();
        control.driving = true;
        self.inner.store.resume();

        let generation = control.generation;
        let cancel = control.cancel.clone();
        drop(control);

        info!(index = state.current_story_index, "Retrying epic queue");
        tokio::spawn(Arc::clone(&self.inner).drive(
            generation,
            cancel,
            state.current_story_index,
            true,
        ));
        Ok(())
    }

    /// Cancel the running queue and its active story.
    ///
    /// # Errors
    ///
    /// `NotRunning` when no queue is running.
    pub async fn cancel(&self) -> CycleResult<()> {
        let cancel = {
            let mut control = self.inner.control();
            if !control.driving {
                return Err(CycleError::NotRunning);
            }
            control.driving = false;
            control.generation += 1;
            let index = self.inner.store.snapshot().current_story_index;
            self.inner.store.halt(index, "cancelled");
            control.cancel.clone()
        };

        cancel.cancel();
        match self.inner.cycle.cancel().await {
            Ok(()) | Err(CycleError::NotRunning) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Drop the queue and go back to `Setup`.
    ///
    /// # Errors
    ///
    /// `AlreadyRunning` while the queue is running.
    pub fn reset(&self) -> CycleResult<()> {
        let mut control = self.inner.control();
        if control.driving {
            return Err(CycleError::AlreadyRunning);
        }
        control.generation += 1;
        control.stories.clear();
        self.inner.store.reset();
        Ok(())
    }
}

impl EpicInner {
    fn control(&self) -> MutexGuard<'_, EpicControl> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` under the control lock if `generation` still owns the queue.
    fn with_current<R>(&self, generation: u64, f: impl FnOnce(&mut EpicControl) -> R) -> Option<R> {
        let mut control = self.control();
        (control.generation == generation).then(|| f(&mut control))
    }

    fn halt(&self, generation: u64, index: usize, error: &str) {
        warn!(index, error, "Epic queue halted");
        self.with_current(generation, |control| {
            control.driving = false;
            self.store.halt(index, error);
        });
    }

    fn launch(&self, story: &StoryRef, resume: bool) -> CycleResult<RunHandle> {
        let resumable = resume
            && self.cycle.snapshot().story_id.as_deref() == Some(story.id.as_str());
        if resumable {
            match self.cycle.retry() {
                Err(CycleError::NothingToRetry) => {}
                other => return other,
            }
        }
        self.cycle.start(story.clone())
    }

    async fn drive(
        self: Arc<Self>,
        generation: u64,
        cancel: CancellationToken,
        mut index: usize,
        mut resume: bool,
    ) {
        loop {
            let story = self.with_current(generation, |control| {
                let story = control.stories.get(index).cloned();
                if story.is_some() {
                    self.store.story_started(index);
                }
                story
            });
            let Some(Some(story)) = story else {
                return;
            };

            let handle = match self.launch(&story, resume) {
                Ok(handle) => handle,
                Err(e) => {
                    self.halt(generation, index, &e.to_string());
                    return;
                }
            };
            resume = false;

            let outcome = tokio::select! {
                _ = cancel.cancelled() => return,
                outcome = handle.wait() => outcome,
            };

            match outcome {
                RunOutcome::Completed => {
                    let finished = self.with_current(generation, |control| {
                        let finished = self.store.story_completed(index);
                        if finished {
                            control.driving = false;
                        }
                        finished
                    });
                    match finished {
                        Some(false) => {}
                        Some(true) => {
                            info!("Epic queue complete");
                            return;
                        }
                        None => return,
                    }
                    index += 1;

                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        _ = tokio::time::sleep(self.story_settle) => {}
                    }
                }
                RunOutcome::Failed { message, .. } => {
                    self.halt(generation, index, &message);
                    return;
                }
                RunOutcome::Cancelled => {
                    self.halt(generation, index, "cancelled");
                    return;
                }
                RunOutcome::Superseded => {
                    self.halt(generation, index, "story run was superseded");
                    return;
                }
            }
        }
    }
}
