//! Observable state of the single-story orchestrator.
//!
//! The state record is published through a `watch` channel and lifecycle
//! notifications through a `broadcast` channel. Every run-scoped mutation
//! names the run it belongs to and is dropped when that run is no longer the
//! current one, so late completions of a cancelled or retried run can never
//! touch the state.

use chrono::Local;
use sc_protocol::{Event, RunId, SingleCycleState, StepStatus};
use tokio::sync::{broadcast, watch};

/// Owner of the [`SingleCycleState`] record.
pub struct CycleStore {
    state: watch::Sender<SingleCycleState>,
    events: broadcast::Sender<Event>,
}

impl CycleStore {
    pub fn new(events: broadcast::Sender<Event>) -> Self {
        let (state, _) = watch::channel(SingleCycleState::default());
        Self { state, events }
    }

    pub fn subscribe(&self) -> watch::Receiver<SingleCycleState> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> SingleCycleState {
        self.state.borrow().clone()
    }

    /// Whether `run` is the run the state currently belongs to.
    pub fn is_current(&self, run: &RunId) -> bool {
        self.state.borrow().run_id.as_ref() == Some(run)
    }

    pub fn set_minimized(&self, minimized: bool) {
        self.state.send_if_modified(|s| {
            let changed = s.minimized != minimized;
            s.minimized = minimized;
            changed
        });
    }

    /// Replace the state with a fresh run of `total_steps` pending steps.
    pub(crate) fn start_run(&self, run: &RunId, story_id: &str, total_steps: usize) {
        self.state.send_modify(|s| {
            *s = SingleCycleState {
                is_running: true,
                story_id: Some(story_id.to_string()),
                run_id: Some(run.clone()),
                current_step: 0,
                total_steps,
                step_statuses: vec![StepStatus::Pending; total_steps],
                minimized: s.minimized,
                ..Default::default()
            };
            s.logs.push(stamp(&format!("Starting cycle for {story_id}")));
        });
        self.emit(Event::CycleStarted {
            run_id: run.clone(),
            story_id: story_id.to_string(),
            start_step: 0,
            total_steps,
        });
    }

    /// Hand the state to `run`, resetting `from` and every later step.
    pub(crate) fn resume_run(&self, run: &RunId, from: usize) {
        let mut story_id = String::new();
        let mut total_steps = 0;
        self.state.send_modify(|s| {
            s.is_running = true;
            s.run_id = Some(run.clone());
            s.error = None;
            s.failed_step = None;
            s.current_step = from;
            for status in s.step_statuses.iter_mut().skip(from) {
                *status = StepStatus::Pending;
            }
            s.logs.push(stamp(&format!("Retrying from step {}", from + 1)));
            story_id = s.story_id.clone().unwrap_or_default();
            total_steps = s.total_steps;
        });
        self.emit(Event::CycleStarted {
            run_id: run.clone(),
            story_id,
            start_step: from,
            total_steps,
        });
    }

    /// Move step `index` of `run` to `status`, logging `line`.
    pub(crate) fn set_step_status(
        &self,
        run: &RunId,
        index: usize,
        step_id: &str,
        status: StepStatus,
        line: Option<String>,
    ) -> bool {
        let applied = self
            .mutate_current(run, |s| {
                if let Some(slot) = s.step_statuses.get_mut(index) {
                    *slot = status;
                }
                s.current_step = index;
                if let Some(line) = &line {
                    s.logs.push(stamp(line));
                }
            })
            .is_some();

        if applied {
            self.emit(Event::StepStatusChanged {
                run_id: run.clone(),
                step_index: index,
                step_id: step_id.to_string(),
                status,
            });
            if let Some(line) = line {
                self.emit(Event::CycleLog {
                    run_id: run.clone(),
                    line,
                });
            }
        }
        applied
    }

    /// Append a line to the run log.
    pub(crate) fn log(&self, run: &RunId, line: impl Into<String>) -> bool {
        let line = line.into();
        let applied = self
            .mutate_current(run, |s| s.logs.push(stamp(&line)))
            .is_some();
        if applied {
            self.emit(Event::CycleLog {
                run_id: run.clone(),
                line,
            });
        }
        applied
    }

    pub(crate) fn set_session(&self, run: &RunId, session_id: &str) -> bool {
        self.mutate_current(run, |s| s.session_id = Some(session_id.to_string()))
            .is_some()
    }

    /// Halt `run` on step `index`. The error is written once.
    pub(crate) fn fail_run(&self, run: &RunId, index: usize, step_id: &str, error: &str) -> bool {
        let story_id = self.mutate_current(run, |s| {
            if s.error.is_some() || !s.is_running {
                return None;
            }
            if let Some(slot) = s.step_statuses.get_mut(index) {
                *slot = StepStatus::Error;
            }
            s.current_step = index;
            s.is_running = false;
            s.error = Some(error.to_string());
            s.failed_step = Some(index);
            s.logs.push(stamp(&format!("Step {step_id} failed: {error}")));
            Some(s.story_id.clone().unwrap_or_default())
        });

        match story_id.flatten() {
            Some(story_id) => {
                self.emit(Event::StepStatusChanged {
                    run_id: run.clone(),
                    step_index: index,
                    step_id: step_id.to_string(),
                    status: StepStatus::Error,
                });
                self.emit(Event::CycleFailed {
                    run_id: run.clone(),
                    story_id,
                    step_index: index,
                    error: error.to_string(),
                });
                true
            }
            None => false,
        }
    }

    pub(crate) fn complete_run(&self, run: &RunId) -> bool {
        let story_id = self.mutate_current(run, |s| {
            s.is_running = false;
            s.logs.push(stamp("Cycle complete"));
            s.story_id.clone().unwrap_or_default()
        });

        match story_id {
            Some(story_id) => {
                self.emit(Event::CycleCompleted {
                    run_id: run.clone(),
                    story_id,
                });
                true
            }
            None => false,
        }
    }

    /// Stop the current run: the in-flight step becomes `Error`, the run id
    /// is cleared so nothing from the run applies afterwards.
    ///
    /// Returns the cancelled run, or `None` when nothing was running.
    pub(crate) fn cancel_run(&self) -> Option<RunId> {
        let mut cancelled = None;
        self.state.send_if_modified(|s| {
            let Some(run) = s.run_id.take().filter(|_| s.is_running) else {
                return false;
            };
            let index = s.current_step;
            if let Some(slot) = s.step_statuses.get_mut(index) {
                if *slot == StepStatus::Running {
                    *slot = StepStatus::Error;
                }
            }
            s.is_running = false;
            s.error = Some("cancelled".to_string());
            s.failed_step = Some(index);
            s.logs.push(stamp("Cycle cancelled"));
            cancelled = Some((run, s.story_id.clone().unwrap_or_default()));
            true
        });

        let (run, story_id) = cancelled?;
        self.emit(Event::CycleCancelled {
            run_id: run.clone(),
            story_id,
        });
        Some(run)
    }

    pub(crate) fn emit(&self, event: Event) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn mutate_current<R>(
        &self,
        run: &RunId,
        f: impl FnOnce(&mut SingleCycleState) -> R,
    ) -> Option<R> {
        let mut out = None;
        self.state.send_if_modified(|s| {
            if s.run_id.as_ref() != Some(run) {
                return false;
            }
            out = Some(f(s));
            true
        });
        out
    }
}

fn stamp(line: &str) -> String {
    format!("[{}] {line}", Local::now().format("%H:%M:%S"))
}
