//! Observable state of the epic queue orchestrator.
//!
//! Mirrors [`CycleStore`](super::cycle::CycleStore): a `watch` channel for
//! the record, the shared `broadcast` channel for events. The store does not
//! guard against stale writers itself; the epic orchestrator checks its queue
//! generation before calling in.

use chrono::Utc;
use sc_protocol::{EpicPhase, EpicQueueState, Event, StoryStatus};
use tokio::sync::{broadcast, watch};

pub struct EpicStore {
    state: watch::Sender<EpicQueueState>,
    events: broadcast::Sender<Event>,
}

impl EpicStore {
    pub fn new(events: broadcast::Sender<Event>) -> Self {
        let (state, _) = watch::channel(EpicQueueState::default());
        Self { state, events }
    }

    pub fn subscribe(&self) -> watch::Receiver<EpicQueueState> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> EpicQueueState {
        self.state.borrow().clone()
    }

    /// Install a new queue in the `Running` phase.
    pub(crate) fn start(&self, epic_id: &str, story_ids: Vec<String>) {
        let stories = story_ids.len();
        self.state.send_replace(EpicQueueState {
            phase: EpicPhase::Running,
            is_running: true,
            epic_id: Some(epic_id.to_string()),
            story_statuses: vec![StoryStatus::Pending; stories],
            story_queue: story_ids,
            current_story_index: 0,
            start_time: Some(Utc::now()),
            error: None,
        });
        self.emit(Event::EpicStarted {
            epic_id: epic_id.to_string(),
            stories,
        });
    }

    /// Back to `Running` after a halt, with the current story pending again.
    pub(crate) fn resume(&self) {
        self.state.send_modify(|s| {
            s.phase = EpicPhase::Running;
            s.is_running = true;
            s.error = None;
            let index = s.current_story_index;
            if let Some(slot) = s.story_statuses.get_mut(index) {
                *slot = StoryStatus::Pending;
            }
        });
    }

    pub(crate) fn story_started(&self, index: usize) {
        let mut started = None;
        self.state.send_modify(|s| {
            s.current_story_index = index;
            if let Some(slot) = s.story_statuses.get_mut(index) {
                *slot = StoryStatus::Running;
            }
            started = s
                .story_queue
                .get(index)
                .cloned()
                .map(|story_id| (s.epic_id.clone().unwrap_or_default(), story_id));
        });
        if let Some((epic_id, story_id)) = started {
            self.emit(Event::EpicStoryStarted {
                epic_id,
                index,
                story_id,
            });
        }
    }

    /// Mark story `index` completed and move the cursor past it.
    ///
    /// Returns `true` when that was the last story; the queue is then
    /// `Complete`.
    pub(crate) fn story_completed(&self, index: usize) -> bool {
        let mut finished = None;
        self.state.send_modify(|s| {
            if let Some(slot) = s.story_statuses.get_mut(index) {
                *slot = StoryStatus::Completed;
            }
            s.current_story_index = index + 1;
            if s.current_story_index >= s.story_queue.len() {
                s.phase = EpicPhase::Complete;
                s.is_running = false;
                finished = Some(s.epic_id.clone().unwrap_or_default());
            }
        });
        match finished {
            Some(epic_id) => {
                self.emit(Event::EpicCompleted { epic_id });
                true
            }
            None => false,
        }
    }

    /// Stop the queue on story `index`.
    pub(crate) fn halt(&self, index: usize, error: &str) {
        let mut epic_id = String::new();
        self.state.send_modify(|s| {
            if let Some(slot) = s.story_statuses.get_mut(index) {
                *slot = StoryStatus::Error;
            }
            s.current_story_index = index;
            s.phase = EpicPhase::Error;
            s.is_running = false;
            s.error = Some(error.to_string());
            epic_id = s.epic_id.clone().unwrap_or_default();
        });
        self.emit(Event::EpicHalted {
            epic_id,
            index,
            error: error.to_string(),
        });
    }

    /// An empty queue finishes immediately.
    pub(crate) fn complete_empty(&self, epic_id: &str) {
        self.state.send_replace(EpicQueueState {
            phase: EpicPhase::Complete,
            epic_id: Some(epic_id.to_string()),
            start_time: Some(Utc::now()),
            ..Default::default()
        });
        self.emit(Event::EpicCompleted {
            epic_id: epic_id.to_string(),
        });
    }

    pub(crate) fn reset(&self) {
        self.state.send_replace(EpicQueueState::default());
    }

    fn emit(&self, event: Event) {
        let _ = self.events.send(event);
    }
}
