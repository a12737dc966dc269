//! Test fixtures: fast settings and a fully wired service over mocks.

use super::mock_agents::ScriptedChannel;
use super::mock_git::{MockGit, RecordingStatus};
use sc_core::agents::InMemoryConversationLog;
use sc_core::classifier::HeuristicClassifier;
use sc_core::config::ProjectConfig;
use sc_core::engine::CycleDeps;
use sc_core::state::CycleService;
use sc_protocol::{CycleSettings, Event, StoryRef, TimingSettings};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Default settings with millisecond delays.
pub fn fast_settings() -> CycleSettings {
    let mut settings = CycleSettings::default();
    settings.timing = TimingSettings {
        auto_reply_settle_ms: 5,
        story_settle_ms: 100,
        short_output_recheck_ms: 50,
        cancel_exit_wait_ms: 1000,
        ..TimingSettings::default()
    };
    settings.agents.step_timeout_secs = 10;
    settings.git.branch_restriction = true;
    settings
}

pub fn story(id: &str) -> StoryRef {
    StoryRef::new(id, format!("docs/stories/{id}.md"))
}

/// A service over scripted collaborators, with handles to all of them.
pub struct Harness {
    pub service: CycleService,
    pub channel: Arc<ScriptedChannel>,
    pub git: Arc<MockGit>,
    pub status: Arc<RecordingStatus>,
    pub conversation: Arc<InMemoryConversationLog>,
}

#[allow(dead_code)]
impl Harness {
    pub fn new(settings: CycleSettings) -> Self {
        Self::with_git(settings, MockGit::new())
    }

    pub fn with_git(settings: CycleSettings, git: MockGit) -> Self {
        let channel = Arc::new(ScriptedChannel::new());
        let git = Arc::new(git);
        let status = Arc::new(RecordingStatus::new());
        let conversation = Arc::new(InMemoryConversationLog::new());

        let deps = CycleDeps {
            channel: channel.clone(),
            git: git.clone(),
            status: status.clone(),
            conversation: conversation.clone(),
            classifier: Arc::new(HeuristicClassifier::new(
                settings.timing.classifier_window_chars,
            )),
        };
        let config = ProjectConfig::new("/tmp/story-cycle-project", settings);

        Self {
            service: CycleService::new(config, deps),
            channel,
            git,
            status,
            conversation,
        }
    }
}

/// Collect events until `stop` matches one, or panic after `timeout`.
#[allow(dead_code)]
pub async fn collect_until(
    events: &mut broadcast::Receiver<Event>,
    timeout: Duration,
    stop: impl Fn(&Event) -> bool,
) -> Vec<Event> {
    let mut seen = Vec::new();
    let outcome = tokio::time::timeout(timeout, async {
        loop {
            match events.recv().await {
                Ok(event) => {
                    let done = stop(&event);
                    seen.push(event);
                    if done {
                        return;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return,
            }
        }
    })
    .await;
    assert!(outcome.is_ok(), "timed out waiting for event; saw {seen:#?}");
    seen
}

/// Poll `condition` every few milliseconds until it holds, or panic.
#[allow(dead_code)]
pub async fn wait_until(timeout: Duration, condition: impl Fn() -> bool) {
    let polled = tokio::time::timeout(timeout, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(polled.is_ok(), "condition not reached within {timeout:?}");
}

/// Everything already queued on `events`.
#[allow(dead_code)]
pub fn drain(events: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    let mut seen = Vec::new();
    loop {
        match events.try_recv() {
            Ok(event) => seen.push(event),
            Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            Err(_) => return seen,
        }
    }
}
