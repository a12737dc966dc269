//! Integration tests for the epic queue orchestrator.

mod common;

use common::*;
use sc_core::engine::CycleError;
use sc_protocol::{EpicPhase, Event, StoryStatus};
use std::time::{Duration, Instant};

async fn wait_for_phase(harness: &Harness, phase: EpicPhase) {
    let mut state = harness.service.epic().subscribe();
    let reached = tokio::time::timeout(Duration::from_secs(5), async {
        state
            .wait_for(|s| s.phase == phase && !s.is_running)
            .await
            .is_ok()
    })
    .await;
    assert!(matches!(reached, Ok(true)), "epic never reached {phase:?}");
}

#[tokio::test]
async fn test_epic_runs_stories_in_order_with_settle_delay() {
    let harness = Harness::new(fast_settings());
    let mut events = harness.service.subscribe_events();

    harness
        .service
        .epic()
        .start_epic_cycle("epic-1", vec![story("1-1"), story("1-2")])
        .unwrap();

    let mut stamped = Vec::new();
    let finished = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let Ok(event) = events.recv().await else { continue };
            let done = matches!(event, Event::EpicCompleted { .. });
            stamped.push((Instant::now(), event));
            if done {
                return;
            }
        }
    })
    .await;
    assert!(finished.is_ok(), "epic did not complete");

    let started: Vec<_> = stamped
        .iter()
        .filter_map(|(_, e)| match e {
            Event::EpicStoryStarted {
                index, story_id, ..
            } => Some((*index, story_id.clone())),
            _ => None,
        })
        .collect();
    assert_eq!(started, vec![(0, "1-1".to_string()), (1, "1-2".to_string())]);

    let first_done = stamped
        .iter()
        .find(|(_, e)| matches!(e, Event::CycleCompleted { story_id, .. } if story_id == "1-1"))
        .map(|(at, _)| *at)
        .unwrap();
    let second_started = stamped
        .iter()
        .find(|(_, e)| matches!(e, Event::CycleStarted { story_id, .. } if story_id == "1-2"))
        .map(|(at, _)| *at)
        .unwrap();
    assert!(second_started.duration_since(first_done) >= Duration::from_millis(90));

    let state = harness.service.epic().snapshot();
    assert_eq!(state.phase, EpicPhase::Complete);
    assert_eq!(state.completed_count(), 2);
    assert_eq!(state.current_story_index, 2);
    assert_eq!(harness.channel.sent_to("sm"), vec!["*create-story 1-1", "*create-story 1-2"]);
}

#[tokio::test]
async fn test_story_failure_halts_queue_and_retry_resumes_it() {
    let harness = Harness::new(fast_settings());
    harness
        .channel
        .script("sm", [Reply::text("Task complete."), Reply::failing("crash", 1)]);

    harness
        .service
        .epic()
        .start_epic_cycle("epic-1", vec![story("1-1"), story("1-2"), story("1-3")])
        .unwrap();
    wait_for_phase(&harness, EpicPhase::Error).await;

    let state = harness.service.epic().snapshot();
    assert_eq!(state.current_story_index, 1);
    assert_eq!(
        state.story_statuses,
        vec![StoryStatus::Completed, StoryStatus::Error, StoryStatus::Pending]
    );
    assert_eq!(state.error.as_deref(), Some("Agent sm exited with code 1"));
    assert_eq!(harness.service.cycle().snapshot().story_id.as_deref(), Some("1-2"));

    harness.service.epic().retry().unwrap();
    wait_for_phase(&harness, EpicPhase::Complete).await;

    let state = harness.service.epic().snapshot();
    assert_eq!(state.story_statuses, vec![StoryStatus::Completed; 3]);
    assert_eq!(state.error, None);
    // 1-1 is never run again.
    assert_eq!(
        harness.channel.sent_to("sm"),
        vec![
            "*create-story 1-1",
            "*create-story 1-2",
            "*create-story 1-2",
            "*create-story 1-3",
        ]
    );
}

#[tokio::test]
async fn test_empty_queue_completes_immediately() {
    let harness = Harness::new(fast_settings());
    harness.service.epic().start_epic_cycle("epic-1", Vec::new()).unwrap();

    let state = harness.service.epic().snapshot();
    assert_eq!(state.phase, EpicPhase::Complete);
    assert!(!state.is_running);
    assert!(harness.channel.sent().is_empty());
}

#[tokio::test]
async fn test_cancel_halts_queue_and_active_story() {
    let harness = Harness::new(fast_settings());
    harness.channel.script("sm", [Reply::Hang]);

    harness
        .service
        .epic()
        .start_epic_cycle("epic-1", vec![story("1-1"), story("1-2")])
        .unwrap();
    wait_until(Duration::from_secs(2), || harness.channel.sent_to("sm").len() == 1).await;

    harness.service.epic().cancel().await.unwrap();

    let state = harness.service.epic().snapshot();
    assert_eq!(state.phase, EpicPhase::Error);
    assert_eq!(state.error.as_deref(), Some("cancelled"));
    assert_eq!(state.story_statuses[0], StoryStatus::Error);
    assert!(!harness.service.cycle().is_running());
    assert_eq!(harness.channel.cancels(), vec!["sm"]);

    // Nothing else gets started afterwards.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(harness.channel.sent_to("sm").len(), 1);
    assert_eq!(
        harness.service.epic().cancel().await,
        Err(CycleError::NotRunning)
    );
}

#[tokio::test]
async fn test_queue_refuses_to_start_over_a_running_cycle() {
    let harness = Harness::new(fast_settings());
    harness.channel.script("sm", [Reply::Hang]);

    let handle = harness.service.cycle().start(story("9-9")).unwrap();
    assert_eq!(
        harness
            .service
            .epic()
            .start_epic_cycle("epic-1", vec![story("1-1")])
            .err(),
        Some(CycleError::AlreadyRunning)
    );

    harness.service.cycle().cancel().await.unwrap();
    handle.wait().await;
}

#[tokio::test]
async fn test_reset_returns_to_setup() {
    let harness = Harness::new(fast_settings());
    assert_eq!(
        harness.service.epic().retry().err(),
        Some(CycleError::NothingToRetry)
    );

    harness
        .service
        .epic()
        .start_epic_cycle("epic-1", vec![story("1-1")])
        .unwrap();
    wait_for_phase(&harness, EpicPhase::Complete).await;

    harness.service.epic().reset().unwrap();
    let state = harness.service.epic().snapshot();
    assert_eq!(state.phase, EpicPhase::Setup);
    assert!(state.story_queue.is_empty());
}
