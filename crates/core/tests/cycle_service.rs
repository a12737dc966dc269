//! Integration tests for the `Op` dispatcher.

mod common;

use common::*;
use sc_protocol::{EpicPhase, Op, OpReply, StoryRef};
use std::time::Duration;

#[tokio::test]
async fn test_start_cycle_op_resolves_story_file() {
    let harness = Harness::new(fast_settings());
    harness.channel.script("sm", [Reply::Hang]);

    let reply = harness
        .service
        .handle(Op::StartCycle {
            story: StoryRef::new("2-1", ""),
        })
        .await;
    let OpReply::RunStarted { run_id } = reply else {
        panic!("expected RunStarted, got {reply:?}");
    };
    assert!(run_id.as_str().starts_with("2-1:"));

    let OpReply::CycleState { state } = harness.service.handle(Op::GetCycleState).await else {
        panic!("expected CycleState");
    };
    assert!(state.is_running);
    assert_eq!(state.run_id, Some(run_id));

    // The start is refused while the first run is active.
    let reply = harness
        .service
        .handle(Op::StartCycle {
            story: story("2-2"),
        })
        .await;
    assert_eq!(
        reply,
        OpReply::Rejected {
            reason: "A cycle is already running".to_string()
        }
    );

    assert_eq!(harness.service.handle(Op::CancelCycle).await, OpReply::Ack);
    assert_eq!(
        harness.service.handle(Op::CancelCycle).await,
        OpReply::Rejected {
            reason: "No cycle is running".to_string()
        }
    );
}

#[test]
fn test_resolve_story_falls_back_to_stories_dir() {
    let harness = Harness::new(fast_settings());
    let story = harness.service.resolve_story("3-4-search");
    assert_eq!(story.id, "3-4-search");
    assert_eq!(
        story.file_path,
        "/tmp/story-cycle-project/docs/stories/3-4-search.md"
    );
}

#[tokio::test]
async fn test_set_minimized_and_epic_ops() {
    let harness = Harness::new(fast_settings());

    assert_eq!(
        harness
            .service
            .handle(Op::SetMinimized { minimized: true })
            .await,
        OpReply::Ack
    );
    assert!(harness.service.cycle().snapshot().minimized);

    let reply = harness
        .service
        .handle(Op::StartEpic {
            epic_id: "epic-2".to_string(),
            stories: vec![story("2-1")],
        })
        .await;
    assert_eq!(reply, OpReply::Ack);

    let mut epic = harness.service.epic().subscribe();
    let done = tokio::time::timeout(Duration::from_secs(5), async {
        epic.wait_for(|s| s.phase == EpicPhase::Complete).await.is_ok()
    })
    .await;
    assert!(matches!(done, Ok(true)));

    let OpReply::EpicState { state } = harness.service.handle(Op::GetEpicState).await else {
        panic!("expected EpicState");
    };
    assert_eq!(state.epic_id.as_deref(), Some("epic-2"));
    // Minimizing survives a new run.
    assert!(harness.service.cycle().snapshot().minimized);

    assert_eq!(
        harness.service.handle(Op::RetryEpic).await,
        OpReply::Rejected {
            reason: "Nothing to retry".to_string()
        }
    );
    assert_eq!(harness.service.handle(Op::ResetEpic).await, OpReply::Ack);
}
