//! Assertion helpers over engine events.

use sc_protocol::{Event, StepStatus};

/// Whether `events` contain a CycleCompleted event.
#[allow(dead_code)]
pub fn has_cycle_completed(events: &[Event]) -> bool {
    events.iter().any(|e| matches!(e, Event::CycleCompleted { .. }))
}

/// Step indices moved to `status`, in event order.
#[allow(dead_code)]
pub fn steps_with_status(events: &[Event], status: StepStatus) -> Vec<usize> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::StepStatusChanged {
                step_index,
                status: s,
                ..
            } if *s == status => Some(*step_index),
            _ => None,
        })
        .collect()
}

/// Replies sent automatically, in order.
#[allow(dead_code)]
pub fn auto_replies(events: &[Event]) -> Vec<(String, String)> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::AutoReplySent { reply, label, .. } => Some((reply.clone(), label.clone())),
            _ => None,
        })
        .collect()
}

/// Whether the event ends a single-cycle run.
#[allow(dead_code)]
pub fn is_run_end(event: &Event) -> bool {
    matches!(
        event,
        Event::CycleCompleted { .. } | Event::CycleFailed { .. } | Event::CycleCancelled { .. }
    )
}
