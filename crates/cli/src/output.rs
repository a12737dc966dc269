//! Colored terminal rendering of engine events and plans.

use colored::Colorize;
use sc_protocol::{Event, GitAction, Step, StepKind, StepStatus};

/// One line for `event`, or `None` for events that only matter to a UI.
pub fn render_event(event: &Event) -> Option<String> {
    let line = match event {
        Event::CycleStarted {
            story_id,
            start_step,
            total_steps,
            ..
        } => {
            if *start_step == 0 {
                format!("{} story {story_id} ({total_steps} steps)", "▶".cyan().bold())
            } else {
                format!(
                    "{} story {story_id} from step {}/{total_steps}",
                    "↻".cyan().bold(),
                    start_step + 1
                )
            }
        }
        Event::CycleLog { line, .. } => format!("  {}", line.dimmed()),
        Event::AutoReplySent {
            agent_id,
            reply,
            label,
            ..
        } => format!(
            "  {} {agent_id} <- \"{reply}\" ({label})",
            "↪".yellow()
        ),
        Event::CycleCompleted { story_id, .. } => {
            format!("{} story {story_id} completed", "✓".green().bold())
        }
        Event::CycleFailed {
            story_id,
            step_index,
            error,
            ..
        } => format!(
            "{} story {story_id} failed at step {}: {error}",
            "✗".red().bold(),
            step_index + 1
        ),
        Event::CycleCancelled { story_id, .. } => {
            format!("{} story {story_id} cancelled", "■".yellow().bold())
        }
        Event::EpicStarted { epic_id, stories } => {
            format!("{} epic {epic_id}: {stories} stories", "═".blue().bold())
        }
        Event::EpicStoryStarted {
            index, story_id, ..
        } => format!("{} [{}] {story_id}", "═".blue(), index + 1),
        Event::EpicCompleted { epic_id } => {
            format!("{} epic {epic_id} completed", "✓".green().bold())
        }
        Event::EpicHalted {
            epic_id,
            index,
            error,
        } => format!(
            "{} epic {epic_id} halted at story {}: {error}",
            "✗".red().bold(),
            index + 1
        ),
        Event::StepStatusChanged { .. } => return None,
    };
    Some(line)
}

/// Plan listing: one numbered line per step.
pub fn render_plan(steps: &[Step]) -> Vec<String> {
    steps
        .iter()
        .enumerate()
        .map(|(i, step)| {
            let detail = match &step.kind {
                StepKind::Agent { agent_id, command } => format!("{agent_id}: {command}"),
                StepKind::Git {
                    action,
                    commit_message,
                } => match commit_message {
                    Some(message) => format!("{}: {message}", git_label(*action)),
                    None => git_label(*action).to_string(),
                },
                StepKind::Status { new_status } => format!("status -> {new_status}"),
            };
            format!(
                "{:>2}. {:<24} {:<6} {}",
                i + 1,
                step.id.bold(),
                step.type_label(),
                detail.dimmed()
            )
        })
        .collect()
}

fn git_label(action: GitAction) -> &'static str {
    match action {
        GitAction::CreateBranch => "create-branch",
        GitAction::Commit => "commit",
        GitAction::Merge => "merge",
    }
}

/// Single-character marker for a step status.
pub fn status_marker(status: StepStatus) -> String {
    match status {
        StepStatus::Pending => "·".dimmed().to_string(),
        StepStatus::Running => "…".cyan().to_string(),
        StepStatus::Completed => "✓".green().to_string(),
        StepStatus::Skipped => "-".yellow().to_string(),
        StepStatus::Error => "✗".red().to_string(),
    }
}
