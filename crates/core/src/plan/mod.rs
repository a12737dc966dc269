//! Step plan builder.
//!
//! Every story goes through the same pipeline:
//!
//! 1. create-story, create-branch, commit-story, implement, commit-implementation
//! 2. per review round `i`: code-review-`i`, commit-review-`i`
//! 3. mark-done, commit-done, merge-to-base
//!
//! The plan is a pure function of the profile and the review round count,
//! which is what lets a retry index into a freshly built plan.

use sc_protocol::{GitAction, ProjectProfile, Step, StepKind, StoryRef};

/// Agent identifiers and command templates of one profile.
struct ProfileAgents {
    story_agent: &'static str,
    create_story: &'static str,
    dev_agent: &'static str,
    develop_story: &'static str,
    review_agent: &'static str,
    code_review: &'static str,
}

fn profile_agents(profile: ProjectProfile) -> ProfileAgents {
    match profile {
        ProjectProfile::Method => ProfileAgents {
            story_agent: "sm",
            create_story: "*create-story {story_id}",
            dev_agent: "dev",
            develop_story: "*develop-story {story_file}",
            review_agent: "dev",
            code_review: "*code-review {story_file}",
        },
        ProjectProfile::GameDev => ProfileAgents {
            story_agent: "game-sm",
            create_story: "*create-story {story_id}",
            dev_agent: "game-dev",
            develop_story: "*develop-story {story_file}",
            review_agent: "game-dev",
            code_review: "*code-review {story_file}",
        },
    }
}

/// Status written by the mark-done step.
pub const DONE_STATUS: &str = "done";

/// Number of steps a plan with `review_rounds` rounds has.
pub fn plan_len(review_rounds: u32) -> usize {
    8 + 2 * review_rounds as usize
}

/// Build the ordered step list for `profile` with `review_rounds` code reviews.
pub fn build_steps(profile: ProjectProfile, review_rounds: u32) -> Vec<Step> {
    let agents = profile_agents(profile);
    let mut steps = Vec::with_capacity(plan_len(review_rounds));

    steps.push(agent_step(
        "create-story",
        "Create story",
        agents.story_agent,
        agents.create_story,
    ));
    steps.push(git_step("create-branch", "Create branch", GitAction::CreateBranch, None));
    steps.push(git_step(
        "commit-story",
        "Commit story",
        GitAction::Commit,
        Some("docs(story): add story {story_id}"),
    ));
    steps.push(agent_step(
        "implement",
        "Implement",
        agents.dev_agent,
        agents.develop_story,
    ));
    steps.push(git_step(
        "commit-implementation",
        "Commit implementation",
        GitAction::Commit,
        Some("feat({story_id}): implement story"),
    ));

    for round in 1..=review_rounds {
        steps.push(Step {
            id: format!("code-review-{round}"),
            name: format!("Code review {round}"),
            kind: StepKind::Agent {
                agent_id: agents.review_agent.to_string(),
                command: agents.code_review.to_string(),
            },
        });
        steps.push(Step {
            id: format!("commit-review-{round}"),
            name: format!("Commit review {round}"),
            kind: StepKind::Git {
                action: GitAction::Commit,
                commit_message: Some(format!("fix({{story_id}}): address code review {round}")),
            },
        });
    }

    steps.push(Step {
        id: "mark-done".to_string(),
        name: "Mark story done".to_string(),
        kind: StepKind::Status {
            new_status: DONE_STATUS.to_string(),
        },
    });
    steps.push(git_step(
        "commit-done",
        "Commit done status",
        GitAction::Commit,
        Some("chore({story_id}): mark story done"),
    ));
    steps.push(git_step("merge-to-base", "Merge to base", GitAction::Merge, None));

    steps
}

/// Whether a commit step only carries the story file, which may live in an
/// ignored directory and must be force-added.
pub fn is_story_file_commit(step_id: &str) -> bool {
    matches!(step_id, "commit-story" | "commit-done")
}

/// Render `{story_id}`, `{story_file}` and `{round}` placeholders.
///
/// `{round}` is taken from a trailing `-<n>` of the step id and left as is
/// when the step has none.
pub fn render_template(template: &str, story: &StoryRef, step_id: &str) -> String {
    let mut rendered = template
        .replace("{story_id}", &story.id)
        .replace("{story_file}", &story.file_path);

    if let Some(round) = step_id
        .rsplit_once('-')
        .map(|(_, tail)| tail)
        .filter(|tail| !tail.is_empty() && tail.chars().all(|c| c.is_ascii_digit()))
    {
        rendered = rendered.replace("{round}", round);
    }

    rendered
}

fn agent_step(id: &str, name: &str, agent_id: &str, command: &str) -> Step {
    Step {
        id: id.to_string(),
        name: name.to_string(),
        kind: StepKind::Agent {
            agent_id: agent_id.to_string(),
            command: command.to_string(),
        },
    }
}

fn git_step(id: &str, name: &str, action: GitAction, commit_message: Option<&str>) -> Step {
    Step {
        id: id.to_string(),
        name: name.to_string(),
        kind: StepKind::Git {
            action,
            commit_message: commit_message.map(str::to_string),
        },
    }
}
