//! Engine settings models for `.story-cycle/config.toml`.
//!
//! Every field has a default so a project without a config file, or with a
//! partial one, still gets a working engine.

use serde::Deserialize;
use serde::Serialize;
use ts_rs::TS;

use crate::step_models::ProjectProfile;

/// Represents the engine settings from `.story-cycle/config.toml`.
///
/// # Example
///
/// ```toml
/// # .story-cycle/config.toml
/// profile = "method"
/// review-rounds = 2
///
/// [git]
/// branch-restriction = true
/// base-branch = "main"
///
/// [timing]
/// story-settle-ms = 500
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
#[serde(rename_all = "kebab-case", default)]
pub struct CycleSettings {
    /// Which agent identifiers and command templates plans use.
    pub profile: ProjectProfile,

    /// Number of code-review rounds appended after implementation.
    pub review_rounds: u32,

    /// Directory (relative to the project root) holding story markdown files.
    pub stories_dir: String,

    pub git: GitSettings,

    pub timing: TimingSettings,

    pub agents: AgentSettings,
}

impl Default for CycleSettings {
    fn default() -> Self {
        Self {
            profile: ProjectProfile::default(),
            review_rounds: 1,
            stories_dir: "docs/stories".to_string(),
            git: GitSettings::default(),
            timing: TimingSettings::default(),
            agents: AgentSettings::default(),
        }
    }
}

/// Branch handling for git steps.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
#[serde(rename_all = "kebab-case", default)]
pub struct GitSettings {
    /// When disabled, branch creation and merging are skipped and all work
    /// lands on the current branch.
    pub branch_restriction: bool,

    /// Branch story branches are created from and merged into.
    pub base_branch: String,

    /// Epic-branch mode: story branches inherit the current (epic) branch and
    /// merge back into it instead of the base branch.
    pub epic_branch: Option<String>,
}

impl Default for GitSettings {
    fn default() -> Self {
        Self {
            branch_restriction: true,
            base_branch: "main".to_string(),
            epic_branch: None,
        }
    }
}

impl GitSettings {
    /// Parent branch for new story branches; `None` inherits the current branch.
    pub fn branch_parent(&self) -> Option<&str> {
        match self.epic_branch {
            Some(_) => None,
            None => Some(&self.base_branch),
        }
    }

    /// Branch story branches are merged into.
    pub fn merge_target(&self) -> &str {
        self.epic_branch.as_deref().unwrap_or(&self.base_branch)
    }
}

/// Fixed delays and thresholds of the orchestrators, in milliseconds/characters.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
#[serde(rename_all = "kebab-case", default)]
pub struct TimingSettings {
    /// Delay before sending an automatic reply.
    pub auto_reply_settle_ms: u64,

    /// Delay before starting the next story of an epic queue.
    pub story_settle_ms: u64,

    /// Extra wait before re-classifying a short reply to an automatic reply.
    pub short_output_recheck_ms: u64,

    /// Output shorter than this after an automatic reply triggers the recheck.
    pub short_output_chars: usize,

    /// Only the last this-many characters of output are classified.
    pub classifier_window_chars: usize,

    /// How long a cancel waits for the killed agent process to exit.
    pub cancel_exit_wait_ms: u64,
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            auto_reply_settle_ms: 150,
            story_settle_ms: 500,
            short_output_recheck_ms: 3000,
            short_output_chars: 200,
            classifier_window_chars: 3000,
            cancel_exit_wait_ms: 2000,
        }
    }
}

/// Limits on agent interaction sessions.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
#[serde(rename_all = "kebab-case", default)]
pub struct AgentSettings {
    /// Maximum automatic replies within one agent step.
    pub max_auto_replies: u32,

    /// Deadline for one agent step; `0` disables it.
    pub step_timeout_secs: u64,

    /// Reply sent when the agent offers numbered fixes.
    pub auto_reply: String,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_auto_replies: 5,
            step_timeout_secs: 3600,
            auto_reply: "1".to_string(),
        }
    }
}
