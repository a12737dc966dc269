//! Pipeline step models.
//!
//! A story is carried through a fixed, ordered list of [`Step`]s. Each step is
//! either a git operation, an agent invocation, or a story status update. The
//! list is produced by the plan builder in `sc-core` and never changes once
//! built, so a resumed run can index into it safely.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// The project flavour a plan is built for.
///
/// Profiles only differ in which agent identifiers and command templates
/// they use; the shape of the pipeline is the same for both.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default, TS)]
#[serde(rename_all = "kebab-case")]
pub enum ProjectProfile {
    /// General software projects.
    #[default]
    Method,

    /// Game development projects.
    GameDev,
}

impl ProjectProfile {
    /// Stable identifier used in config files and on the command line.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Method => "method",
            Self::GameDev => "game-dev",
        }
    }
}

impl std::str::FromStr for ProjectProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "method" => Ok(Self::Method),
            "game-dev" => Ok(Self::GameDev),
            other => Err(format!("unknown project profile '{other}'")),
        }
    }
}

/// The git operation a git step performs.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, TS)]
#[serde(rename_all = "kebab-case")]
pub enum GitAction {
    /// Create (or check out) the story branch.
    CreateBranch,
    /// Stage everything and commit.
    Commit,
    /// Merge the story branch back into its target branch.
    Merge,
}

/// Type-specific payload of a [`Step`].
///
/// Serialized with a `type` tag so the front end can switch on
/// `"git" | "agent" | "status"`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum StepKind {
    /// A git operation delegated to the git step executor.
    Git {
        #[serde(rename = "gitAction")]
        action: GitAction,

        /// Commit message template for commit steps.
        ///
        /// May contain `{story_id}`, `{story_file}` and `{round}` placeholders.
        #[serde(default, rename = "commitMessage")]
        commit_message: Option<String>,
    },

    /// An agent invocation.
    Agent {
        #[serde(rename = "agentId")]
        agent_id: String,

        /// Command template sent to the agent once it is loaded.
        command: String,
    },

    /// A story status update.
    Status {
        #[serde(rename = "newStatus")]
        new_status: String,
    },
}

/// One pipeline unit.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
pub struct Step {
    /// Stable identifier, e.g. `commit-review-2`.
    pub id: String,

    /// Display name.
    pub name: String,

    pub kind: StepKind,
}

impl Step {
    /// Agent identifier for agent steps, `None` otherwise.
    pub fn agent_id(&self) -> Option<&str> {
        match &self.kind {
            StepKind::Agent { agent_id, .. } => Some(agent_id),
            _ => None,
        }
    }

    /// Short type label used in logs.
    pub fn type_label(&self) -> &'static str {
        match self.kind {
            StepKind::Git { .. } => "git",
            StepKind::Agent { .. } => "agent",
            StepKind::Status { .. } => "status",
        }
    }
}

/// Per-step status, stored parallel to the step list.
///
/// A step only moves `Pending -> Running -> {Completed | Skipped | Error}`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default, TS)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Skipped,
    Error,
}

impl StepStatus {
    /// Whether a retry can leave this step untouched.
    pub fn is_done(self) -> bool {
        matches!(self, Self::Completed | Self::Skipped)
    }
}

/// The story a cycle runs for.
///
/// The id doubles as the git branch name.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
#[serde(rename_all = "camelCase")]
pub struct StoryRef {
    pub id: String,

    /// Path of the story markdown file, relative to the project root or absolute.
    pub file_path: String,
}

impl StoryRef {
    pub fn new(id: impl Into<String>, file_path: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            file_path: file_path.into(),
        }
    }
}
