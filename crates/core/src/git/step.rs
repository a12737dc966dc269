//! Git step executor.
//!
//! Maps a git step of the plan onto collaborator calls and decides whether
//! the step completed, was skipped, or failed. Skips are never errors: a
//! disabled branch restriction, nothing to commit and an already merged
//! branch all let the run advance.

use crate::engine::error::{CycleError, CycleResult};
use crate::git::base::GitCollaborator;
use crate::plan::{is_story_file_commit, render_template};
use sc_protocol::{GitAction, GitSettings, StoryRef};
use std::sync::Arc;
use tracing::{debug, info};

const DEFAULT_COMMIT_MESSAGE: &str = "chore({story_id}): update";
const SAFETY_COMMIT_MESSAGE: &str = "chore({story_id}): save work before merge";

/// What a git step amounted to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GitStepOutcome {
    Completed,
    /// Skipped, with the reason shown in the run log.
    Skipped(String),
}

/// Inputs of one git step.
#[derive(Debug, Clone, Copy)]
pub struct GitStepContext<'a> {
    pub project_path: &'a str,
    pub story: &'a StoryRef,
    pub step_id: &'a str,
}

/// Executes git steps against a [`GitCollaborator`].
pub struct GitStepExecutor {
    git: Arc<dyn GitCollaborator>,
    settings: GitSettings,
}

impl GitStepExecutor {
    pub fn new(git: Arc<dyn GitCollaborator>, settings: GitSettings) -> Self {
        Self { git, settings }
    }

    pub async fn execute(
        &self,
        action: GitAction,
        commit_message: Option<&str>,
        ctx: GitStepContext<'_>,
    ) -> CycleResult<GitStepOutcome> {
        match action {
            GitAction::CreateBranch => self.create_branch(ctx).await,
            GitAction::Commit => {
                let template = commit_message.unwrap_or(DEFAULT_COMMIT_MESSAGE);
                let message = render_template(template, ctx.story, ctx.step_id);
                self.commit(ctx, &message, is_story_file_commit(ctx.step_id))
                    .await
            }
            GitAction::Merge => self.merge(ctx).await,
        }
    }

    async fn create_branch(&self, ctx: GitStepContext<'_>) -> CycleResult<GitStepOutcome> {
        if !self.settings.branch_restriction {
            return Ok(GitStepOutcome::Skipped(
                "branch restriction disabled".to_string(),
            ));
        }

        let branch = ctx.story.id.as_str();
        let parent = self.settings.branch_parent();
        let created = self
            .git
            .create_branch(ctx.project_path, branch, parent)
            .await;

        if created.success {
            info!(branch, parent = parent.unwrap_or("<current>"), "Created story branch");
            return Ok(GitStepOutcome::Completed);
        }

        if created.already_exists {
            debug!(branch, "Story branch exists, checking it out");
            let checkout = self.git.checkout_branch(ctx.project_path, branch).await;
            return if checkout.success {
                Ok(GitStepOutcome::Completed)
            } else {
                Err(CycleError::GitFailed(format!(
                    "checkout {branch}: {}",
                    checkout.error_text()
                )))
            };
        }

        Err(CycleError::GitFailed(format!(
            "create branch {branch}: {}",
            created.error.unwrap_or_default()
        )))
    }

    async fn commit(
        &self,
        ctx: GitStepContext<'_>,
        message: &str,
        force_add: bool,
    ) -> CycleResult<GitStepOutcome> {
        // Forced commits may only touch ignored files, which `has_changes` misses.
        if !force_add && !self.git.has_changes(ctx.project_path).await {
            return Ok(GitStepOutcome::Skipped("nothing to commit".to_string()));
        }

        let result = self.git.commit(ctx.project_path, message, force_add).await;
        if result.success {
            info!(message, "Committed");
            Ok(GitStepOutcome::Completed)
        } else if is_nothing_to_commit(result.error_text()) {
            Ok(GitStepOutcome::Skipped("nothing to commit".to_string()))
        } else {
            Err(CycleError::GitFailed(format!(
                "commit: {}",
                result.error_text()
            )))
        }
    }

    async fn merge(&self, ctx: GitStepContext<'_>) -> CycleResult<GitStepOutcome> {
        if !self.settings.branch_restriction {
            return Ok(GitStepOutcome::Skipped(
                "branch restriction disabled".to_string(),
            ));
        }

        let branch = ctx.story.id.as_str();
        let target = self.settings.merge_target();

        if self
            .git
            .is_branch_merged(ctx.project_path, branch, target)
            .await
        {
            return Ok(GitStepOutcome::Skipped(format!(
                "{branch} already merged into {target}"
            )));
        }

        if self.git.has_changes(ctx.project_path).await {
            let message = render_template(SAFETY_COMMIT_MESSAGE, ctx.story, ctx.step_id);
            let safety = self.git.commit(ctx.project_path, &message, false).await;
            if !safety.success && !is_nothing_to_commit(safety.error_text()) {
                return Err(CycleError::GitFailed(format!(
                    "safety commit before merge: {}",
                    safety.error_text()
                )));
            }
        }

        let checkout = self.git.checkout_branch(ctx.project_path, target).await;
        if !checkout.success {
            return Err(CycleError::GitFailed(format!(
                "checkout {target}: {}",
                checkout.error_text()
            )));
        }

        let merged = self.git.merge_branch(ctx.project_path, branch).await;
        if merged.success {
            info!(branch, target, "Merged story branch");
            return Ok(GitStepOutcome::Completed);
        }

        let message = merged.error.unwrap_or_default();
        if merged.has_conflicts {
            Err(CycleError::MergeConflict {
                branch: branch.to_string(),
                target: target.to_string(),
                message,
            })
        } else {
            Err(CycleError::GitFailed(format!("merge {branch}: {message}")))
        }
    }
}

fn is_nothing_to_commit(error: &str) -> bool {
    error.to_ascii_lowercase().contains("nothing to commit")
}
