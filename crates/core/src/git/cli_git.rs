//! [`GitCollaborator`] over the `git` executable.

use crate::git::base::GitCollaborator;
use async_trait::async_trait;
use sc_protocol::{CreateBranchResult, MergeResult, OpResult};
use std::path::PathBuf;
use tokio::process::Command;
use tracing::{debug, instrument};

/// Captured result of one `git` invocation.
#[derive(Debug)]
struct GitOutput {
    success: bool,
    stdout: String,
    stderr: String,
}

impl GitOutput {
    /// Both streams, for matching tool messages that git prints to either.
    fn combined(&self) -> String {
        format!("{}\n{}", self.stdout.trim(), self.stderr.trim())
            .trim()
            .to_string()
    }
}

/// Runs `git` subprocesses in the project directory.
#[derive(Debug, Clone)]
pub struct CliGit {
    binary: PathBuf,
    /// Paths force-added on `force_add` commits, relative to the project root.
    force_paths: Vec<String>,
}

impl Default for CliGit {
    fn default() -> Self {
        Self::new()
    }
}

impl CliGit {
    pub fn new() -> Self {
        Self {
            binary: PathBuf::from("git"),
            force_paths: Vec::new(),
        }
    }

    /// Paths (typically the stories directory) staged even when ignored.
    pub fn with_force_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.force_paths = paths.into_iter().map(Into::into).collect();
        self
    }

    async fn run(&self, project_path: &str, args: &[&str]) -> GitOutput {
        debug!(?args, "git");
        match Command::new(&self.binary)
            .args(args)
            .current_dir(project_path)
            .output()
            .await
        {
            Ok(out) => GitOutput {
                success: out.status.success(),
                stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
            },
            Err(e) => GitOutput {
                success: false,
                stdout: String::new(),
                stderr: format!("failed to run git: {e}"),
            },
        }
    }

    async fn run_op(&self, project_path: &str, args: &[&str]) -> OpResult {
        let out = self.run(project_path, args).await;
        if out.success {
            OpResult::ok()
        } else {
            OpResult::failed(out.combined())
        }
    }
}

#[async_trait]
impl GitCollaborator for CliGit {
    async fn branch_exists(&self, project_path: &str, branch: &str) -> bool {
        let reference = format!("refs/heads/{branch}");
        self.run(project_path, &["show-ref", "--verify", "--quiet", &reference])
            .await
            .success
    }

    #[instrument(skip(self))]
    async fn create_branch(
        &self,
        project_path: &str,
        branch: &str,
        from_branch: Option<&str>,
    ) -> CreateBranchResult {
        let mut args = vec!["checkout", "-b", branch];
        if let Some(from) = from_branch {
            args.push(from);
        }

        let out = self.run(project_path, &args).await;
        if out.success {
            return CreateBranchResult {
                success: true,
                already_exists: false,
                error: None,
            };
        }

        let message = out.combined();
        CreateBranchResult {
            success: false,
            already_exists: message.contains("already exists"),
            error: Some(message),
        }
    }

    async fn checkout_branch(&self, project_path: &str, branch: &str) -> OpResult {
        self.run_op(project_path, &["checkout", branch]).await
    }

    #[instrument(skip(self))]
    async fn commit(&self, project_path: &str, message: &str, force_add: bool) -> OpResult {
        let staged = self.run_op(project_path, &["add", "-A"]).await;
        if !staged.success {
            return staged;
        }

        if force_add {
            for path in &self.force_paths {
                // Missing paths are fine; there is just nothing to force.
                let _ = self.run(project_path, &["add", "-f", "--", path]).await;
            }
        }

        self.run_op(project_path, &["commit", "-m", message]).await
    }

    async fn has_changes(&self, project_path: &str) -> bool {
        let out = self.run(project_path, &["status", "--porcelain"]).await;
        out.success && !out.stdout.trim().is_empty()
    }

    #[instrument(skip(self))]
    async fn merge_branch(&self, project_path: &str, branch: &str) -> MergeResult {
        let message = format!("Merge branch '{branch}'");
        let out = self
            .run(project_path, &["merge", "--no-ff", "-m", &message, branch])
            .await;

        if out.success {
            return MergeResult {
                success: true,
                has_conflicts: false,
                error: None,
            };
        }

        let text = out.combined();
        MergeResult {
            success: false,
            has_conflicts: text.contains("CONFLICT") || text.contains("Automatic merge failed"),
            error: Some(text),
        }
    }

    async fn is_branch_merged(&self, project_path: &str, branch: &str, target: &str) -> bool {
        let out = self
            .run(
                project_path,
                &["branch", "--merged", target, "--format=%(refname:short)"],
            )
            .await;
        out.success && out.stdout.lines().any(|line| line.trim() == branch)
    }
}
