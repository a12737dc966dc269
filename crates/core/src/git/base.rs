//! Git collaborator contract.

use async_trait::async_trait;
use sc_protocol::{CreateBranchResult, MergeResult, OpResult};

/// Git operations the pipeline needs, scoped to a project directory.
///
/// Failures are reported inside the result records so the step executor can
/// tell "already exists", "nothing to commit" and merge conflicts apart from
/// other failures.
#[async_trait]
pub trait GitCollaborator: Send + Sync {
    async fn branch_exists(&self, project_path: &str, branch: &str) -> bool;

    /// Create and check out `branch`, from `from_branch` or the current branch.
    async fn create_branch(
        &self,
        project_path: &str,
        branch: &str,
        from_branch: Option<&str>,
    ) -> CreateBranchResult;

    async fn checkout_branch(&self, project_path: &str, branch: &str) -> OpResult;

    /// Stage everything and commit. `force_add` also stages ignored files.
    async fn commit(&self, project_path: &str, message: &str, force_add: bool) -> OpResult;

    async fn has_changes(&self, project_path: &str) -> bool;

    /// Merge `branch` into the current branch.
    async fn merge_branch(&self, project_path: &str, branch: &str) -> MergeResult;

    async fn is_branch_merged(&self, project_path: &str, branch: &str, target: &str) -> bool;
}
