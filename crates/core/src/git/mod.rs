//! Git collaborator contract, its `git` CLI implementation and the git step
//! executor.

pub mod base;
pub mod cli_git;
pub mod step;

pub use base::GitCollaborator;
pub use cli_git::CliGit;
pub use step::{GitStepContext, GitStepExecutor, GitStepOutcome};
