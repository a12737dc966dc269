//! Cycle orchestration engine.
//!
//! - [`SingleCycleOrchestrator`] runs the step plan of one story.
//! - [`EpicQueueOrchestrator`] runs a queue of stories through it, one at a
//!   time.
//!
//! Both talk to the outside world only through the collaborators bundled in
//! [`CycleDeps`].

pub mod cycle;
pub mod epic;
pub mod error;
mod session;

pub use cycle::{RunHandle, RunOutcome, SingleCycleOrchestrator};
pub use epic::EpicQueueOrchestrator;
pub use error::{CycleError, CycleResult};

use crate::agents::{AgentChannel, ConversationLog};
use crate::classifier::OutputClassifier;
use crate::git::GitCollaborator;
use crate::story::StoryStatusUpdater;
use std::sync::Arc;

/// External collaborators of the orchestrators.
#[derive(Clone)]
pub struct CycleDeps {
    pub channel: Arc<dyn AgentChannel>,
    pub git: Arc<dyn GitCollaborator>,
    pub status: Arc<dyn StoryStatusUpdater>,
    pub conversation: Arc<dyn ConversationLog>,
    pub classifier: Arc<dyn OutputClassifier>,
}
