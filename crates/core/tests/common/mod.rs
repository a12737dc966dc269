//! Common test utilities for orchestration tests.
//!
//! This module provides shared functionality across the integration tests:
//! - Scripted agent channel
//! - In-memory git and story status collaborators
//! - Fixtures (fast settings, a wired service)
//! - Event assertions

pub mod assertions;
pub mod fixtures;
pub mod mock_agents;
pub mod mock_git;

#[allow(unused_imports)]
pub use assertions::*;
pub use fixtures::*;
#[allow(unused_imports)]
pub use mock_agents::*;
#[allow(unused_imports)]
pub use mock_git::*;
