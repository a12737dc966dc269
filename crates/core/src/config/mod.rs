//! Configuration loading and management.
//!
//! This module loads the engine settings from the `.story-cycle/` directory
//! of a project.

pub mod error;
pub mod loader;
pub mod models;

pub use error::{ConfigError, ConfigResult};
pub use loader::load_config;
pub use models::ProjectConfig;
