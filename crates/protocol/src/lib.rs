//! # sc-protocol
//!
//! Shared protocol definitions and data models for story-cycle.
//!
//! This crate defines all shared data structures used for:
//! - Pipeline steps and their statuses
//! - Single-cycle and epic-queue runtime state
//! - Collaborator requests, results and channel events
//! - Engine settings from config.toml
//! - Operations and events between a front end and the engine
//!
//! ## Modules
//!
//! - [`step_models`]: Steps, step kinds, statuses, profiles, story references
//! - [`cycle_models`]: Run ids and observable orchestrator state
//! - [`channel_models`]: Agent channel, git and status collaborator shapes
//! - [`config_models`]: Engine settings
//! - [`ipc`]: Operations and Events
//!
//! ## Design Principles
//!
//! - Minimal dependencies: serde, ts-rs, chrono and uuid
//! - TypeScript generation: all types derive `TS` for the desktop front end
//! - Independent compilation: no dependencies on other story-cycle crates

pub mod channel_models;
pub mod config_models;
pub mod cycle_models;
pub mod ipc;
pub mod step_models;

// Re-export all public types for convenience
pub use channel_models::*;
pub use config_models::*;
pub use cycle_models::*;
pub use ipc::*;
pub use step_models::*;
