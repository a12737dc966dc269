//! # sc-core
//!
//! Cycle orchestration engine for story-cycle.
//!
//! This crate provides:
//! - The step plan every story goes through
//! - Classification of streamed agent output
//! - Git step execution on top of a git collaborator
//! - The single-story and epic queue orchestrators
//! - Configuration loading from the `.story-cycle/` directory
//! - Concrete collaborators backed by the `claude` and `git` CLIs
//!
//! ## Modules
//!
//! - [`plan`]: Step plan builder and template rendering
//! - [`classifier`]: Output classifier and text decoding
//! - [`agents`]: Agent channel trait, Claude CLI adapter, conversation log
//! - [`git`]: Git collaborator trait, `git` CLI adapter, git step executor
//! - [`story`]: Story status collaborator and story file lookup
//! - [`engine`]: Orchestrators and the error taxonomy
//! - [`state`]: Observable state stores and the `CycleService`
//! - [`config`]: Configuration loading and management

pub mod agents;
pub mod classifier;
pub mod config;
pub mod engine;
pub mod git;
pub mod plan;
pub mod state;
pub mod story;
