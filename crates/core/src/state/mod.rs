//! Observable orchestrator state and the operation dispatcher.
//!
//! This module provides:
//! - `CycleStore` and `EpicStore`, the run-scoped owners of the state records
//! - `CycleService`, which wires the orchestrators to concrete collaborators
//!   and answers `Op`s

pub mod cycle;
pub mod epic;
pub mod manager;

pub use cycle::CycleStore;
pub use epic::EpicStore;
pub use manager::CycleService;
