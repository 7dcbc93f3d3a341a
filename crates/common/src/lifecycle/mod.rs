//! Achievement lifecycle
//!
//! - `status`: the workflow state machine
//! - `policy`: who may do what
//! - `model`: records and request shapes
//! - `engine`: operations coordinating the reference and content stores

mod engine;
mod model;
pub mod policy;
mod status;

#[cfg(test)]
mod tests;

pub use engine::AchievementEngine;
pub use model::*;
pub use policy::{Operation, Relationship};
pub use status::{AchievementStatus, AchievementType, StateColumns, Transition, WorkflowState};
