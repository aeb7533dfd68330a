//! Shared domain types and error taxonomy for the Orbit task orchestration
//! core.
//!
//! Every other `orbit-*` crate depends on this one for [`model`] types and
//! the unified [`OrbitError`] taxonomy, so that the Store, State Machine,
//! Dispatcher, and gateway all speak about the same `Task`, `Skill`, and
//! `FeedbackEntry` without re-deriving them at each seam.

/// The stateless source-vs-prepared consistency checker (§6 checker hook).
pub mod checker;
/// Unified error taxonomy (see the error-handling design's seven kinds).
pub mod error;
/// Core data model: tasks, artifacts, escalations, profile log, skills,
/// embedded chunks, circuit state, progress, feedback.
pub mod model;

pub use checker::check_consistency;
pub use error::{OrbitError, OrbitResult};
pub use model::*;
