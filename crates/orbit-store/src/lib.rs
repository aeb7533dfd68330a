//! The Store (C1): durable record of tasks, artifacts, escalations, the
//! client profile log, skills, and feedback, with strong read-after-write
//! within a process.
//!
//! Each entity gets its own trait + file-backed implementation, mirroring
//! how session and memory storage are split in the rest of this workspace.
//! Relational joins across entities (e.g. "prior-year completed worksheet
//! for this client") are the caller's job — the Store only guarantees each
//! entity's own durability and, for `Task`, the compare-and-swap primitive
//! the State Machine needs.

/// Dispatcher decision log (`agent_logs`).
pub mod agent_log;
/// Task artifact storage.
pub mod artifact;
/// Client document metadata storage.
pub mod document;
/// Escalation storage.
pub mod escalation;
/// Reviewer feedback storage.
pub mod feedback;
/// Append-only client profile log and its derived view.
pub mod profile;
/// Skill record storage.
pub mod skill_store;
/// Task storage and the compare-and-swap primitive.
pub mod task;

pub use agent_log::{AgentLog, AgentLogEntry};
pub use artifact::{ArtifactStore, FileArtifactStore};
pub use document::{DocumentStore, FileDocumentStore};
pub use escalation::{EscalationStore, FileEscalationStore};
pub use feedback::{FeedbackStore, FileFeedbackStore};
pub use profile::{FileProfileLogStore, ProfileLogStore, ProfileService};
pub use skill_store::{FileSkillStore, SkillStore};
pub use task::{FileTaskStore, TaskFilter, TaskStore};
