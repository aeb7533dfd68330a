//! Handler contract: `task_type → handler`. A handler performs the
//! out-of-scope domain work (vision extraction, tax calculation), may
//! publish progress and persist artifacts, but MUST NOT mutate
//! `Task.status` directly — it returns a [`HandlerOutcome`] and the
//! Dispatcher drives the State Machine.

use crate::context::AgentContext;
use async_trait::async_trait;
use orbit_core::{OrbitResult, Task};
use orbit_progress::ProgressBus;
use orbit_store::ArtifactStore;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// What a handler invocation decided, translated by the Dispatcher into
/// exactly one State Machine transition.
#[derive(Debug, Clone)]
pub enum HandlerOutcome {
    /// The task's domain work finished successfully.
    Completed,
    /// The task failed; `reason` becomes `Task.metadata["reason"]`.
    Failed {
        /// Stable reason string (§7).
        reason: String,
    },
    /// The task needs human attention; an [`orbit_core::Escalation`] row is
    /// created before the transition.
    Escalated {
        /// Human-readable reason.
        reason: String,
        /// Opaque context payload for reviewers.
        context: serde_json::Value,
        /// Whether this escalation blocks the task (keeps it in `escalated`).
        blocking: bool,
    },
}

/// Shared resources handed to every handler invocation — the suspension
/// points a handler is allowed to use, and nothing else (it never touches
/// the State Machine or `TaskStore::compare_and_swap` directly).
pub struct HandlerEnv {
    /// Publishes ordered progress events for the running task.
    pub progress: Arc<ProgressBus>,
    /// Persists task artifacts (worksheets, notes, check reports).
    pub artifacts: Arc<dyn ArtifactStore>,
    /// Cooperative cancellation signal (§5 "Cancellation").
    pub cancel: CancellationToken,
}

/// A registered handler for one `task_type`.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// The `task_type` this handler is registered under.
    fn task_type(&self) -> &str;

    /// The agent name recorded on `assign` (§4.2 step 2).
    fn agent_name(&self) -> &str;

    /// Perform the task's domain work. MUST NOT mutate `task.status`.
    async fn handle(&self, task: &Task, context: &AgentContext, env: &HandlerEnv) -> OrbitResult<HandlerOutcome>;
}
