//! Request/response shapes for the §6 external interfaces. Kept separate
//! from [`orbit_core::model`] because the wire shape (what a caller sends)
//! is allowed to diverge from the persisted shape (what the State Machine
//! guards) — e.g. `PATCH /tasks/{id}/status` accepts a bare status name
//! plus the handful of fields each transition actually needs.

use orbit_core::{FeedbackEntry, TaskStatus};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// `POST /tasks` body.
#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    /// Owning client.
    pub client_id: Uuid,
    /// Registered handler key.
    pub task_type: String,
    /// Tax year this task concerns, if any.
    #[serde(default)]
    pub tax_year: Option<i32>,
    /// Opaque key-value metadata, copied verbatim onto the created task.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// `PATCH /tasks/{id}/status` body: one State Machine transition.
#[derive(Debug, Deserialize)]
pub struct UpdateTaskStatusRequest {
    /// Target status; picks which State Machine method runs.
    pub status: TaskStatus,
    /// Required when `status` is `assigned`.
    #[serde(default)]
    pub assigned_agent: Option<String>,
    /// Required when `status` is `failed` or `escalated`.
    #[serde(default)]
    pub reason: Option<String>,
    /// Opaque context payload for an `escalated` transition.
    #[serde(default)]
    pub context: Option<serde_json::Value>,
    /// Whether an `escalated` transition blocks the task. Defaults to `true`.
    #[serde(default)]
    pub blocking: Option<bool>,
}

/// `GET /tasks` query parameters, mapped onto [`orbit_store::TaskFilter`].
#[derive(Debug, Deserialize, Default)]
pub struct TaskListQuery {
    /// Restrict to this status.
    pub status: Option<TaskStatus>,
    /// Restrict to this client.
    pub client_id: Option<Uuid>,
    /// Restrict to this handler key.
    pub task_type: Option<String>,
    /// Restrict to this agent.
    pub assigned_agent: Option<String>,
    /// Maximum rows returned.
    pub limit: Option<usize>,
    /// Rows to skip before the limit is applied.
    pub offset: Option<usize>,
}

/// `GET /dashboard` response.
#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    /// Tasks not yet `completed` or `failed` (pending + assigned + in_progress).
    pub queue_depth: usize,
    /// Count of `completed` tasks.
    pub completed_count: usize,
    /// Count of `failed` tasks.
    pub failed_count: usize,
    /// Count of `escalated` tasks.
    pub escalated_count: usize,
    /// Per-agent dispatch-decision counts, busiest first.
    pub agent_activity: Vec<AgentActivity>,
    /// Escalated tasks with an unresolved blocking escalation.
    pub attention_flags: Vec<AttentionFlag>,
}

/// One agent's recent dispatch-decision count, derived from the agent log.
#[derive(Debug, Serialize)]
pub struct AgentActivity {
    /// The handler/agent name.
    pub agent_name: String,
    /// Number of log entries recorded for it.
    pub action_count: usize,
}

/// One task needing human attention: an escalated task with its reason.
#[derive(Debug, Serialize)]
pub struct AttentionFlag {
    /// The escalated task.
    pub task_id: Uuid,
    /// The blocking escalation's reason.
    pub reason: String,
    /// When the escalation was raised.
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// `POST /feedback/implicit` body.
#[derive(Debug, Deserialize)]
pub struct ImplicitFeedbackRequest {
    /// The task this feedback concerns.
    pub task_id: Uuid,
    /// The reviewer who made the correction, if known.
    #[serde(default)]
    pub reviewer_id: Option<String>,
    /// The AI-produced content before correction.
    pub original_content: String,
    /// The reviewer's corrected content.
    pub corrected_content: String,
}

/// `POST /feedback/explicit` body.
#[derive(Debug, Deserialize)]
pub struct ExplicitFeedbackRequest {
    /// The task this feedback concerns.
    pub task_id: Uuid,
    /// The reviewer who tagged the content, if known.
    #[serde(default)]
    pub reviewer_id: Option<String>,
    /// The content being tagged.
    pub original_content: String,
    /// Closed-vocabulary tags; must be non-empty and drawn from
    /// [`orbit_feedback::TAG_VOCABULARY`].
    pub tags: Vec<String>,
    /// Optional free-text note.
    #[serde(default)]
    pub note: Option<String>,
}

/// `POST /tasks/{id}/check` body.
#[derive(Debug, Deserialize)]
pub struct CheckerRequest {
    /// Values read off source documents.
    pub source_values: HashMap<String, serde_json::Value>,
    /// Values in the prepared return.
    pub prepared_values: HashMap<String, serde_json::Value>,
    /// Prior-year values, attached to discrepancies for reviewer context.
    #[serde(default)]
    pub prior_year_values: Option<HashMap<String, serde_json::Value>>,
    /// Field names with a preparer-documented reason for differing.
    #[serde(default)]
    pub documented_reasons: HashMap<String, String>,
    /// Fields a test harness deliberately corrupted, to check recall.
    #[serde(default)]
    pub injected_error_fields: Vec<String>,
}

/// A uniform JSON error body for every non-2xx response the gateway sends.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Stable taxonomy tag, see [`orbit_core::OrbitError::reason`].
    pub reason: &'static str,
    /// Human-readable detail.
    pub message: String,
}

/// Common response wrapper for a list of feedback entries.
#[derive(Debug, Serialize)]
pub struct FeedbackListResponse {
    /// The matching entries, oldest first.
    pub entries: Vec<FeedbackEntry>,
}
