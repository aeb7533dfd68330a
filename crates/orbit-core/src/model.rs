use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Per-task lifecycle state, driven exclusively by the State Machine.
///
/// `Completed` and `Escalated` are terminal: no further transition is
/// accepted out of them. `Failed` is not terminal — `retry` returns it to
/// `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Created, not yet leased by a dispatcher.
    Pending,
    /// Leased and bound to an agent, not yet started.
    Assigned,
    /// Handler is actively executing.
    InProgress,
    /// Finished successfully.
    Completed,
    /// Finished unsuccessfully; eligible for `retry`.
    Failed,
    /// Blocked on an unresolved blocking escalation.
    Escalated,
}

impl TaskStatus {
    /// Terminal states reject every further transition.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Escalated)
    }
}

/// One externally-assigned unit of work with a finite lifecycle.
///
/// Identity (`id`, `client_id`, `task_type`, `tax_year`) is immutable after
/// creation. Every other field is mutated only by the State Machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Stable identity.
    pub id: Uuid,
    /// Owning client.
    pub client_id: Uuid,
    /// Registered handler key (`task_type → handler` in the Dispatcher).
    pub task_type: String,
    /// Tax year this task concerns, if any.
    pub tax_year: Option<i32>,
    /// Current lifecycle state.
    pub status: TaskStatus,
    /// Agent bound to this task. Non-null iff `status != Pending`.
    pub assigned_agent: Option<String>,
    /// Number of times this task has been through `fail`.
    pub attempt_count: u32,
    /// Opaque key-value metadata (reasons, flags, handler-defined fields).
    pub metadata: HashMap<String, serde_json::Value>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Time `start` was last called.
    pub started_at: Option<DateTime<Utc>>,
    /// Time `complete` was called.
    pub completed_at: Option<DateTime<Utc>>,
    /// Last heartbeat renewal, used by the liveness supervisor.
    pub heartbeat_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Construct a new task in `Pending` with no assignment.
    pub fn new(client_id: Uuid, task_type: impl Into<String>, tax_year: Option<i32>) -> Self {
        Self {
            id: Uuid::new_v4(),
            client_id,
            task_type: task_type.into(),
            tax_year,
            status: TaskStatus::Pending,
            assigned_agent: None,
            attempt_count: 0,
            metadata: HashMap::new(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            heartbeat_at: None,
        }
    }

    /// Invariant check: `assigned_agent` is non-null iff `status` is not
    /// `Pending`.
    pub fn assignment_consistent(&self) -> bool {
        match self.status {
            TaskStatus::Pending => self.assigned_agent.is_none(),
            _ => self.assigned_agent.is_some(),
        }
    }
}

/// Kind of file produced by a task handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// A tax worksheet.
    Worksheet,
    /// Free-form preparer notes.
    Notes,
    /// A structured consistency-check report.
    CheckReport,
    /// Anything else a handler chooses to persist.
    Other,
}

/// A file produced by one attempt of a task. Owned by exactly one task.
/// Previous attempts are preserved, never overwritten.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskArtifact {
    /// Stable identity.
    pub id: Uuid,
    /// Owning task.
    pub task_id: Uuid,
    /// Artifact kind.
    pub kind: ArtifactKind,
    /// Opaque storage reference (the storage facade is out of scope).
    pub path: String,
    /// Content hash.
    pub hash: String,
    /// The attempt number that produced this artifact.
    pub attempt: u32,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// Metadata for one client document. Blob storage itself is out of scope —
/// this record is what the Context Builder resolves when it assembles
/// `documents[]`; content is fetched lazily by the handler via `storage_ref`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentMeta {
    /// Stable identity.
    pub id: Uuid,
    /// Owning client.
    pub client_id: Uuid,
    /// Tax year this document concerns.
    pub tax_year: i32,
    /// Document kind (e.g. `"w2"`, `"1099-int"`).
    pub document_type: String,
    /// Opaque storage reference (the storage facade is out of scope).
    pub storage_ref: String,
    /// Original file name, if known.
    pub file_name: Option<String>,
    /// Upload time.
    pub created_at: DateTime<Utc>,
}

/// A blocking or informational flag raised against a task, awaiting human
/// resolution. Owned by exactly one task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Escalation {
    /// Stable identity.
    pub id: Uuid,
    /// Owning task.
    pub task_id: Uuid,
    /// Human-readable reason.
    pub reason: String,
    /// Opaque context payload.
    pub context: serde_json::Value,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Resolution time, if resolved.
    pub resolved_at: Option<DateTime<Utc>>,
    /// Resolution note, if resolved.
    pub resolution: Option<String>,
    /// Whether this escalation blocks the task (keeps it in `Escalated`).
    pub blocking: bool,
}

impl Escalation {
    /// Build a new, unresolved escalation.
    pub fn new(task_id: Uuid, reason: impl Into<String>, blocking: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_id,
            reason: reason.into(),
            context: serde_json::Value::Null,
            created_at: Utc::now(),
            resolved_at: None,
            resolution: None,
            blocking,
        }
    }
}

/// Who authored a [`ClientProfileEntry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorKind {
    /// A human reviewer or preparer.
    Human,
    /// An autonomous agent handler.
    Agent,
}

/// One immutable row in a client's append-only profile log.
///
/// Never updated, never deleted. The current view of a client's profile is
/// always a *derivation* over these rows, never a stored value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientProfileEntry {
    /// Stable identity of this log row.
    pub id: Uuid,
    /// Owning client.
    pub client_id: Uuid,
    /// Creation time (used to order entries of the same `entry_type`).
    pub created_at: DateTime<Utc>,
    /// Who wrote this entry.
    pub author_kind: AuthorKind,
    /// Identity of the author (user id or agent name).
    pub author_id: String,
    /// The logical field this entry describes (e.g. `"filing_status"`).
    pub entry_type: String,
    /// The value of that field as of `created_at`. Never null.
    pub payload: serde_json::Value,
    /// The date this entry becomes effective, if different from `created_at`.
    pub effective_date: Option<DateTime<Utc>>,
    /// Entries older than the retention window are marked archived; they are
    /// excluded from the derived view but remain in `history`.
    pub archived: bool,
}

/// A versioned, date-effective rule pack.
///
/// Two skills sharing `(name, effective_date)` are forbidden — this is an
/// [`crate::OrbitError::IntegrityViolation`], not merely a validation error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Skill {
    /// Logical name shared across versions.
    pub name: String,
    /// Semantic version string.
    pub version: String,
    /// The date from which this version applies.
    pub effective_date: DateTime<Utc>,
    /// Parsed document content.
    pub content: SkillContent,
    /// Free-form tags.
    pub tags: Vec<String>,
}

/// The `content{}` section of a skill document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillContent {
    /// Free-text instructions for the agent.
    pub instructions: String,
    /// Worked examples.
    #[serde(default)]
    pub examples: Vec<String>,
    /// Hard constraints the agent must respect.
    #[serde(default)]
    pub constraints: Vec<String>,
    /// Conditions that should cause the handler to escalate.
    #[serde(default)]
    pub escalation_triggers: Vec<String>,
}

/// A chunk of embedded text belonging to either a skill or a client
/// document, indexed for hybrid search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddedChunk {
    /// The skill name or document id this chunk belongs to.
    pub owner_id: String,
    /// Position of this chunk within its owner, used as a deterministic
    /// tiebreak key.
    pub chunk_index: u32,
    /// The chunk's raw text (also the lexical-search target).
    pub chunk_text: String,
    /// Dense embedding vector, always `D` dimensions for a given index.
    pub embedding: Vec<f32>,
}

/// Circuit state, shared across workers via the KV/Coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    /// Calls pass through normally.
    Closed,
    /// Calls fail fast without attempting the operation.
    Open,
    /// A single trial window is open to probe recovery.
    HalfOpen,
}

/// Current state for one named circuit breaker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitState {
    /// Breaker name (process-wide uniqueness only, no semantics assumed).
    pub name: String,
    /// Current state.
    pub state: BreakerState,
    /// Consecutive failures recorded while `Closed`.
    pub failure_count: u32,
    /// Consecutive successes recorded while `HalfOpen`.
    pub success_count_in_half_open: u32,
    /// When the breaker most recently transitioned into `Open`.
    pub opened_at: Option<DateTime<Utc>>,
}

/// Per-task progress, the single source of truth for "current progress".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    /// Percent complete, `0..=100`, non-decreasing within one attempt.
    pub percent: u8,
    /// Stage name, drawn from a vocabulary the handler advertises.
    pub stage: String,
    /// Human-readable message.
    pub message: String,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
}

/// One progress update published by a handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Owning task.
    pub task_id: Uuid,
    /// Stage name.
    pub stage: String,
    /// Percent complete, `0..=100`.
    pub percent: u8,
    /// Human-readable message.
    pub message: String,
    /// Optional handler-defined extra payload.
    #[serde(default)]
    pub extra: Option<serde_json::Value>,
    /// Terminal status carried by the final event for a task, if any.
    #[serde(default)]
    pub status: Option<TaskStatus>,
    /// Publish time.
    pub updated_at: DateTime<Utc>,
}

/// One field where the source document value and the prepared return
/// value disagree, surfaced by the checker hook (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDiscrepancy {
    /// The field name, shared across `source_values`/`prepared_values`.
    pub field: String,
    /// The value extracted from source documents.
    pub source_value: serde_json::Value,
    /// The value the preparer (human or agent) produced.
    pub prepared_value: serde_json::Value,
    /// The same field's prior-year value, if supplied.
    pub prior_year_value: Option<serde_json::Value>,
    /// Whether `documented_reasons` already explains this disagreement.
    pub documented: bool,
}

/// Result of one checker hook invocation. Never transitions a task —
/// purely informational, surfaced to a human reviewer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckerReport {
    /// Every field where `source_values` and `prepared_values` disagree.
    pub discrepancies: Vec<FieldDiscrepancy>,
    /// Count of `discrepancies` entries that are not `documented`.
    pub flagged_count: usize,
    /// Fields named in `injected_error_fields` that the checker actually
    /// caught as discrepancies, confirming detection.
    pub injected_errors_detected: Vec<String>,
}

/// The kind of feedback captured against a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackKind {
    /// An automatic diff between AI-produced and reviewer-corrected content.
    Implicit,
    /// Closed-vocabulary tags the reviewer applies intentionally.
    Explicit,
}

/// One immutable piece of reviewer feedback against a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackEntry {
    /// Stable identity.
    pub id: Uuid,
    /// Owning task.
    pub task_id: Uuid,
    /// Implicit or explicit.
    pub kind: FeedbackKind,
    /// Reviewer identity, if known.
    pub reviewer_id: Option<String>,
    /// Closed-vocabulary tags (required non-empty for `Explicit`).
    pub tags: Vec<String>,
    /// The AI-produced content being reviewed.
    pub original_content: String,
    /// The reviewer-corrected content (required for `Implicit`).
    pub corrected_content: Option<String>,
    /// Structured summary of the diff (for `Implicit`).
    pub diff_summary: Option<String>,
    /// Free-text note (for `Explicit`).
    pub note: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}
