//! The Task State Machine (C8): per-task lifecycle transitions guarded by
//! predicates, with side-effect hooks that run before the transition is
//! persisted. Holds no state of its own beyond what [`orbit_store`]
//! already persists on `Task`.

use chrono::Utc;
use orbit_core::{Escalation, OrbitError, OrbitResult, Task, TaskStatus};
use orbit_store::{EscalationStore, TaskStore};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// The states `fail` and `escalate` may be driven from. Any other current
/// status is an [`OrbitError::InvalidTransition`].
const FAILABLE_FROM: [TaskStatus; 2] = [TaskStatus::Assigned, TaskStatus::InProgress];

/// Shared mutation for every path that lands a task in `Failed`: bump the
/// attempt count and record both the reason and the time of failure, the
/// latter read back by the supervisor's retry backoff calculation.
fn mark_failed(task: &mut Task, reason: String) {
    task.status = TaskStatus::Failed;
    task.attempt_count += 1;
    task.metadata
        .insert("reason".to_string(), serde_json::Value::String(reason));
    task.metadata.insert(
        "failed_at".to_string(),
        serde_json::Value::String(Utc::now().to_rfc3339()),
    );
}

/// The State Machine: every transition here is the only sanctioned way a
/// `Task.status` changes. Handlers and the Dispatcher call through this,
/// never `TaskStore::compare_and_swap` directly.
pub struct StateMachine<T: TaskStore, E: EscalationStore> {
    tasks: Arc<T>,
    escalations: Arc<E>,
}

impl<T: TaskStore, E: EscalationStore> StateMachine<T, E> {
    /// Wrap a task store and escalation store with transition semantics.
    pub fn new(tasks: Arc<T>, escalations: Arc<E>) -> Self {
        Self { tasks, escalations }
    }

    /// `pending → assigned`. Requires a non-empty `agent` name.
    pub async fn assign(&self, id: Uuid, agent: impl Into<String>) -> OrbitResult<Task> {
        let agent = agent.into();
        if agent.trim().is_empty() {
            return Err(OrbitError::Validation(
                "assign requires a non-empty agent name".into(),
            ));
        }
        self.reject_if_terminal(id).await?;

        let task = self
            .tasks
            .compare_and_swap(
                id,
                TaskStatus::Pending,
                Box::new(move |task| {
                    task.status = TaskStatus::Assigned;
                    task.assigned_agent = Some(agent);
                }),
            )
            .await?;
        info!(task_id = %id, agent = %task.assigned_agent.as_deref().unwrap_or(""), "task assigned");
        Ok(task)
    }

    /// `assigned → in_progress`. Sets `started_at`.
    pub async fn start(&self, id: Uuid) -> OrbitResult<Task> {
        self.reject_if_terminal(id).await?;
        let task = self
            .tasks
            .compare_and_swap(
                id,
                TaskStatus::Assigned,
                Box::new(|task| {
                    task.status = TaskStatus::InProgress;
                    task.started_at = Some(Utc::now());
                }),
            )
            .await?;
        info!(task_id = %id, "task started");
        Ok(task)
    }

    /// `in_progress → completed`. Sets `completed_at`.
    pub async fn complete(&self, id: Uuid) -> OrbitResult<Task> {
        self.reject_if_terminal(id).await?;
        let task = self
            .tasks
            .compare_and_swap(
                id,
                TaskStatus::InProgress,
                Box::new(|task| {
                    task.status = TaskStatus::Completed;
                    task.completed_at = Some(Utc::now());
                }),
            )
            .await?;
        info!(task_id = %id, "task completed");
        Ok(task)
    }

    /// `{assigned, in_progress} → failed`. Records `reason` on
    /// `Task.metadata["reason"]` and increments `attempt_count`.
    pub async fn fail(&self, id: Uuid, reason: impl Into<String>) -> OrbitResult<Task> {
        let reason = reason.into();
        let from = self.current_failable_status(id).await?;

        let task = self
            .tasks
            .compare_and_swap(id, from, Box::new(move |task| mark_failed(task, reason)))
            .await?;
        info!(task_id = %id, attempt = task.attempt_count, "task failed");
        Ok(task)
    }

    /// `pending → failed`, the Dispatcher's `no_handler` special case
    /// (§4.2 step 1): a task is rejected before it is ever assigned, so
    /// the ordinary `{assigned, in_progress} → failed` guard in [`Self::fail`]
    /// does not apply.
    pub async fn fail_unleased(&self, id: Uuid, reason: impl Into<String>) -> OrbitResult<Task> {
        self.reject_if_terminal(id).await?;
        let reason = reason.into();
        let task = self
            .tasks
            .compare_and_swap(
                id,
                TaskStatus::Pending,
                Box::new(move |task| mark_failed(task, reason)),
            )
            .await?;
        info!(task_id = %id, "task failed before assignment: no handler registered");
        Ok(task)
    }

    /// `failed → escalated`, the supervisor's "retries exhausted" special
    /// case (§4.2): after `MAX_RETRIES` a failed task is escalated rather
    /// than retried again. Distinct from [`Self::escalate`], which only
    /// applies to an active `{assigned, in_progress}` task.
    pub async fn escalate_after_retries(&self, id: Uuid, escalation: Escalation) -> OrbitResult<Task> {
        self.reject_if_terminal(id).await?;
        self.escalations.add(escalation).await?;
        let task = self
            .tasks
            .compare_and_swap(
                id,
                TaskStatus::Failed,
                Box::new(|task| {
                    task.status = TaskStatus::Escalated;
                }),
            )
            .await?;
        info!(task_id = %id, "retries exhausted, task escalated");
        Ok(task)
    }

    /// `{assigned, in_progress} → escalated`. Persists an [`Escalation`]
    /// row before the status change — the on-enter hook for this
    /// transition — so a failure to record it aborts the transition
    /// entirely with no status change visible.
    pub async fn escalate(&self, id: Uuid, escalation: Escalation) -> OrbitResult<Task> {
        let from = self.current_failable_status(id).await?;

        self.escalations.add(escalation).await?;

        let task = self
            .tasks
            .compare_and_swap(
                id,
                from,
                Box::new(|task| {
                    task.status = TaskStatus::Escalated;
                }),
            )
            .await?;
        info!(task_id = %id, "task escalated");
        Ok(task)
    }

    /// `failed → pending`. Clears `assigned_agent` and `started_at` so the
    /// task re-enters the dispatch queue as if fresh.
    pub async fn retry(&self, id: Uuid) -> OrbitResult<Task> {
        self.reject_if_terminal(id).await?;
        let task = self
            .tasks
            .compare_and_swap(
                id,
                TaskStatus::Failed,
                Box::new(|task| {
                    task.status = TaskStatus::Pending;
                    task.assigned_agent = None;
                    task.started_at = None;
                }),
            )
            .await?;
        info!(task_id = %id, attempt = task.attempt_count, "task retried");
        Ok(task)
    }

    /// Un-block a resolved escalation: `escalated → in_progress`. Not
    /// named in §4.1's operation list directly, but required by the
    /// "resolution permits transition back to in_progress" clause of §3 —
    /// callers MUST have already resolved the blocking escalation(s) via
    /// [`EscalationStore::resolve`] before calling this.
    pub async fn resume_from_escalation(&self, id: Uuid) -> OrbitResult<Task> {
        let outstanding = self.escalations.list_for_task(id).await?;
        if outstanding.iter().any(|e| e.blocking && e.resolved_at.is_none()) {
            return Err(OrbitError::InvalidTransition(format!(
                "task {id} has an unresolved blocking escalation"
            )));
        }
        let task = self
            .tasks
            .compare_and_swap(
                id,
                TaskStatus::Escalated,
                Box::new(|task| {
                    task.status = TaskStatus::InProgress;
                }),
            )
            .await?;
        info!(task_id = %id, "task resumed from escalation");
        Ok(task)
    }

    async fn reject_if_terminal(&self, id: Uuid) -> OrbitResult<()> {
        let task = self
            .tasks
            .get(id)
            .await?
            .ok_or_else(|| OrbitError::MissingResource(format!("task {id} not found")))?;
        if task.status.is_terminal() {
            return Err(OrbitError::InvalidTransition(format!(
                "task {id} is in terminal state {:?}",
                task.status
            )));
        }
        Ok(())
    }

    async fn current_failable_status(&self, id: Uuid) -> OrbitResult<TaskStatus> {
        let task = self
            .tasks
            .get(id)
            .await?
            .ok_or_else(|| OrbitError::MissingResource(format!("task {id} not found")))?;
        if !FAILABLE_FROM.contains(&task.status) {
            return Err(OrbitError::InvalidTransition(format!(
                "task {id} is {:?}, expected assigned or in_progress",
                task.status
            )));
        }
        Ok(task.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orbit_core::Task;
    use orbit_store::{FileEscalationStore, FileTaskStore};
    use uuid::Uuid;

    async fn machine() -> (StateMachine<FileTaskStore, FileEscalationStore>, Arc<FileTaskStore>) {
        let tmp = tempfile::TempDir::new().unwrap();
        let tasks = Arc::new(FileTaskStore::new(tmp.path().join("tasks")).await.unwrap());
        let escalations = Arc::new(
            FileEscalationStore::new(tmp.path().join("escalations"))
                .await
                .unwrap(),
        );
        std::mem::forget(tmp);
        (StateMachine::new(tasks.clone(), escalations), tasks)
    }

    async fn seed_task(tasks: &FileTaskStore) -> Uuid {
        let task = Task::new(Uuid::new_v4(), "personal_tax", Some(2024));
        let id = task.id;
        tasks.create(task).await.unwrap();
        id
    }

    #[tokio::test]
    async fn happy_path_pending_to_completed() {
        let (sm, tasks) = machine().await;
        let id = seed_task(&tasks).await;

        sm.assign(id, "w2_agent").await.unwrap();
        sm.start(id).await.unwrap();
        let task = sm.complete(id).await.unwrap();

        assert_eq!(task.status, TaskStatus::Completed);
        assert!(task.completed_at.is_some());
    }

    #[tokio::test]
    async fn assign_rejects_empty_agent() {
        let (sm, tasks) = machine().await;
        let id = seed_task(&tasks).await;
        let err = sm.assign(id, "").await.unwrap_err();
        assert_eq!(err.reason(), "validation_error");
    }

    #[tokio::test]
    async fn complete_on_completed_task_is_invalid_transition_and_noop() {
        let (sm, tasks) = machine().await;
        let id = seed_task(&tasks).await;
        sm.assign(id, "agent").await.unwrap();
        sm.start(id).await.unwrap();
        sm.complete(id).await.unwrap();

        let err = sm.complete(id).await.unwrap_err();
        assert_eq!(err.reason(), "invalid_transition");

        let task = tasks.get(id).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn fail_increments_attempt_count_and_records_reason() {
        let (sm, tasks) = machine().await;
        let id = seed_task(&tasks).await;
        sm.assign(id, "agent").await.unwrap();
        sm.start(id).await.unwrap();

        let task = sm.fail(id, "timeout").await.unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.attempt_count, 1);
        assert_eq!(
            task.metadata.get("reason").and_then(|v| v.as_str()),
            Some("timeout")
        );
    }

    #[tokio::test]
    async fn retry_clears_assignment_and_returns_to_pending() {
        let (sm, tasks) = machine().await;
        let id = seed_task(&tasks).await;
        sm.assign(id, "agent").await.unwrap();
        sm.start(id).await.unwrap();
        sm.fail(id, "timeout").await.unwrap();

        let task = sm.retry(id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(task.assigned_agent.is_none());
        assert!(task.started_at.is_none());
    }

    #[tokio::test]
    async fn escalate_creates_escalation_row_before_status_change() {
        let (sm, tasks) = machine().await;
        let id = seed_task(&tasks).await;
        sm.assign(id, "agent").await.unwrap();
        sm.start(id).await.unwrap();

        let esc = Escalation::new(id, "low_confidence:W2", true);
        let task = sm.escalate(id, esc).await.unwrap();
        assert_eq!(task.status, TaskStatus::Escalated);
    }

    #[tokio::test]
    async fn concurrent_assign_exactly_one_wins() {
        let (sm, tasks) = machine().await;
        let id = seed_task(&tasks).await;
        let sm = Arc::new(sm);

        let mut handles = Vec::new();
        for n in 0..10 {
            let sm = sm.clone();
            handles.push(tokio::spawn(async move { sm.assign(id, format!("agent-{n}")).await }));
        }

        let mut ok_count = 0;
        let mut err_count = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => ok_count += 1,
                Err(_) => err_count += 1,
            }
        }
        assert_eq!(ok_count, 1);
        assert_eq!(err_count, 9);
    }
}
