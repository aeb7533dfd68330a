//! The Progress Bus (C10): ordered, per-task event publication feeding
//! live dashboards, with the KV-backed snapshot as the single source of
//! truth for "current progress".
//!
//! Grounded on the monitor loop's snapshot-then-broadcast pattern
//! elsewhere in this workspace: progress is written synchronously before
//! it is published, so a subscriber joining mid-task can always fetch
//! the latest snapshot first and then pick up live events without a gap.

use chrono::Utc;
use orbit_core::{OrbitError, OrbitResult, ProgressEvent, ProgressSnapshot, TaskStatus};
use orbit_kv::Kv;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};
use uuid::Uuid;

fn snapshot_key(task_id: Uuid) -> String {
    format!("task:{task_id}:progress")
}

fn events_channel(task_id: Uuid) -> String {
    format!("task:{task_id}:events")
}

/// The Progress Bus: publishes ordered, monotonic events for one task at
/// a time, backed by a shared [`Kv`].
///
/// Per-task publication is serialized by the caller (a single handler
/// invocation publishes its own events sequentially); the bus itself
/// enforces monotonicity by rejecting any `percent` regression against
/// the last-published snapshot for that task.
pub struct ProgressBus {
    kv: Arc<dyn Kv>,
}

impl ProgressBus {
    /// Wrap a [`Kv`] with progress publication semantics.
    pub fn new(kv: Arc<dyn Kv>) -> Self {
        Self { kv }
    }

    /// Publish one progress event for `task_id`. Rejects `percent`
    /// regressions within the same attempt (an attempt boundary is a
    /// `retry`, which the caller signals via `reset_for_new_attempt`
    /// first). Updates the snapshot synchronously before broadcasting so
    /// the two never disagree.
    pub async fn publish(
        &self,
        task_id: Uuid,
        stage: impl Into<String>,
        percent: u8,
        message: impl Into<String>,
    ) -> OrbitResult<()> {
        self.publish_with(task_id, stage, percent, message, None, None)
            .await
    }

    /// Publish a terminal event carrying the task's final `status`, and
    /// handler-defined `extra` detail.
    pub async fn publish_terminal(
        &self,
        task_id: Uuid,
        stage: impl Into<String>,
        percent: u8,
        message: impl Into<String>,
        status: TaskStatus,
    ) -> OrbitResult<()> {
        self.publish_with(task_id, stage, percent, message, None, Some(status))
            .await
    }

    async fn publish_with(
        &self,
        task_id: Uuid,
        stage: impl Into<String>,
        percent: u8,
        message: impl Into<String>,
        extra: Option<serde_json::Value>,
        status: Option<TaskStatus>,
    ) -> OrbitResult<()> {
        if percent > 100 {
            return Err(OrbitError::Validation(format!(
                "percent {percent} out of range 0..=100"
            )));
        }

        if let Some(existing) = self.snapshot(task_id).await? {
            if percent < existing.percent {
                return Err(OrbitError::Validation(format!(
                    "progress regression for task {task_id}: {percent} < {}",
                    existing.percent
                )));
            }
        }

        let stage = stage.into();
        let message = message.into();
        let now = Utc::now();

        let snapshot = ProgressSnapshot {
            percent,
            stage: stage.clone(),
            message: message.clone(),
            updated_at: now,
        };
        self.kv
            .set(&snapshot_key(task_id), serde_json::to_value(&snapshot)?)
            .await?;

        let event = ProgressEvent {
            task_id,
            stage,
            percent,
            message,
            extra,
            status,
            updated_at: now,
        };
        info!(task_id = %task_id, percent, stage = %event.stage, "progress published");
        self.kv
            .publish(&events_channel(task_id), serde_json::to_value(&event)?);

        if status.is_some() {
            info!(task_id = %task_id, "progress stream reached terminal event");
        }
        Ok(())
    }

    /// Clear the snapshot for `task_id` so a fresh attempt's first
    /// `publish` is not rejected as a regression against the previous
    /// attempt's trailing percent.
    pub async fn reset_for_new_attempt(&self, task_id: Uuid) -> OrbitResult<()> {
        self.kv.delete(&snapshot_key(task_id)).await
    }

    /// The current snapshot for `task_id`, if any event has been
    /// published.
    pub async fn snapshot(&self, task_id: Uuid) -> OrbitResult<Option<ProgressSnapshot>> {
        match self.kv.get(&snapshot_key(task_id)).await? {
            Some(v) => Ok(Some(serde_json::from_value(v)?)),
            None => Ok(None),
        }
    }

    /// Subscribe to live events for `task_id`. Callers that want the
    /// "snapshot first, then live events" guarantee of §4.8 should call
    /// [`Self::snapshot`] immediately after subscribing and deliver it to
    /// the caller before forwarding anything from the receiver.
    pub fn subscribe(&self, task_id: Uuid) -> broadcast::Receiver<serde_json::Value> {
        self.kv.subscribe(&events_channel(task_id))
    }
}

/// Decode a raw broadcast payload back into a [`ProgressEvent`], warning
/// and skipping malformed entries rather than tearing down the stream.
pub fn decode_event(raw: serde_json::Value) -> Option<ProgressEvent> {
    match serde_json::from_value(raw) {
        Ok(event) => Some(event),
        Err(err) => {
            warn!(error = %err, "dropped malformed progress event");
            None
        }
    }
}
