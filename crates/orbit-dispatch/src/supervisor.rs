//! Retry policy and liveness supervision (§4.2).
//!
//! Two independent sweeps, run on a timer by [`Supervisor::run_forever`]:
//! retry backoff for `failed` tasks below `max_retries`, escalation once
//! that budget is exhausted, and reverting stale `in_progress` tasks whose
//! heartbeat has gone quiet.

use chrono::{DateTime, Utc};
use orbit_core::{Escalation, OrbitResult, Task, TaskStatus};
use orbit_state::StateMachine;
use orbit_store::{EscalationStore, TaskFilter, TaskStore};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Tunables for the retry and liveness sweeps.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// A `failed` task with `attempt_count >= max_retries` is escalated
    /// instead of retried again (§4.2, default 3).
    pub max_retries: u32,
    /// Base of the exponential retry backoff (§4.2, default 30s).
    pub base_backoff: Duration,
    /// Backoff multiplier per attempt (§4.2, default 2).
    pub backoff_factor: u32,
    /// Ceiling on the computed backoff (§4.2, default 15 min).
    pub backoff_cap: Duration,
    /// Expected handler heartbeat cadence (§4.2, recommended 30s).
    pub heartbeat_interval: Duration,
    /// How many missed heartbeat intervals mark a task stale (§4.2,
    /// recommended 5).
    pub stale_multiple: u32,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_backoff: Duration::from_secs(30),
            backoff_factor: 2,
            backoff_cap: Duration::from_secs(15 * 60),
            heartbeat_interval: Duration::from_secs(30),
            stale_multiple: 5,
        }
    }
}

impl SupervisorConfig {
    fn backoff_for(&self, attempt_count: u32) -> Duration {
        let exponent = attempt_count.saturating_sub(1).min(32);
        let factor = self.backoff_factor.saturating_pow(exponent);
        let scaled = self.base_backoff.saturating_mul(factor.max(1));
        scaled.min(self.backoff_cap)
    }

    fn stale_after(&self) -> Duration {
        self.heartbeat_interval * self.stale_multiple
    }
}

/// Drives the retry backoff and liveness sweeps over a [`StateMachine`].
pub struct Supervisor<T: TaskStore, E: EscalationStore> {
    tasks: Arc<T>,
    state_machine: Arc<StateMachine<T, E>>,
    config: SupervisorConfig,
    shutdown: CancellationToken,
}

impl<T: TaskStore, E: EscalationStore> Supervisor<T, E> {
    /// Wire a Supervisor over the task store and State Machine it sweeps.
    pub fn new(tasks: Arc<T>, state_machine: Arc<StateMachine<T, E>>, config: SupervisorConfig) -> Self {
        Self {
            tasks,
            state_machine,
            config,
            shutdown: CancellationToken::new(),
        }
    }

    /// Stop [`Self::run_forever`] after its current sweep.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// One retry-backoff pass: for every `failed` task, either `retry` it
    /// (backoff elapsed, budget remains) or escalate it (budget exhausted).
    pub async fn retry_sweep(&self) -> OrbitResult<()> {
        let filter = TaskFilter {
            status: Some(TaskStatus::Failed),
            ..Default::default()
        };
        for task in self.tasks.list(&filter).await? {
            if task.attempt_count >= self.config.max_retries {
                let reason = format!(
                    "retries exhausted after {} attempts: {}",
                    task.attempt_count,
                    failure_reason(&task)
                );
                let escalation = Escalation::new(task.id, reason, true);
                self.state_machine.escalate_after_retries(task.id, escalation).await?;
                warn!(task_id = %task.id, attempts = task.attempt_count, "retries exhausted, escalated");
                continue;
            }

            let Some(failed_at) = failed_at(&task) else {
                continue;
            };
            let backoff = self.config.backoff_for(task.attempt_count);
            let due = failed_at + chrono::Duration::from_std(backoff).unwrap_or(chrono::Duration::zero());
            if Utc::now() >= due {
                self.state_machine.retry(task.id).await?;
                info!(task_id = %task.id, attempt = task.attempt_count, "retried after backoff");
            }
        }
        Ok(())
    }

    /// One liveness pass: revert `in_progress` tasks whose heartbeat (or,
    /// absent one, `started_at`) is older than `stale_after` to
    /// `failed(reason=timeout)`.
    pub async fn liveness_sweep(&self) -> OrbitResult<()> {
        let filter = TaskFilter {
            status: Some(TaskStatus::InProgress),
            ..Default::default()
        };
        let stale_after = self.config.stale_after();
        for task in self.tasks.list(&filter).await? {
            let last_seen = task.heartbeat_at.or(task.started_at);
            let Some(last_seen) = last_seen else {
                continue;
            };
            let age = Utc::now() - last_seen;
            if age > chrono::Duration::from_std(stale_after).unwrap_or(chrono::Duration::zero()) {
                self.state_machine.fail(task.id, "timeout").await?;
                warn!(task_id = %task.id, "reverted stale in_progress task to failed(timeout)");
            }
        }
        Ok(())
    }

    /// Run both sweeps on a timer until [`Self::shutdown`] is called.
    pub async fn run_forever(&self, tick: Duration) {
        info!("supervisor loop starting");
        loop {
            if self.shutdown.is_cancelled() {
                info!("supervisor loop stopping: shutdown requested");
                return;
            }
            if let Err(err) = self.retry_sweep().await {
                warn!(error = %err, "retry sweep failed");
            }
            if let Err(err) = self.liveness_sweep().await {
                warn!(error = %err, "liveness sweep failed");
            }
            tokio::time::sleep(tick).await;
        }
    }
}

fn failed_at(task: &Task) -> Option<DateTime<Utc>> {
    task.metadata
        .get("failed_at")
        .and_then(|v| v.as_str())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn failure_reason(task: &Task) -> &str {
    task.metadata
        .get("reason")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
}
