use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

/// One dispatch decision recorded against a task: a lease granted, a
/// handler invoked, or a handler result mapped to a transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentLogEntry {
    /// When this decision was made.
    pub timestamp: DateTime<Utc>,
    /// The task this decision concerns.
    pub task_id: Uuid,
    /// The agent/handler name involved, if any.
    pub agent_name: Option<String>,
    /// Short action label (`"leased"`, `"invoked"`, `"completed"`, ...).
    pub action: String,
    /// Structured detail.
    pub details: serde_json::Value,
}

/// Append-only log of dispatcher decisions, persisted under `agent_logs`;
/// feeds the dashboard's `agent_activity[]`.
pub struct AgentLog {
    tx: mpsc::UnboundedSender<AgentLogEntry>,
}

impl AgentLog {
    /// Spawn a background task that appends entries to `log_dir/agent.jsonl`.
    pub fn new(log_dir: PathBuf) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<AgentLogEntry>();

        tokio::spawn(async move {
            let _ = tokio::fs::create_dir_all(&log_dir).await;
            let log_file = log_dir.join("agent.jsonl");

            while let Some(entry) = rx.recv().await {
                if let Ok(line) = serde_json::to_string(&entry) {
                    if let Ok(mut file) = tokio::fs::OpenOptions::new()
                        .create(true)
                        .append(true)
                        .open(&log_file)
                        .await
                    {
                        use tokio::io::AsyncWriteExt;
                        let line = format!("{line}\n");
                        let _ = file.write_all(line.as_bytes()).await;
                    }
                }
            }
        });

        Self { tx }
    }

    /// Record a dispatch decision. Never blocks the caller.
    pub fn record(
        &self,
        task_id: Uuid,
        agent_name: Option<String>,
        action: impl Into<String>,
        details: serde_json::Value,
    ) {
        let action = action.into();
        let entry = AgentLogEntry {
            timestamp: Utc::now(),
            task_id,
            agent_name,
            action: action.clone(),
            details,
        };
        info!(task_id = %task_id, action = %action, "agent_log");
        let _ = self.tx.send(entry);
    }

    /// Read every entry for a task directly off disk.
    pub async fn read_for_task(
        log_dir: &std::path::Path,
        task_id: Uuid,
    ) -> std::io::Result<Vec<AgentLogEntry>> {
        Ok(Self::read_all(log_dir).await?.into_iter().filter(|e| e.task_id == task_id).collect())
    }

    /// Read every entry ever recorded, directly off disk — feeds the
    /// dashboard's `agent_activity[]`.
    pub async fn read_all(log_dir: &std::path::Path) -> std::io::Result<Vec<AgentLogEntry>> {
        let path = log_dir.join("agent.jsonl");
        if !path.exists() {
            return Ok(Vec::new());
        }
        let data = tokio::fs::read_to_string(&path).await?;
        Ok(data
            .lines()
            .filter_map(|l| serde_json::from_str::<AgentLogEntry>(l).ok())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Recorded entries are appended by a background task, not
    /// synchronously; poll briefly rather than assuming a fixed delay.
    async fn wait_for_entries(dir: &std::path::Path, task_id: Uuid) -> Vec<AgentLogEntry> {
        for _ in 0..50 {
            let rows = AgentLog::read_for_task(dir, task_id).await.unwrap();
            if !rows.is_empty() {
                return rows;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        Vec::new()
    }

    #[tokio::test]
    async fn record_is_readable_back_for_its_task() {
        let tmp = tempfile::TempDir::new().unwrap();
        let log = AgentLog::new(tmp.path().to_path_buf());
        let task_id = Uuid::new_v4();

        log.record(task_id, Some("w2_agent".into()), "leased", serde_json::json!({}));

        let rows = wait_for_entries(tmp.path(), task_id).await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].action, "leased");
        assert_eq!(rows[0].agent_name.as_deref(), Some("w2_agent"));
    }

    #[tokio::test]
    async fn read_for_task_filters_other_tasks() {
        let tmp = tempfile::TempDir::new().unwrap();
        let log = AgentLog::new(tmp.path().to_path_buf());
        let task_id = Uuid::new_v4();
        let other_id = Uuid::new_v4();

        log.record(task_id, None, "leased", serde_json::json!({}));
        log.record(other_id, None, "leased", serde_json::json!({}));
        let _ = wait_for_entries(tmp.path(), task_id).await;
        let _ = wait_for_entries(tmp.path(), other_id).await;

        let all = AgentLog::read_all(tmp.path()).await.unwrap();
        assert_eq!(all.len(), 2);
        let mine = AgentLog::read_for_task(tmp.path(), task_id).await.unwrap();
        assert_eq!(mine.len(), 1);
    }
}
