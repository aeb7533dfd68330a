//! Dashboard API (§6): an aggregate view over the task queue, recent agent
//! activity, and escalations awaiting a reviewer's attention.

use crate::dto::{AgentActivity, AttentionFlag, DashboardResponse};
use crate::error::ApiError;
use crate::server::AppState;
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use orbit_core::TaskStatus;
use orbit_store::{AgentLog, TaskFilter};
use std::collections::HashMap;
use std::sync::Arc;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/dashboard", get(dashboard))
}

async fn dashboard(State(state): State<Arc<AppState>>) -> Result<Json<DashboardResponse>, ApiError> {
    let by_status = |status: TaskStatus| TaskFilter {
        status: Some(status),
        ..Default::default()
    };

    let queue_depth = state.tasks.list(&by_status(TaskStatus::Pending)).await?.len()
        + state.tasks.list(&by_status(TaskStatus::Assigned)).await?.len()
        + state.tasks.list(&by_status(TaskStatus::InProgress)).await?.len();
    let completed_count = state.tasks.list(&by_status(TaskStatus::Completed)).await?.len();
    let failed_count = state.tasks.list(&by_status(TaskStatus::Failed)).await?.len();
    let escalated_tasks = state.tasks.list(&by_status(TaskStatus::Escalated)).await?;
    let escalated_count = escalated_tasks.len();

    let mut action_counts: HashMap<String, usize> = HashMap::new();
    for entry in AgentLog::read_all(&state.agent_log_dir).await? {
        if let Some(agent_name) = entry.agent_name {
            *action_counts.entry(agent_name).or_insert(0) += 1;
        }
    }
    let mut agent_activity: Vec<AgentActivity> = action_counts
        .into_iter()
        .map(|(agent_name, action_count)| AgentActivity {
            agent_name,
            action_count,
        })
        .collect();
    agent_activity.sort_by(|a, b| b.action_count.cmp(&a.action_count));

    let mut attention_flags = Vec::new();
    for task in &escalated_tasks {
        let escalations = state.escalations.list_for_task(task.id).await?;
        if let Some(open) = escalations
            .iter()
            .filter(|e| e.blocking && e.resolved_at.is_none())
            .max_by_key(|e| e.created_at)
        {
            attention_flags.push(AttentionFlag {
                task_id: task.id,
                reason: open.reason.clone(),
                created_at: open.created_at,
            });
        }
    }

    Ok(Json(DashboardResponse {
        queue_depth,
        completed_count,
        failed_count,
        escalated_count,
        agent_activity,
        attention_flags,
    }))
}
