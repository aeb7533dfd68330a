//! Task intake API (§6): `POST /tasks` creates a task in `pending`,
//! `PATCH /tasks/{id}/status` issues exactly one State Machine transition,
//! `GET /tasks` lists with filters.

use crate::dto::{CreateTaskRequest, TaskListQuery, UpdateTaskStatusRequest};
use crate::error::ApiError;
use crate::server::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{patch, post};
use axum::{Json, Router};
use orbit_core::{Escalation, OrbitError, Task, TaskStatus};
use orbit_store::TaskFilter;
use std::sync::Arc;
use uuid::Uuid;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/tasks", post(create_task).get(list_tasks))
        .route("/tasks/{id}/status", patch(update_status))
}

async fn create_task(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateTaskRequest>,
) -> Result<(StatusCode, Json<Task>), ApiError> {
    let mut task = Task::new(body.client_id, body.task_type, body.tax_year);
    task.metadata = body.metadata;
    state.tasks.create(task.clone()).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

async fn list_tasks(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TaskListQuery>,
) -> Result<Json<Vec<Task>>, ApiError> {
    let filter = TaskFilter {
        status: query.status,
        client_id: query.client_id,
        task_type: query.task_type,
        assigned_agent: query.assigned_agent,
        limit: query.limit,
        offset: query.offset,
    };
    let tasks = state.tasks.list(&filter).await?;
    Ok(Json(tasks))
}

async fn update_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateTaskStatusRequest>,
) -> Result<Json<Task>, ApiError> {
    let task = match body.status {
        TaskStatus::Pending => state.state_machine.retry(id).await?,
        TaskStatus::Assigned => {
            let agent = body.assigned_agent.ok_or_else(|| {
                ApiError(OrbitError::Validation(
                    "assigning a task requires assigned_agent".into(),
                ))
            })?;
            state.state_machine.assign(id, agent).await?
        }
        TaskStatus::InProgress => {
            let current = state
                .tasks
                .get(id)
                .await?
                .ok_or_else(|| ApiError(OrbitError::MissingResource(id.to_string())))?;
            if current.status == TaskStatus::Escalated {
                state.state_machine.resume_from_escalation(id).await?
            } else {
                state.state_machine.start(id).await?
            }
        }
        TaskStatus::Completed => state.state_machine.complete(id).await?,
        TaskStatus::Failed => {
            let reason = body.reason.ok_or_else(|| {
                ApiError(OrbitError::Validation("failing a task requires reason".into()))
            })?;
            state.state_machine.fail(id, reason).await?
        }
        TaskStatus::Escalated => {
            let reason = body.reason.ok_or_else(|| {
                ApiError(OrbitError::Validation(
                    "escalating a task requires reason".into(),
                ))
            })?;
            let mut escalation = Escalation::new(id, reason, body.blocking.unwrap_or(true));
            if let Some(context) = body.context {
                escalation.context = context;
            }
            state.state_machine.escalate(id, escalation).await?
        }
    };
    Ok(Json(task))
}
