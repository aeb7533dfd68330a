//! Feedback API (§4.11, §6): implicit diff-based capture, explicit
//! tag-based capture, and per-task retrieval.

use crate::dto::{ExplicitFeedbackRequest, FeedbackListResponse, ImplicitFeedbackRequest};
use crate::error::ApiError;
use crate::server::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use orbit_core::FeedbackEntry;
use std::sync::Arc;
use uuid::Uuid;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/feedback/implicit", post(implicit))
        .route("/feedback/explicit", post(explicit))
        .route("/tasks/{id}/feedback", get(for_task))
}

async fn implicit(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ImplicitFeedbackRequest>,
) -> Result<(StatusCode, Json<FeedbackEntry>), ApiError> {
    let entry = state
        .feedback
        .capture_implicit(
            body.task_id,
            body.reviewer_id,
            body.original_content,
            body.corrected_content,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

async fn explicit(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ExplicitFeedbackRequest>,
) -> Result<(StatusCode, Json<FeedbackEntry>), ApiError> {
    let entry = state
        .feedback
        .capture_explicit(
            body.task_id,
            body.reviewer_id,
            body.original_content,
            body.tags,
            body.note,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

async fn for_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<FeedbackListResponse>, ApiError> {
    let entries = state.feedback.for_task(id).await?;
    Ok(Json(FeedbackListResponse { entries }))
}
