//! Progress stream (§4.8, §6): a plain snapshot fetch plus an SSE
//! subscription that delivers the current snapshot first and then
//! forwards live events, so a client that joins mid-task never sees a
//! gap between "where things stand" and "what happens next".

use crate::error::ApiError;
use crate::server::AppState;
use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::get;
use axum::{Json, Router};
use futures_util::stream::{self, Stream};
use orbit_core::{OrbitError, ProgressSnapshot};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/tasks/{id}/progress", get(snapshot))
        .route("/tasks/{id}/progress/stream", get(stream_progress))
}

async fn snapshot(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ProgressSnapshot>, ApiError> {
    let snap = state
        .progress
        .snapshot(id)
        .await?
        .ok_or_else(|| ApiError(OrbitError::MissingResource(id.to_string())))?;
    Ok(Json(snap))
}

async fn stream_progress(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut rx = state.progress.subscribe(id);
    let initial = state.progress.snapshot(id).await.ok().flatten();

    let head = stream::iter(initial.into_iter().filter_map(|snap| {
        serde_json::to_string(&snap)
            .ok()
            .map(|json| Ok(Event::default().event("snapshot").data(json)))
    }));

    let tail = stream::unfold(rx, move |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(raw) => {
                    let Some(event) = orbit_progress::decode_event(raw) else {
                        continue;
                    };
                    let Ok(json) = serde_json::to_string(&event) else {
                        continue;
                    };
                    return Some((Ok(Event::default().event("progress").data(json)), rx));
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => return None,
            }
        }
    });

    Sse::new(head.chain(tail)).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}
