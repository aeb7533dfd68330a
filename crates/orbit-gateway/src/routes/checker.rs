//! The checker hook (§4.6, §6): `POST /tasks/{id}/check` is a stateless
//! consistency comparison. It never transitions the task — callers decide
//! what, if anything, a flagged report means for the task's lifecycle.

use crate::dto::CheckerRequest;
use crate::server::AppState;
use axum::extract::Path;
use axum::routing::post;
use axum::{Json, Router};
use orbit_core::{check_consistency, CheckerReport};
use std::sync::Arc;
use uuid::Uuid;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/tasks/{id}/check", post(check))
}

async fn check(Path(_id): Path<Uuid>, Json(body): Json<CheckerRequest>) -> Json<CheckerReport> {
    let report = check_consistency(
        &body.source_values,
        &body.prepared_values,
        body.prior_year_values.as_ref(),
        &body.documented_reasons,
        &body.injected_error_fields,
    );
    Json(report)
}
