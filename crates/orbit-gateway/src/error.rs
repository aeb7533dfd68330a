//! Maps [`OrbitError`] onto HTTP status codes per §7's propagation policy:
//! `InvalidTransition` is 409, `MissingResource` is 404, validation-shaped
//! errors are 400, and anything else is a 500 with no leaked detail.

use crate::dto::ErrorBody;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use orbit_core::OrbitError;

/// Newtype so `OrbitError` (defined in `orbit-core`, which this crate does
/// not own) can implement `IntoResponse` (defined in `axum`, which this
/// crate also does not own).
pub struct ApiError(pub OrbitError);

impl From<OrbitError> for ApiError {
    fn from(err: OrbitError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            OrbitError::InvalidTransition(_) => StatusCode::CONFLICT,
            OrbitError::MissingResource(_) => StatusCode::NOT_FOUND,
            OrbitError::Validation(_) => StatusCode::BAD_REQUEST,
            OrbitError::CircuitOpen { .. } => StatusCode::SERVICE_UNAVAILABLE,
            OrbitError::TransientUpstream(_) => StatusCode::BAD_GATEWAY,
            OrbitError::IntegrityViolation(_) => StatusCode::CONFLICT,
            OrbitError::Json(_) | OrbitError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorBody {
            reason: self.0.reason(),
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
