//! One module per §6 interface group, each exporting a `router()` that
//! [`crate::server::GatewayServer`] merges onto the top-level [`axum::Router`].

/// Checker hook: `POST /tasks/{id}/check`.
pub mod checker;
/// Dashboard API: `GET /dashboard`.
pub mod dashboard;
/// Feedback API: `POST /feedback/{implicit,explicit}`, `GET /tasks/{id}/feedback`.
pub mod feedback;
/// Progress stream: `GET /tasks/{id}/progress` and its SSE subscription.
pub mod progress;
/// Task intake API: `POST /tasks`, `PATCH /tasks/{id}/status`, `GET /tasks`.
pub mod tasks;
