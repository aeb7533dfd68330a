//! The gateway: the HTTP/SSE surface described in §6, built on top of the
//! State Machine, Progress Bus, and Feedback Capture crates. Context
//! assembly, skill selection, and search live on the dispatch path, not
//! here — this crate only ever does request/response work.

/// Wire request/response shapes for the §6 interfaces.
pub mod dto;
/// Maps [`orbit_core::OrbitError`] onto HTTP responses.
pub mod error;
/// Auth and rate-limit `axum` middleware.
pub mod middleware;
/// Per-key token-bucket rate limiting.
pub mod rate_limit;
/// One module per interface group, each exporting a `router()`.
pub mod routes;
/// Router assembly and the shared [`AppState`].
pub mod server;

pub use error::ApiError;
pub use rate_limit::RateLimiter;
pub use server::{AppState, GatewayServer};
