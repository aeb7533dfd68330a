//! Gateway server assembly: wires every route group onto one [`Router`]
//! with auth and rate-limit middleware layered in
//! `GatewayServer::build_with_middleware`.

use crate::middleware::{auth_middleware, rate_limit_middleware, AuthConfig, MiddlewareState};
use crate::rate_limit::RateLimiter;
use crate::routes;
use axum::{middleware as axum_mw, routing::get, Router};
use orbit_feedback::FeedbackCapture;
use orbit_progress::ProgressBus;
use orbit_state::StateMachine;
use orbit_store::{AgentLog, FileEscalationStore, FileFeedbackStore, FileTaskStore};
use std::path::PathBuf;
use std::sync::Arc;

type Sm = StateMachine<FileTaskStore, FileEscalationStore>;

/// Shared resources handed to every route handler. Concrete over the
/// file-backed store implementations this workspace ships — the Store's
/// durable-engine choice is out of scope (§1), and a real deployment
/// swaps these for their Postgres/Redis-backed counterparts behind the
/// same traits without touching this struct's shape.
///
/// Context assembly (skills, profile, documents) is the Dispatcher's
/// concern, not the gateway's — it runs inside the handler invocation the
/// background dispatch loop drives, never on an HTTP request path.
pub struct AppState {
    pub tasks: Arc<FileTaskStore>,
    pub escalations: Arc<FileEscalationStore>,
    pub state_machine: Arc<Sm>,
    pub progress: Arc<ProgressBus>,
    pub feedback: Arc<FeedbackCapture<FileFeedbackStore>>,
    pub agent_log: Arc<AgentLog>,
    pub agent_log_dir: PathBuf,
}

/// Builds the gateway's [`Router`].
pub struct GatewayServer;

impl GatewayServer {
    /// Assemble the router without auth or rate limiting (local/dev use).
    pub fn build(state: Arc<AppState>) -> Router {
        Self::build_with_middleware(state, None, AuthConfig::default())
    }

    /// Assemble the router with the rate limiting and auth middleware the
    /// ambient stack requires of any externally-reachable surface.
    pub fn build_with_middleware(
        state: Arc<AppState>,
        rate_limiter: Option<Arc<RateLimiter>>,
        auth: AuthConfig,
    ) -> Router {
        let app = Router::new()
            .route("/health", get(health))
            .merge(routes::tasks::router())
            .merge(routes::progress::router())
            .merge(routes::dashboard::router())
            .merge(routes::feedback::router())
            .merge(routes::checker::router())
            .with_state(state);

        if rate_limiter.is_some() || auth.is_enabled() {
            let mw_state = Arc::new(MiddlewareState {
                rate_limiter: rate_limiter.unwrap_or_else(|| Arc::new(RateLimiter::new(1000.0, 1000.0))),
                auth,
            });
            app.layer(axum_mw::from_fn_with_state(mw_state.clone(), rate_limit_middleware))
                .layer(axum_mw::from_fn_with_state(mw_state, auth_middleware))
        } else {
            app
        }
    }
}

async fn health() -> &'static str {
    "ok"
}
