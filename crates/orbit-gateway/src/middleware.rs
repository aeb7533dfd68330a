//! Authentication and rate-limiting middleware for the gateway.
//!
//! `auth_middleware`/`rate_limit_middleware` split: auth is a closed list
//! of API keys checked against a bearer header or `?api_key=`; rate
//! limiting runs after auth so a rejected caller never consumes a token.

use crate::rate_limit::RateLimiter;
use axum::{
    extract::{Query, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::warn;

/// API-key bearer/query authentication. Empty `api_keys` disables auth
/// entirely — the default for local/dev use.
#[derive(Clone, Default)]
pub struct AuthConfig {
    api_keys: Vec<String>,
}

impl AuthConfig {
    /// Build a config from a closed list of accepted keys.
    pub fn new(api_keys: Vec<String>) -> Self {
        Self { api_keys }
    }

    /// Whether at least one key is configured.
    pub fn is_enabled(&self) -> bool {
        !self.api_keys.is_empty()
    }
}

/// Shared state for both middleware layers.
pub struct MiddlewareState {
    /// Token-bucket limiter, keyed by the caller's API key (or a fixed
    /// anonymous key when auth is disabled).
    pub rate_limiter: Arc<RateLimiter>,
    /// API-key auth configuration.
    pub auth: AuthConfig,
}

#[derive(serde::Deserialize, Default)]
pub struct AuthQuery {
    api_key: Option<String>,
}

fn extract_key(headers: &HeaderMap, query: &AuthQuery) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
        .or_else(|| query.api_key.clone())
}

/// Reject requests lacking a recognized API key, when auth is enabled.
pub async fn auth_middleware(
    State(state): State<Arc<MiddlewareState>>,
    headers: HeaderMap,
    query: Query<AuthQuery>,
    request: Request,
    next: Next,
) -> Response {
    if !state.auth.is_enabled() {
        return next.run(request).await;
    }

    match extract_key(&headers, &query) {
        Some(key) if state.auth.api_keys.contains(&key) => next.run(request).await,
        Some(_) => {
            warn!("rejected request: invalid API key");
            (StatusCode::UNAUTHORIZED, "invalid API key").into_response()
        }
        None => {
            warn!("rejected request: missing API key");
            (StatusCode::UNAUTHORIZED, "API key required").into_response()
        }
    }
}

/// Rate-limit requests per API key (or a fixed anonymous key).
pub async fn rate_limit_middleware(
    State(state): State<Arc<MiddlewareState>>,
    headers: HeaderMap,
    query: Query<AuthQuery>,
    request: Request,
    next: Next,
) -> Response {
    let key = extract_key(&headers, &query).unwrap_or_else(|| "anonymous".to_string());

    if !state.rate_limiter.check(&key).await {
        warn!(key = %key, "rate limited request");
        return (StatusCode::TOO_MANY_REQUESTS, "rate limit exceeded").into_response();
    }

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_disabled_by_default() {
        assert!(!AuthConfig::default().is_enabled());
    }

    #[test]
    fn auth_enabled_with_keys() {
        assert!(AuthConfig::new(vec!["k1".into()]).is_enabled());
    }
}
