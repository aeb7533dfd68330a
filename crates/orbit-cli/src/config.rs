//! Environment-sourced configuration (§6 Environment).
//!
//! This binary's persistence engine is the file-backed stores this
//! workspace ships rather than a DSN-addressed database — there is no
//! connection string to parse, only a directory to lay the store files
//! out under. Everything else (host/port, breaker defaults,
//! retry policy, the `MOCK_LLM` toggle) comes from the environment, loaded
//! through `dotenvy` so a `.env` file works the same as an exported shell
//! variable.

use std::path::PathBuf;
use std::time::Duration;

/// Resolved process configuration. Every field has a default so `orbit
/// serve` works unconfigured against `./data`.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root directory for every file-backed store (§6 persisted-state
    /// layout's relational-store stand-in).
    pub data_dir: PathBuf,
    /// Gateway bind host.
    pub host: String,
    /// Gateway bind port.
    pub port: u16,
    /// Closed list of accepted API keys. Empty disables auth.
    pub api_keys: Vec<String>,
    /// Token-bucket burst size for the HTTP rate limiter.
    pub rate_limit_burst: f64,
    /// Token-bucket refill rate, tokens per second.
    pub rate_limit_rps: f64,
    /// Circuit-breaker consecutive-failure threshold, forwarded to any
    /// handler that guards its own outbound calls with [`orbit_kv::CircuitBreaker`].
    pub breaker_fail_max: u32,
    /// Circuit-breaker open-state cooldown before probing half-open.
    pub breaker_reset_timeout: Duration,
    /// Consecutive successes required in half-open before closing.
    pub breaker_success_threshold: u32,
    /// Ceiling on one handler invocation's wall time.
    pub handler_timeout: Duration,
    /// Pending tasks considered per dispatch poll.
    pub lease_batch: usize,
    /// Failed-task retry budget before escalation.
    pub max_retries: u32,
    /// Base exponential retry backoff.
    pub base_backoff: Duration,
    /// Retry backoff multiplier per attempt.
    pub backoff_factor: u32,
    /// Ceiling on computed retry backoff.
    pub backoff_cap: Duration,
    /// Expected handler heartbeat cadence.
    pub heartbeat_interval: Duration,
    /// Missed heartbeat intervals before a task is stale.
    pub stale_multiple: u32,
    /// Forces deterministic embedding and handler stubs for tests, per
    /// §6. Threaded through to any handler or embedding provider that
    /// checks it; this binary itself has no embedding provider to swap.
    pub mock_llm: bool,
}

impl Config {
    /// Load a `.env` file if present, then resolve every field from the
    /// environment, falling back to its documented default.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        Self {
            data_dir: env_path("ORBIT_DATA_DIR", "./data"),
            host: env_string("ORBIT_HOST", "0.0.0.0"),
            port: env_parse("ORBIT_PORT", 8080),
            api_keys: env_string("ORBIT_API_KEYS", "")
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            rate_limit_burst: env_parse("ORBIT_RATE_LIMIT_BURST", 50.0),
            rate_limit_rps: env_parse("ORBIT_RATE_LIMIT_RPS", 10.0),
            breaker_fail_max: env_parse("ORBIT_BREAKER_FAIL_MAX", 5),
            breaker_reset_timeout: Duration::from_secs(env_parse("ORBIT_BREAKER_RESET_SECS", 30)),
            breaker_success_threshold: env_parse("ORBIT_BREAKER_SUCCESS_THRESHOLD", 2),
            handler_timeout: Duration::from_secs(env_parse("ORBIT_HANDLER_TIMEOUT_SECS", 3600)),
            lease_batch: env_parse("ORBIT_LEASE_BATCH", 10),
            max_retries: env_parse("ORBIT_MAX_RETRIES", 3),
            base_backoff: Duration::from_secs(env_parse("ORBIT_BASE_BACKOFF_SECS", 30)),
            backoff_factor: env_parse("ORBIT_BACKOFF_FACTOR", 2),
            backoff_cap: Duration::from_secs(env_parse("ORBIT_BACKOFF_CAP_SECS", 900)),
            heartbeat_interval: Duration::from_secs(env_parse("ORBIT_HEARTBEAT_SECS", 30)),
            stale_multiple: env_parse("ORBIT_STALE_MULTIPLE", 5),
            mock_llm: env_parse("MOCK_LLM", false),
        }
    }
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_path(key: &str, default: &str) -> PathBuf {
    PathBuf::from(env_string(key, default))
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_parse_falls_back_on_absent_or_malformed() {
        assert_eq!(env_parse::<u16>("ORBIT_CLI_TEST_DOES_NOT_EXIST", 8080), 8080);
    }

    #[test]
    fn env_string_splits_api_keys_on_comma() {
        std::env::set_var("ORBIT_CLI_TEST_KEYS", "a, b ,c");
        let parsed: Vec<String> = env_string("ORBIT_CLI_TEST_KEYS", "")
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        assert_eq!(parsed, vec!["a", "b", "c"]);
        std::env::remove_var("ORBIT_CLI_TEST_KEYS");
    }
}
