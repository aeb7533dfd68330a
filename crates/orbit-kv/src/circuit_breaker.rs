use crate::kv::Kv;
use chrono::Utc;
use orbit_core::{BreakerState, CircuitState, OrbitError, OrbitResult};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Tunable defaults for one named breaker (see the Circuit Breaker design's
/// `fail_max` / `reset_timeout` / `success_threshold` parameters).
#[derive(Debug, Clone, Copy)]
pub struct BreakerConfig {
    /// Consecutive failures in `Closed` before tripping to `Open`.
    pub fail_max: u32,
    /// How long `Open` holds before the first `half_open` trial is allowed.
    pub reset_timeout: Duration,
    /// Consecutive successes in `HalfOpen` required to close the breaker.
    pub success_threshold: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            fail_max: 5,
            reset_timeout: Duration::from_secs(30),
            success_threshold: 2,
        }
    }
}

/// One named circuit breaker, backed by a shared [`Kv`] so its state is
/// visible and atomically updated across every worker process.
///
/// `fail_max` is interpreted as *consecutive* failures; a windowed
/// variant is not implemented here.
pub struct CircuitBreaker {
    name: String,
    kv: Arc<dyn Kv>,
    config: BreakerConfig,
}

impl CircuitBreaker {
    /// Build a breaker named `name` over `kv`, defaulting every parameter.
    pub fn new(name: impl Into<String>, kv: Arc<dyn Kv>) -> Self {
        Self::with_config(name, kv, BreakerConfig::default())
    }

    /// Build a breaker with explicit tuning.
    pub fn with_config(name: impl Into<String>, kv: Arc<dyn Kv>, config: BreakerConfig) -> Self {
        Self {
            name: name.into(),
            kv,
            config,
        }
    }

    fn key(&self) -> String {
        format!("circuit_breaker:{}", self.name)
    }

    /// Read the current state, defaulting to a fresh `Closed` breaker if
    /// nothing has been recorded yet.
    pub async fn state(&self) -> OrbitResult<CircuitState> {
        match self.kv.get(&self.key()).await? {
            Some(v) => Ok(serde_json::from_value(v)?),
            None => Ok(CircuitState {
                name: self.name.clone(),
                state: BreakerState::Closed,
                failure_count: 0,
                success_count_in_half_open: 0,
                opened_at: None,
            }),
        }
    }

    async fn cas(&self, expected: Option<CircuitState>, new: CircuitState) -> OrbitResult<bool> {
        let expected_json = expected.map(|s| serde_json::to_value(s)).transpose()?;
        let new_json = serde_json::to_value(&new)?;
        self.kv.compare_and_swap(&self.key(), expected_json, new_json).await
    }

    /// Run `op` through the breaker, per the Circuit Breaker's call
    /// contract: fail fast with [`OrbitError::CircuitOpen`] while `Open`
    /// and the reset timeout has not elapsed; otherwise execute `op` and
    /// classify its outcome (`Ok` is success, `Err` is failure).
    pub async fn call<F, T>(&self, op: F) -> OrbitResult<T>
    where
        F: Future<Output = OrbitResult<T>>,
    {
        self.admit().await?;
        match op.await {
            Ok(value) => {
                self.record_success().await?;
                Ok(value)
            }
            Err(err) => {
                self.record_failure().await?;
                Err(err)
            }
        }
    }

    /// Decide whether a call is admitted right now, transitioning
    /// `Open → HalfOpen` as a side effect once `reset_timeout` has passed.
    async fn admit(&self) -> OrbitResult<()> {
        loop {
            let current = self.state().await?;
            match current.state {
                BreakerState::Closed | BreakerState::HalfOpen => return Ok(()),
                BreakerState::Open => {
                    let elapsed = current
                        .opened_at
                        .map(|t| Utc::now() - t)
                        .unwrap_or_default();
                    if elapsed
                        >= chrono::Duration::from_std(self.config.reset_timeout)
                            .unwrap_or_else(|_| chrono::Duration::zero())
                    {
                        let mut next = current.clone();
                        next.state = BreakerState::HalfOpen;
                        next.success_count_in_half_open = 0;
                        if self.cas(Some(current), next).await? {
                            info!(breaker = %self.name, "circuit breaker half-open trial");
                            return Ok(());
                        }
                        // lost the race to another worker; re-read and retry.
                        continue;
                    }
                    return Err(OrbitError::CircuitOpen {
                        breaker: self.name.clone(),
                    });
                }
            }
        }
    }

    async fn record_success(&self) -> OrbitResult<()> {
        loop {
            let current = self.state().await?;
            let mut next = current.clone();
            match current.state {
                BreakerState::Closed => {
                    if current.failure_count == 0 {
                        return Ok(());
                    }
                    next.failure_count = 0;
                }
                BreakerState::HalfOpen => {
                    next.success_count_in_half_open += 1;
                    if next.success_count_in_half_open >= self.config.success_threshold {
                        next.state = BreakerState::Closed;
                        next.failure_count = 0;
                        next.success_count_in_half_open = 0;
                        next.opened_at = None;
                        info!(breaker = %self.name, "circuit breaker closed");
                    }
                }
                BreakerState::Open => return Ok(()),
            }
            if self.cas(Some(current), next).await? {
                return Ok(());
            }
        }
    }

    async fn record_failure(&self) -> OrbitResult<()> {
        loop {
            let current = self.state().await?;
            let mut next = current.clone();
            match current.state {
                BreakerState::Closed => {
                    next.failure_count += 1;
                    if next.failure_count >= self.config.fail_max {
                        next.state = BreakerState::Open;
                        next.opened_at = Some(Utc::now());
                        warn!(breaker = %self.name, failures = next.failure_count, "circuit breaker opened");
                    }
                }
                BreakerState::HalfOpen => {
                    next.state = BreakerState::Open;
                    next.opened_at = Some(Utc::now());
                    next.success_count_in_half_open = 0;
                    warn!(breaker = %self.name, "circuit breaker re-opened on half-open failure");
                }
                BreakerState::Open => return Ok(()),
            }
            if self.cas(Some(current), next).await? {
                return Ok(());
            }
        }
    }

    /// Reset this breaker to a fresh `Closed` state. Tests (and the
    /// required `reset_all_breakers` equivalent of §9) use this to get a
    /// clean slate between runs without restarting the process.
    pub async fn reset(&self) -> OrbitResult<()> {
        self.kv.delete(&self.key()).await
    }
}

#[cfg(test)]
mod tests {
    use super::orbit_kv_test_support::*;
    use super::*;

    #[tokio::test]
    async fn opens_after_fail_max_consecutive_failures() {
        let kv = test_kv();
        let breaker = CircuitBreaker::with_config(
            "llm",
            kv,
            BreakerConfig {
                fail_max: 5,
                reset_timeout: Duration::from_millis(50),
                success_threshold: 2,
            },
        );

        for _ in 0..4 {
            let _ = breaker.call(failing_op()).await;
            assert_eq!(breaker.state().await.unwrap().state, BreakerState::Closed);
        }
        let _ = breaker.call(failing_op()).await;
        assert_eq!(breaker.state().await.unwrap().state, BreakerState::Open);

        let err = breaker.call(succeeding_op()).await.unwrap_err();
        assert!(matches!(err, OrbitError::CircuitOpen { .. }));
    }

    #[tokio::test]
    async fn half_open_closes_after_success_threshold() {
        let kv = test_kv();
        let breaker = CircuitBreaker::with_config(
            "llm",
            kv,
            BreakerConfig {
                fail_max: 2,
                reset_timeout: Duration::from_millis(10),
                success_threshold: 2,
            },
        );
        let _ = breaker.call(failing_op()).await;
        let _ = breaker.call(failing_op()).await;
        assert_eq!(breaker.state().await.unwrap().state, BreakerState::Open);

        tokio::time::sleep(Duration::from_millis(20)).await;

        breaker.call(succeeding_op()).await.unwrap();
        assert_eq!(breaker.state().await.unwrap().state, BreakerState::HalfOpen);
        breaker.call(succeeding_op()).await.unwrap();
        assert_eq!(breaker.state().await.unwrap().state, BreakerState::Closed);
    }

    #[tokio::test]
    async fn half_open_failure_reopens() {
        let kv = test_kv();
        let breaker = CircuitBreaker::with_config(
            "llm",
            kv,
            BreakerConfig {
                fail_max: 1,
                reset_timeout: Duration::from_millis(10),
                success_threshold: 2,
            },
        );
        let _ = breaker.call(failing_op()).await;
        assert_eq!(breaker.state().await.unwrap().state, BreakerState::Open);
        tokio::time::sleep(Duration::from_millis(20)).await;

        let _ = breaker.call(failing_op()).await;
        assert_eq!(breaker.state().await.unwrap().state, BreakerState::Open);
    }

    #[tokio::test]
    async fn success_in_closed_resets_failure_counter() {
        let kv = test_kv();
        let breaker = CircuitBreaker::new("llm", kv);
        let _ = breaker.call(failing_op()).await;
        let _ = breaker.call(failing_op()).await;
        assert_eq!(breaker.state().await.unwrap().failure_count, 2);

        breaker.call(succeeding_op()).await.unwrap();
        assert_eq!(breaker.state().await.unwrap().failure_count, 0);
    }
}
