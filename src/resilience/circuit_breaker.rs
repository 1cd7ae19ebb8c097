// Copyright 2025 Assistance Micro Design
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Circuit breaker for external-service resilience.
//!
//! Prevents cascade failures when a remote dependency becomes
//! unhealthy. Three states:
//!
//! - **Closed**: normal operation, requests pass through
//! - **Open**: dependency unhealthy, requests are rejected immediately
//! - **HalfOpen**: testing recovery, requests pass through until the
//!   success threshold closes the circuit again
//!
//! ## Transitions
//!
//! - Closed -> Open after `failure_threshold` consecutive failures
//! - Open -> HalfOpen once `timeout` has elapsed since the last failure
//! - HalfOpen -> Closed after `success_threshold` consecutive successes
//! - HalfOpen -> Open on any failure
//!
//! State is process-local and all transitions for one breaker are
//! serialized behind its mutex.

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Default consecutive failures before opening the circuit
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
/// Default consecutive half-open successes before closing again
pub const DEFAULT_SUCCESS_THRESHOLD: u32 = 2;
/// Default wait before attempting recovery (60 seconds)
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation, requests pass through
    #[default]
    Closed,
    /// Dependency unhealthy, requests rejected immediately
    Open,
    /// Testing recovery
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Circuit breaker configuration
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening the circuit
    pub failure_threshold: u32,
    /// Time to wait before attempting recovery
    pub timeout: Duration,
    /// Consecutive half-open successes needed to close the circuit
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            success_threshold: DEFAULT_SUCCESS_THRESHOLD,
        }
    }
}

/// Error returned by [`CircuitBreaker::execute`].
#[derive(Debug)]
pub enum CircuitError<E> {
    /// The circuit is open; the operation was not attempted
    Open {
        /// Breaker name
        name: String,
        /// Remaining time before a recovery attempt is allowed
        retry_after: Duration,
    },
    /// The operation ran and failed with its own error
    Inner(E),
}

impl<E: fmt::Display> fmt::Display for CircuitError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitError::Open { name, retry_after } => write!(
                f,
                "Circuit breaker '{}' is open: retry in {}s",
                name,
                retry_after.as_secs()
            ),
            CircuitError::Inner(e) => write!(f, "{}", e),
        }
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for CircuitError<E> {}

/// Mutable breaker state, guarded by the breaker mutex.
#[derive(Debug, Default)]
struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_failure: Option<Instant>,
    total_calls: u64,
    total_failures: u64,
    total_successes: u64,
}

/// Monitoring snapshot of one breaker.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitBreakerSnapshot {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    pub total_calls: u64,
    pub total_failures: u64,
    pub total_successes: u64,
}

/// Circuit breaker protecting calls to one named dependency.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    /// Creates a breaker with custom configuration.
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            state: Mutex::new(BreakerState::default()),
        }
    }

    /// Creates a breaker with the default thresholds.
    pub fn with_defaults(name: impl Into<String>) -> Self {
        Self::new(name, CircuitBreakerConfig::default())
    }

    /// Executes an operation through the breaker.
    ///
    /// Checks the state atomically: if the circuit is open and the
    /// timeout has not elapsed the call fails fast without touching
    /// the dependency; otherwise the operation runs and its outcome is
    /// recorded. The breaker mutex is held for the duration, so calls
    /// to one dependency are serialized with its transitions.
    pub async fn execute<T, E, F, Fut>(&self, operation: F) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut state = self.state.lock().await;
        state.total_calls += 1;

        if state.state == CircuitState::Open {
            let elapsed = state
                .last_failure
                .map(|t| t.elapsed())
                .unwrap_or(self.config.timeout);

            if elapsed >= self.config.timeout {
                debug!(breaker = %self.name, "Circuit breaker transitioning to half-open");
                state.state = CircuitState::HalfOpen;
                state.failure_count = 0;
                state.success_count = 0;
            } else {
                return Err(CircuitError::Open {
                    name: self.name.clone(),
                    retry_after: self.config.timeout - elapsed,
                });
            }
        }

        match operation().await {
            Ok(result) => {
                self.record_success(&mut state);
                Ok(result)
            }
            Err(e) => {
                self.record_failure(&mut state);
                Err(CircuitError::Inner(e))
            }
        }
    }

    fn record_success(&self, state: &mut BreakerState) {
        state.total_successes += 1;
        state.failure_count = 0;

        if state.state == CircuitState::HalfOpen {
            state.success_count += 1;
            if state.success_count >= self.config.success_threshold {
                debug!(breaker = %self.name, "Circuit breaker closing after recovery");
                state.state = CircuitState::Closed;
                state.success_count = 0;
            }
        }
    }

    fn record_failure(&self, state: &mut BreakerState) {
        state.total_failures += 1;
        state.failure_count += 1;
        state.last_failure = Some(Instant::now());

        match state.state {
            CircuitState::HalfOpen => {
                // Recovery failed, go back to open
                warn!(breaker = %self.name, "Circuit breaker reopening after failed recovery attempt");
                state.state = CircuitState::Open;
                state.success_count = 0;
            }
            CircuitState::Closed => {
                if state.failure_count >= self.config.failure_threshold {
                    warn!(
                        breaker = %self.name,
                        failure_count = state.failure_count,
                        threshold = self.config.failure_threshold,
                        "Circuit breaker opening after consecutive failures"
                    );
                    state.state = CircuitState::Open;
                }
            }
            CircuitState::Open => {}
        }
    }

    /// Returns the current state of the circuit.
    pub async fn state(&self) -> CircuitState {
        self.state.lock().await.state
    }

    /// Returns a monitoring snapshot.
    pub async fn snapshot(&self) -> CircuitBreakerSnapshot {
        let state = self.state.lock().await;
        CircuitBreakerSnapshot {
            name: self.name.clone(),
            state: state.state,
            failure_count: state.failure_count,
            success_count: state.success_count,
            total_calls: state.total_calls,
            total_failures: state.total_failures,
            total_successes: state.total_successes,
        }
    }

    /// Resets the breaker to closed. For tests and manual intervention.
    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        state.state = CircuitState::Closed;
        state.failure_count = 0;
        state.success_count = 0;
        debug!(breaker = %self.name, "Circuit breaker manually reset");
    }
}

/// Registry of named circuit breakers, lazily created.
#[derive(Default)]
pub struct BreakerRegistry {
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
}

impl BreakerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the breaker for `name`, creating it with `config` on
    /// first use. The config of an existing breaker is not changed.
    pub async fn get_or_create(
        &self,
        name: &str,
        config: CircuitBreakerConfig,
    ) -> Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock().await;
        breakers
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(name, config)))
            .clone()
    }

    /// Returns the breaker for `name` with default config.
    pub async fn get(&self, name: &str) -> Arc<CircuitBreaker> {
        self.get_or_create(name, CircuitBreakerConfig::default())
            .await
    }

    /// Snapshots every registered breaker for monitoring.
    pub async fn all_snapshots(&self) -> Vec<CircuitBreakerSnapshot> {
        let breakers = self.breakers.lock().await;
        let mut snapshots = Vec::with_capacity(breakers.len());
        for breaker in breakers.values() {
            snapshots.push(breaker.snapshot().await);
        }
        snapshots
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(failures: u32, successes: u32, timeout: Duration) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: failures,
            success_threshold: successes,
            timeout,
        }
    }

    async fn fail(cb: &CircuitBreaker) -> Result<(), CircuitError<&'static str>> {
        cb.execute(|| async { Err::<(), _>("boom") }).await.map(|_| ())
    }

    async fn succeed(cb: &CircuitBreaker) -> Result<(), CircuitError<&'static str>> {
        cb.execute(|| async { Ok::<_, &'static str>(()) }).await
    }

    #[tokio::test]
    async fn test_initial_state_is_closed() {
        let cb = CircuitBreaker::with_defaults("test");
        assert_eq!(cb.state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_opens_after_threshold_failures() {
        let cb = CircuitBreaker::new("test", test_config(3, 2, Duration::from_secs(60)));

        fail(&cb).await.unwrap_err();
        assert_eq!(cb.state().await, CircuitState::Closed);
        fail(&cb).await.unwrap_err();
        assert_eq!(cb.state().await, CircuitState::Closed);
        fail(&cb).await.unwrap_err();
        assert_eq!(cb.state().await, CircuitState::Open);
    }

    #[tokio::test]
    async fn test_success_resets_failure_count() {
        let cb = CircuitBreaker::new("test", test_config(3, 2, Duration::from_secs(60)));

        fail(&cb).await.unwrap_err();
        fail(&cb).await.unwrap_err();
        succeed(&cb).await.unwrap();
        fail(&cb).await.unwrap_err();
        fail(&cb).await.unwrap_err();

        // Still closed: the success reset the streak
        assert_eq!(cb.state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_rejects_fast_when_open() {
        let cb = CircuitBreaker::new("test", test_config(1, 2, Duration::from_secs(60)));
        fail(&cb).await.unwrap_err();

        let err = succeed(&cb).await.unwrap_err();
        match err {
            CircuitError::Open { name, retry_after } => {
                assert_eq!(name, "test");
                assert!(retry_after > Duration::from_secs(50));
            }
            CircuitError::Inner(_) => panic!("Expected fast rejection"),
        }

        // The rejected call never reached the operation
        let snap = cb.snapshot().await;
        assert_eq!(snap.total_failures, 1);
        assert_eq!(snap.total_calls, 2);
    }

    #[tokio::test]
    async fn test_half_open_after_timeout_then_closes() {
        let cb = CircuitBreaker::new("test", test_config(1, 2, Duration::from_millis(10)));
        fail(&cb).await.unwrap_err();
        assert_eq!(cb.state().await, CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(20)).await;

        // First success after timeout: probe allowed, still half-open
        succeed(&cb).await.unwrap();
        assert_eq!(cb.state().await, CircuitState::HalfOpen);

        // Second consecutive success closes the circuit
        succeed(&cb).await.unwrap();
        assert_eq!(cb.state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_half_open_failure_reopens() {
        let cb = CircuitBreaker::new("test", test_config(1, 2, Duration::from_millis(10)));
        fail(&cb).await.unwrap_err();

        tokio::time::sleep(Duration::from_millis(20)).await;
        fail(&cb).await.unwrap_err();
        assert_eq!(cb.state().await, CircuitState::Open);

        // And it rejects again until the next timeout window
        assert!(matches!(
            succeed(&cb).await.unwrap_err(),
            CircuitError::Open { .. }
        ));
    }

    #[tokio::test]
    async fn test_totals_accumulate() {
        let cb = CircuitBreaker::with_defaults("test");
        succeed(&cb).await.unwrap();
        succeed(&cb).await.unwrap();
        fail(&cb).await.unwrap_err();

        let snap = cb.snapshot().await;
        assert_eq!(snap.total_calls, 3);
        assert_eq!(snap.total_successes, 2);
        assert_eq!(snap.total_failures, 1);
    }

    #[tokio::test]
    async fn test_reset() {
        let cb = CircuitBreaker::new("test", test_config(1, 2, Duration::from_secs(60)));
        fail(&cb).await.unwrap_err();
        assert_eq!(cb.state().await, CircuitState::Open);

        cb.reset().await;
        assert_eq!(cb.state().await, CircuitState::Closed);
        succeed(&cb).await.unwrap();
    }

    #[tokio::test]
    async fn test_registry_lazily_creates_and_reuses() {
        let registry = BreakerRegistry::new();
        let a = registry.get("stock-data").await;
        let b = registry.get("stock-data").await;
        assert!(Arc::ptr_eq(&a, &b));

        let snapshots = registry.all_snapshots().await;
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].name, "stock-data");
    }

    #[tokio::test]
    async fn test_registry_separate_names_are_independent() {
        let registry = BreakerRegistry::new();
        let stock = registry
            .get_or_create("stock-data", test_config(1, 1, Duration::from_secs(60)))
            .await;
        let news = registry.get("news").await;

        fail(&stock).await.unwrap_err();
        assert_eq!(stock.state().await, CircuitState::Open);
        assert_eq!(news.state().await, CircuitState::Closed);
    }
}
