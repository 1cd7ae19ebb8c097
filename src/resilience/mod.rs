// Copyright 2025 Zileo-Chat-3 Contributors
// SPDX-License-Identifier: Apache-2.0

//! Resilience fabric: circuit breakers and retry with backoff.
//!
//! Every remote dependency is guarded by a named circuit breaker and
//! calls go through the retry executor with a per-profile backoff
//! policy. The two compose: retries run inside the breaker, so a
//! dependency that keeps failing trips its breaker and subsequent
//! calls fail fast without touching the network.

pub mod circuit_breaker;
pub mod retry;

pub use circuit_breaker::{
    BreakerRegistry, CircuitBreaker, CircuitBreakerConfig, CircuitError, CircuitState,
};
pub use retry::{retry, RetryConfig, RetryError};

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    /// The composed stack: each breaker call wraps a full retry cycle,
    /// so a dependency that keeps failing costs one breaker failure
    /// per exhausted cycle, and once the breaker opens the operation
    /// is not attempted at all.
    #[tokio::test]
    async fn test_retry_cycles_trip_breaker_then_fail_fast() {
        let breaker = CircuitBreaker::new(
            "stock-data",
            CircuitBreakerConfig {
                failure_threshold: 5,
                success_threshold: 2,
                timeout: Duration::from_secs(60),
            },
        );
        let retry_config = RetryConfig {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            exponential_base: 2.0,
            jitter: true,
        };
        let upstream_calls = Arc::new(AtomicU32::new(0));

        // Five consecutive exhausted retry cycles open the circuit
        for _ in 0..5 {
            let counter = upstream_calls.clone();
            let result: Result<(), _> = breaker
                .execute(|| async {
                    retry(
                        || {
                            let counter = counter.clone();
                            async move {
                                counter.fetch_add(1, Ordering::SeqCst);
                                Err::<(), _>("connection refused".to_string())
                            }
                        },
                        &retry_config,
                        |_| true,
                    )
                    .await
                })
                .await;
            assert!(matches!(result.unwrap_err(), CircuitError::Inner(_)));
        }
        assert_eq!(breaker.state().await, CircuitState::Open);
        assert_eq!(upstream_calls.load(Ordering::SeqCst), 15); // 5 cycles x 3 attempts

        // The sixth call is rejected without touching the upstream
        let counter = upstream_calls.clone();
        let start = std::time::Instant::now();
        let result: Result<(), _> = breaker
            .execute(|| async {
                retry(
                    || {
                        let counter = counter.clone();
                        async move {
                            counter.fetch_add(1, Ordering::SeqCst);
                            Err::<(), _>("connection refused".to_string())
                        }
                    },
                    &retry_config,
                    |_| true,
                )
                .await
            })
            .await;

        assert!(matches!(result.unwrap_err(), CircuitError::Open { .. }));
        assert_eq!(upstream_calls.load(Ordering::SeqCst), 15);
        assert!(start.elapsed() < Duration::from_millis(5));
    }
}
