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

//! # Retry with exponential backoff
//!
//! Handles transient failures (network issues, rate limits, server
//! errors) while failing fast on non-recoverable errors. The caller
//! supplies a predicate deciding which errors are retryable; anything
//! else propagates immediately.
//!
//! Delay grows as `min(initial * base^attempt, max)`, multiplied by a
//! `0.5 + rand * 0.5` factor when jitter is enabled so synchronized
//! clients do not hammer a recovering service in lockstep.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use crate::resilience::retry::{retry, RetryConfig};
//!
//! let result = retry(
//!     || async { client.call_tool("get_stock_price", args.clone()).await },
//!     &RetryConfig::mcp(),
//!     |err| err.is_transient(),
//! ).await;
//! ```

use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total number of attempts, including the first one
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound on the computed delay
    pub max_delay: Duration,
    /// Multiplier for exponential growth
    pub exponential_base: f64,
    /// Randomize delays to avoid thundering herds
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            exponential_base: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Profile for tool-server calls: 3 tries, 1s -> 10s.
    pub fn mcp() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            ..Self::default()
        }
    }

    /// Profile for storage-layer calls: 3 tries, 0.5s -> 5s.
    pub fn database() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
            ..Self::default()
        }
    }

    /// Profile for third-party APIs: 5 tries, 2s -> 60s.
    pub fn external_api() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
            ..Self::default()
        }
    }

    /// Profile for cheap idempotent calls: 2 tries, 0.1s -> 1s, no jitter.
    pub fn quick() -> Self {
        Self {
            max_attempts: 2,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
            jitter: false,
            ..Self::default()
        }
    }

    /// Looks up a predefined profile by name, falling back to defaults.
    pub fn profile(name: &str) -> Self {
        match name {
            "mcp" => Self::mcp(),
            "database" => Self::database(),
            "external_api" => Self::external_api(),
            "quick" => Self::quick(),
            _ => Self::default(),
        }
    }

    /// Computes the backoff delay for a 0-indexed attempt.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponential =
            self.initial_delay.as_secs_f64() * self.exponential_base.powi(attempt as i32);
        let capped = exponential.min(self.max_delay.as_secs_f64());

        let with_jitter = if self.jitter {
            capped * (0.5 + rand::random::<f64>() * 0.5)
        } else {
            capped
        };

        Duration::from_secs_f64(with_jitter)
    }
}

/// Error returned by [`retry`].
#[derive(Debug)]
pub enum RetryError<E> {
    /// Every attempt failed with a retryable error
    Exhausted {
        /// Number of attempts made
        attempts: u32,
        /// The error from the final attempt
        last_error: E,
    },
    /// A non-retryable error propagated immediately
    Fatal(E),
}

impl<E> RetryError<E> {
    /// Unwraps the underlying error either way.
    pub fn into_inner(self) -> E {
        match self {
            RetryError::Exhausted { last_error, .. } => last_error,
            RetryError::Fatal(e) => e,
        }
    }
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryError::Exhausted {
                attempts,
                last_error,
            } => write!(
                f,
                "Retry exhausted after {} attempts. Last error: {}",
                attempts, last_error
            ),
            RetryError::Fatal(e) => write!(f, "{}", e),
        }
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for RetryError<E> {}

/// Executes an async operation with retry and exponential backoff.
///
/// Invokes `operation` at most `config.max_attempts` times. Errors for
/// which `is_retryable` returns false propagate immediately as
/// [`RetryError::Fatal`]; when every attempt fails the result is
/// [`RetryError::Exhausted`] carrying the attempt count and last error.
pub async fn retry<T, E, F, Fut, P>(
    operation: F,
    config: &RetryConfig,
    is_retryable: P,
) -> Result<T, RetryError<E>>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: fmt::Display,
{
    let max_attempts = config.max_attempts.max(1);

    for attempt in 0..max_attempts {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    debug!(attempt = attempt + 1, "Operation succeeded after retrying");
                }
                return Ok(result);
            }
            Err(error) => {
                if !is_retryable(&error) {
                    debug!(error = %error, "Non-retryable error, failing immediately");
                    return Err(RetryError::Fatal(error));
                }

                if attempt + 1 >= max_attempts {
                    warn!(
                        attempts = max_attempts,
                        error = %error,
                        "Retry attempts exhausted"
                    );
                    return Err(RetryError::Exhausted {
                        attempts: max_attempts,
                        last_error: error,
                    });
                }

                let delay = config.delay_for_attempt(attempt);
                warn!(
                    attempt = attempt + 1,
                    max_attempts = max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Retrying after transient error"
                );
                sleep(delay).await;
            }
        }
    }

    unreachable!("loop returns on the final attempt")
}
