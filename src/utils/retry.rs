//! Connection retry helper.
//!
//! Every broker and store connection made at startup goes through
//! [`connect_with_retry`], so an unreachable dependency is retried a bounded
//! number of times and then reported as a terminal [`ConnectError`].

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::{info, warn};

use crate::utils::backoff::Backoff;
use crate::utils::error::ConnectError;

/// How many times to dial a dependency and how long to wait in between.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
    /// Double the delay after every failed attempt instead of keeping it fixed.
    pub exponential: bool,
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
            exponential: false,
        }
    }

    pub fn exponential(max_attempts: u32, initial: Duration) -> Self {
        Self {
            max_attempts,
            delay: initial,
            exponential: true,
        }
    }

    fn delays(&self) -> Box<dyn Iterator<Item = Duration> + Send> {
        if self.exponential {
            Box::new(Backoff::new(self.delay, self.max_attempts))
        } else {
            Box::new(std::iter::repeat(self.delay))
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(5, Duration::from_secs(5))
    }
}

/// Dials `target` until it succeeds or `policy.max_attempts` attempts failed.
///
/// A policy with zero attempts still dials once.
pub async fn connect_with_retry<T, E, F, Fut>(
    target: &str,
    mut dial: F,
    policy: &RetryPolicy,
) -> Result<T, ConnectError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let attempts = policy.max_attempts.max(1);
    let mut delays = policy.delays();
    let mut last_error = String::new();

    for attempt in 1..=attempts {
        match dial().await {
            Ok(connection) => {
                info!(dependency = target, attempt, "connected");
                return Ok(connection);
            }
            Err(e) => {
                warn!(
                    dependency = target,
                    attempt,
                    max = attempts,
                    error = %e,
                    "connection attempt failed"
                );
                last_error = e.to_string();
            }
        }

        if attempt < attempts {
            let delay = delays.next().unwrap_or(policy.delay);
            tokio::time::sleep(delay).await;
        }
    }

    Err(ConnectError {
        target: target.to_string(),
        attempts,
        last_error,
    })
}
