//! Bounded retry with fixed or doubling delays.
//!
//! Room processes take a moment to become reachable after they start,
//! and may be briefly unavailable later on. Every caller that tolerates
//! this uses a [`RetryPolicy`] rather than its own loop, so tests can
//! swap in [`RetryPolicy::immediate`] and never sleep.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{GatewayError, RetryExhausted};

/// How the delay grows between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backoff {
    /// Same delay every time.
    #[default]
    Fixed,
    /// Delay doubles after each failure.
    Exponential,
}

/// Maximum attempts plus the delay between them.
///
/// There is no overall deadline: the bound is the attempt count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. 0 is treated as 1.
    pub max_attempts: u32,
    /// Delay after the first failure.
    pub delay: Duration,
    pub backoff: Backoff,
}

impl RetryPolicy {
    /// `max_attempts` attempts, `delay` apart.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
            backoff: Backoff::Fixed,
        }
    }

    /// No delay between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::fixed(max_attempts, Duration::ZERO)
    }

    /// Readiness handshake against a freshly started room: 3 attempts, 2 s apart.
    pub fn handshake() -> Self {
        Self::fixed(3, Duration::from_secs(2))
    }

    /// Steady-state queries: 5 attempts, 2 s apart.
    pub fn query() -> Self {
        Self::fixed(5, Duration::from_secs(2))
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.delay,
            Backoff::Exponential => {
                let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
                self.delay.saturating_mul(factor)
            }
        }
    }

    /// Runs `op` until it succeeds or the attempts run out.
    ///
    /// `op` gets the 1-based attempt number. Each failure is logged at
    /// `warn` with that number; running out is logged at `error` and
    /// returned as [`RetryExhausted`] carrying the last error. There is
    /// no sleep after the final attempt.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, RetryExhausted>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        let max = self.attempts();
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::info!(op = label, attempt, "succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) if attempt < max => {
                    let delay = self.delay_after(attempt);
                    tracing::warn!(
                        op = label,
                        attempt,
                        max_attempts = max,
                        ?delay,
                        error = %e,
                        "attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    tracing::error!(
                        op = label,
                        attempts = attempt,
                        error = %e,
                        "giving up"
                    );
                    return Err(RetryExhausted {
                        op: label.to_string(),
                        attempts: attempt,
                        last: e,
                    });
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::query()
    }
}
