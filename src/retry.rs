//! # Retry With Backoff
//!
//! Exponential backoff with jitter, kept from the teacher's `pub mod retry`. Used by the
//! chat adapters for transient failures opening a model stream — never for reconnecting
//! mid-stream, which is out of scope (spec §11).

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::error::Result;

/// Backoff policy: attempt count, base delay, and a cap on the maximum delay.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `attempt` (0-indexed), doubling each time and capped at
    /// `max_delay`, with up to 20% jitter added to avoid synchronized retries across agents.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.saturating_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX));
        let capped = exp.min(self.max_delay);
        let jitter_fraction = rand::thread_rng().gen_range(0.0..0.2);
        capped.mul_f64(1.0 + jitter_fraction)
    }
}

/// Run `f` up to `policy.max_attempts` times, sleeping `policy.delay_for(attempt)` between
/// failures. Returns the last error if every attempt fails.
pub async fn retry<F, Fut, T>(policy: RetryPolicy, mut f: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                attempt += 1;
                if attempt >= policy.max_attempts {
                    return Err(err);
                }
                log::debug!("retry: attempt {attempt} failed: {err}, backing off");
                tokio::time::sleep(policy.delay_for(attempt - 1)).await;
            }
        }
    }
}
