use std::{fmt::Display, future::Future, time::Duration};

use rand::Rng;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::error::LaasError;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_total_time: Duration,
    /// Upper bound for a single backoff sleep.
    pub max_delay: Duration,
    /// Time that must remain in the budget before another attempt is started.
    pub attempt_reserve: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_total_time: Duration::from_secs(120),
            max_delay: Duration::from_secs(30),
            attempt_reserve: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn backoff(&self, attempt: u32) -> Duration {
        let jitter = rand::thread_rng().gen_range(0.0..1.0);
        self.backoff_with_jitter(attempt, jitter)
    }

    pub fn backoff_with_jitter(&self, attempt: u32, jitter: f64) -> Duration {
        let exp = self.base_delay.as_secs_f64() * 2f64.powi(attempt.min(30) as i32) + jitter;
        Duration::from_secs_f64(exp.min(self.max_delay.as_secs_f64()))
    }
}

/// Runs `op` until it succeeds, the attempts run out, or the time budget is spent.
///
/// `op` receives the zero-based attempt number. `sleep` is awaited between
/// failed attempts with the computed backoff, so callers decide how waiting
/// happens (`tokio::time::sleep` in production).
pub async fn retry_with_backoff<T, E, Op, Fut, Sleep, SleepFut>(
    policy: &RetryPolicy,
    mut op: Op,
    mut sleep: Sleep,
) -> Result<T, LaasError>
where
    E: Display,
    Op: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    Sleep: FnMut(Duration) -> SleepFut,
    SleepFut: Future<Output = ()>,
{
    let start = Instant::now();
    let total_attempts = policy.max_retries + 1;

    for attempt in 0..total_attempts {
        let elapsed = start.elapsed();
        if elapsed >= policy.max_total_time {
            return Err(LaasError::Timeout(format!(
                "invocation exceeded the maximum total time of {}s",
                policy.max_total_time.as_secs_f64()
            )));
        }

        info!(attempt = attempt + 1, total_attempts, "invoking model");
        let failure = match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) => e.to_string(),
        };
        warn!(attempt = attempt + 1, error = %failure, "model attempt failed");

        if attempt + 1 == total_attempts {
            return Err(LaasError::Generation(format!(
                "invocation failed after {total_attempts} attempts: {failure}"
            )));
        }

        let elapsed = start.elapsed();
        if elapsed >= policy.max_total_time.saturating_sub(policy.attempt_reserve) {
            return Err(LaasError::Timeout(format!(
                "not enough time remaining for another attempt, elapsed {:.2}s",
                elapsed.as_secs_f64()
            )));
        }

        let delay = policy.backoff(attempt);
        info!(delay_secs = delay.as_secs_f64(), "retrying model call");
        sleep(delay).await;
    }

    Err(LaasError::Generation("maximum retry attempts exceeded".into()))
}
