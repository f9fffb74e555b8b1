use std::future::Future;
use std::time::Duration;

use failsafe::backoff::{self, GenRange, ThreadLocalGenRange};
use tracing::warn;

use crate::config::RetryConfig;
use crate::error::{AppError, Result};

/// Re-runs a transactional operation that the database aborted
/// (serialization failure or deadlock). Business errors surface at once.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: usize,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
            max_backoff,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.initial_backoff_ms),
            Duration::from_millis(config.max_backoff_ms),
        )
    }

    /// Exponential delays from `initial_backoff` capped at `max_backoff`,
    /// each one drawn from the upper half of its step. Millisecond
    /// granularity, so sub-second settings are fine.
    fn delays(&self) -> impl Iterator<Item = Duration> {
        let max = self.max_backoff;
        let mut rng = ThreadLocalGenRange;
        backoff::constant(self.initial_backoff)
            .enumerate()
            .map(move |(step, base)| {
                let ceiling = base.saturating_mul(1_u32 << step.min(16)).min(max);
                let half = u64::try_from(ceiling.as_millis() / 2).unwrap_or(u64::MAX / 2);
                Duration::from_millis(half + rng.gen_range(0, half + 1))
            })
            .take(self.max_attempts - 1)
    }

    pub async fn run<T, F, Fut>(&self, operation: &'static str, f: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.run_when(operation, AppError::is_transient, f).await
    }

    async fn run_when<T, F, Fut, P>(&self, operation: &'static str, retryable: P, mut f: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
        P: Fn(&AppError) -> bool,
    {
        let mut delays = self.delays();
        let mut attempt = 1;

        loop {
            match f().await {
                Err(err) if retryable(&err) => match delays.next() {
                    Some(delay) => {
                        warn!(operation, attempt, ?delay, error = %err, "transient failure, retrying");
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    None => return Err(err),
                },
                outcome => return outcome,
            }
        }
    }
}
