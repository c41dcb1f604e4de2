//! Capped exponential-backoff retry harness.
//!
//! Used by the Redis mailbox backends to ride out transient store errors and
//! by clients that poll a mailbox until a non-empty response arrives.
use std::future::Future;
use std::time::Duration;

/// Backoff policy for [`retry`]. The defaults match the poll-until-nonempty
/// schedule: ten attempts starting at 1 ms, doubling up to a 100 ms cap,
/// without jitter.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first.
    pub attempts: u32,
    /// Multiplier applied to the delay after each failed attempt.
    pub base_exp: u32,
    /// Delay before the second attempt.
    pub base_timeout: Duration,
    /// Upper bound on the delay between attempts.
    pub max_timeout: Duration,
    /// Scale every delay by a random factor in `(0, 1]`.
    pub random: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: 10,
            base_exp: 2,
            base_timeout: Duration::from_millis(1),
            max_timeout: Duration::from_millis(100),
            random: false,
        }
    }
}

/// Outcome of a single failed attempt.
#[derive(Debug)]
pub enum Attempt<E> {
    /// Transient failure; try again after the backoff delay.
    Retry(E),
    /// Unrecoverable failure; stop immediately and surface the error.
    Abort(E),
}

/// Drive `supplier` until it succeeds, aborts, or the attempt budget runs
/// out. The last transient error is returned when the budget is exhausted.
pub async fn retry<T, E, F, Fut>(config: &RetryConfig, mut supplier: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Attempt<E>>>,
{
    let attempts = config.attempts.max(1);
    let mut delay = config.base_timeout;
    for attempt in 1..=attempts {
        let error = match supplier().await {
            Ok(value) => return Ok(value),
            Err(Attempt::Abort(error)) => return Err(error),
            Err(Attempt::Retry(error)) => error,
        };
        if attempt == attempts {
            return Err(error);
        }
        let wait = if config.random {
            delay.mul_f64(rand::random::<f64>().max(f64::EPSILON))
        } else {
            delay
        };
        tokio::time::sleep(wait).await;
        delay = (delay * config.base_exp).min(config.max_timeout);
    }
    unreachable!("the final attempt returns above")
}
