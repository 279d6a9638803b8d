use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::config::PersistenceConfig;

/// Bounded exponential backoff with jitter. One policy instance serves
/// every durable-write call site; only the classifier differs per call.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(300),
            max_jitter: Duration::from_millis(250),
        }
    }
}

impl From<&PersistenceConfig> for RetryPolicy {
    fn from(cfg: &PersistenceConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts.max(1),
            base_delay: Duration::from_millis(cfg.backoff_base_ms),
            max_jitter: Duration::from_millis(cfg.jitter_max_ms),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based): base doubled per
    /// failed attempt, plus uniform jitter.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponential = self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1));
        let jitter_ms = self.max_jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            0
        } else {
            rand::rng().random_range(0..=jitter_ms)
        };
        exponential + Duration::from_millis(jitter)
    }
}

/// Run `op` until it succeeds, the attempt budget is spent, or an error the
/// classifier marks non-transient occurs (those abort immediately).
pub async fn retry_with_backoff<T, E, Op, Fut, Cl>(
    policy: &RetryPolicy,
    is_transient: Cl,
    mut op: Op,
) -> Result<T, E>
where
    Op: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    Cl: Fn(&E) -> bool,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                attempt += 1;
                if attempt >= policy.max_attempts || !is_transient(&err) {
                    return Err(err);
                }
                tokio::time::sleep(policy.backoff_delay(attempt)).await;
            }
        }
    }
}
