//! Retry with exponential backoff
//!
//! Dispatches on [`ErrorKind`]: transient failures are retried with a
//! doubling, jittered delay; rate limits and everything else are returned
//! to the caller straight away.

use crate::config::RetryConfig;
use crate::error::LlmError;
use rand::Rng;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

pub struct RetryPolicy {
    max_retries: u32,
    initial_delay: Duration,
    min_interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

/// `base` stretched by 0-10%
fn jittered(base: Duration) -> Duration {
    let factor = 1.0 + rand::thread_rng().gen_range(0.0..0.1);
    base.mul_f64(factor)
}

impl RetryPolicy {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries.max(1),
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            min_interval: Duration::from_millis(config.min_interval_ms),
            last_call: Mutex::new(None),
        }
    }

    /// Run `operation` up to `max_retries` times.
    ///
    /// Calls are spaced at least `min_interval` apart across the policy's
    /// lifetime. The last error is returned once attempts run out.
    pub async fn run<T, F, Fut>(&self, context: &str, mut operation: F) -> Result<T, LlmError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LlmError>>,
    {
        let mut delay = self.initial_delay;
        let mut attempt = 1;

        loop {
            self.wait_for_interval().await;
            let result = operation().await;
            *self.last_call.lock().await = Some(Instant::now());

            let error = match result {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            let kind = error.kind();
            if !kind.is_retryable() {
                debug!("{}: not retrying {:?} error", context, kind);
                return Err(error);
            }
            if attempt >= self.max_retries {
                warn!("{}: failed after {} attempts: {}", context, attempt, error);
                return Err(error);
            }

            let wait = jittered(delay);
            warn!(
                "{}: attempt {} failed ({}), retrying in {}ms",
                context,
                attempt,
                error,
                wait.as_millis()
            );
            tokio::time::sleep(wait).await;
            delay *= 2;
            attempt += 1;
        }
    }

    async fn wait_for_interval(&self) {
        let last = *self.last_call.lock().await;
        if let Some(last) = last {
            let since = last.elapsed();
            if since < self.min_interval {
                tokio::time::sleep(self.min_interval - since).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(min_interval_ms: u64) -> RetryPolicy {
        RetryPolicy::new(&RetryConfig {
            max_retries: 3,
            initial_delay_ms: 5,
            min_interval_ms,
        })
    }

    #[test]
    fn test_jitter_bounds() {
        let base = Duration::from_millis(1000);
        for _ in 0..50 {
            let d = jittered(base);
            assert!(d >= base && d <= Duration::from_millis(1100));
        }
    }

    #[tokio::test]
    async fn test_transient_error_retried() {
        let calls = AtomicU32::new(0);
        let result = policy(0)
            .run("test", || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(LlmError::Api {
                        status: 529,
                        message: "overloaded_error".to_string(),
                    })
                } else {
                    Ok("done")
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_rate_limit_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = policy(0)
            .run("test", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(LlmError::RateLimited {
                    model: "m".to_string(),
                    retry_after_ms: 1000,
                })
            })
            .await;

        assert!(matches!(result, Err(LlmError::RateLimited { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = policy(0)
            .run("test", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(LlmError::Timeout)
            })
            .await;

        assert!(matches!(result, Err(LlmError::Timeout)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_min_interval_between_calls() {
        let policy = policy(60);
        let start = Instant::now();

        policy.run("a", || async { Ok::<_, LlmError>(()) }).await.unwrap();
        policy.run("b", || async { Ok::<_, LlmError>(()) }).await.unwrap();

        assert!(start.elapsed() >= Duration::from_millis(60));
    }
}
