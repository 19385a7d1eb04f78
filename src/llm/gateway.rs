//! Rate-limited, retrying front for an [`LlmClient`]

use super::rate_limiter::RateLimiter;
use super::retry::RetryPolicy;
use super::{build_client, LlmClient, Message};
use crate::config::Config;
use crate::error::{ErrorKind, LlmError};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

pub struct LlmGateway {
    client: Arc<dyn LlmClient>,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
}

impl LlmGateway {
    pub fn new(client: Arc<dyn LlmClient>, limiter: Arc<RateLimiter>, retry: RetryPolicy) -> Self {
        Self {
            client,
            limiter,
            retry,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, LlmError> {
        Ok(Self::new(
            build_client(config)?,
            Arc::new(RateLimiter::new(&config.rate_limits)),
            RetryPolicy::new(&config.retry),
        ))
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }
}

#[async_trait]
impl LlmClient for LlmGateway {
    fn model(&self) -> &str {
        self.client.model()
    }

    /// Count the call against the model's window, then send it with retry.
    /// A provider-side rate limit starts a cooldown and is returned as
    /// `RateLimited` so the caller can report the wait.
    async fn chat(&self, messages: &[Message]) -> Result<String, LlmError> {
        let model = self.client.model().to_string();
        self.limiter.check_rate_limit(&model)?;

        match self.retry.run(&model, || self.client.chat(messages)).await {
            Err(e) if e.kind() == ErrorKind::RateLimit && !matches!(e, LlmError::RateLimited { .. }) => {
                let retry_after_ms = self.limiter.note_rate_limited(&model);
                warn!("Provider rate limited {}: {}", model, e);
                Err(LlmError::RateLimited {
                    model,
                    retry_after_ms,
                })
            }
            other => other,
        }
    }

    async fn health_check(&self) -> Result<(), LlmError> {
        self.client.health_check().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ModelLimit, RateLimitConfig, RetryConfig};
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Flaky {
        calls: AtomicU32,
        failures: u32,
        status: u16,
    }

    #[async_trait]
    impl LlmClient for Flaky {
        fn model(&self) -> &str {
            "modelX"
        }

        async fn chat(&self, _messages: &[Message]) -> Result<String, LlmError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(LlmError::Api {
                    status: self.status,
                    message: "upstream".to_string(),
                })
            } else {
                Ok("ok".to_string())
            }
        }

        async fn health_check(&self) -> Result<(), LlmError> {
            Ok(())
        }
    }

    fn gateway(failures: u32, status: u16, requests: u32) -> (LlmGateway, Arc<Flaky>) {
        let client = Arc::new(Flaky {
            calls: AtomicU32::new(0),
            failures,
            status,
        });
        let mut limits = RateLimitConfig::default();
        limits.models.insert(
            "modelX".to_string(),
            ModelLimit {
                requests_per_window: requests,
                window_ms: 60_000,
                retry_delay_ms: 1_000,
            },
        );
        let retry = RetryPolicy::new(&RetryConfig {
            max_retries: 3,
            initial_delay_ms: 1,
            min_interval_ms: 0,
        });
        let gateway = LlmGateway::new(
            client.clone(),
            Arc::new(RateLimiter::new(&limits)),
            retry,
        );
        (gateway, client)
    }

    #[tokio::test]
    async fn test_overload_retried_transparently() {
        let (gateway, client) = gateway(1, 503, 10);
        assert_eq!(gateway.chat(&[Message::user("hi")]).await.unwrap(), "ok");
        assert_eq!(client.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_local_limit_blocks_before_calling() {
        let (gateway, client) = gateway(0, 200, 1);
        gateway.chat(&[Message::user("1")]).await.unwrap();

        let err = gateway.chat(&[Message::user("2")]).await.unwrap_err();
        assert!(matches!(err, LlmError::RateLimited { .. }));
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_provider_429_starts_cooldown() {
        let (gateway, client) = gateway(5, 429, 10);

        let err = gateway.chat(&[Message::user("hi")]).await.unwrap_err();
        assert!(matches!(err, LlmError::RateLimited { retry_after_ms: 1_000, .. }));
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
        assert!(gateway.limiter().cooldown_status("modelX").is_some());
    }
}
