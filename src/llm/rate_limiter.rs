//! Per-model request windows and cooldowns
//!
//! Each model gets a fixed window of `requests_per_window` calls. Going
//! over the limit puts the model into cooldown for its retry delay, and
//! every call during a cooldown fails with the time still to wait.

use crate::config::{ModelLimit, RateLimitConfig};
use crate::error::LlmError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Upper bound for the cooldown applied after an upstream 429
const QUICK_COOLDOWN_MS: u64 = 5_000;

/// An active cooldown
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CooldownStatus {
    pub remaining_ms: u64,
    pub reset_time: DateTime<Utc>,
}

#[derive(Debug)]
struct WindowState {
    count: u32,
    window_start: Instant,
}

#[derive(Debug)]
struct Inner {
    default: ModelLimit,
    limits: HashMap<String, ModelLimit>,
    windows: HashMap<String, WindowState>,
    cooldowns: HashMap<String, Instant>,
}

impl Inner {
    fn limit_for(&self, model: &str) -> ModelLimit {
        self.limits.get(model).copied().unwrap_or(self.default)
    }

    fn cooldown_remaining(&self, model: &str, now: Instant) -> Option<Duration> {
        self.cooldowns
            .get(model)
            .and_then(|until| until.checked_duration_since(now))
            .filter(|d| !d.is_zero())
    }
}

pub struct RateLimiter {
    inner: Mutex<Inner>,
}

fn to_wall_clock(remaining: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(remaining)
        .map(|d| Utc::now() + d)
        .unwrap_or_else(|_| Utc::now())
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            inner: Mutex::new(Inner {
                default: config.default,
                limits: config.models.clone(),
                windows: HashMap::new(),
                cooldowns: HashMap::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Count one request against `model`'s window
    pub fn check_rate_limit(&self, model: &str) -> Result<(), LlmError> {
        let now = Instant::now();
        let mut guard = self.lock();
        let inner = &mut *guard;

        if let Some(remaining) = inner.cooldown_remaining(model, now) {
            return Err(LlmError::RateLimited {
                model: model.to_string(),
                retry_after_ms: remaining.as_millis() as u64,
            });
        }

        let limit = inner.limit_for(model);
        let window = inner
            .windows
            .entry(model.to_string())
            .or_insert(WindowState {
                count: 0,
                window_start: now,
            });

        if now.duration_since(window.window_start) >= Duration::from_millis(limit.window_ms) {
            window.count = 0;
            window.window_start = now;
        }

        if window.count >= limit.requests_per_window {
            let cooldown = Duration::from_millis(limit.retry_delay_ms);
            inner.cooldowns.insert(model.to_string(), now + cooldown);
            warn!("Rate limit exceeded for {}", model);
            return Err(LlmError::RateLimited {
                model: model.to_string(),
                retry_after_ms: limit.retry_delay_ms,
            });
        }

        window.count += 1;
        Ok(())
    }

    /// Put `model` into a short cooldown after the provider refused a
    /// request. Returns the cooldown length in milliseconds.
    pub fn note_rate_limited(&self, model: &str) -> u64 {
        let mut inner = self.lock();
        let cooldown_ms = inner.limit_for(model).retry_delay_ms.min(QUICK_COOLDOWN_MS);
        inner.cooldowns.insert(
            model.to_string(),
            Instant::now() + Duration::from_millis(cooldown_ms),
        );
        debug!("Quick cooldown for {}: {}ms", model, cooldown_ms);
        cooldown_ms
    }

    /// Apply the quick cooldown and wait it out
    pub async fn handle_rate_limit(&self, model: &str) {
        let cooldown_ms = self.note_rate_limited(model);
        tokio::time::sleep(Duration::from_millis(cooldown_ms)).await;
    }

    /// Requests left in the current window
    pub fn remaining_requests(&self, model: &str) -> u32 {
        let inner = self.lock();
        let used = inner.windows.get(model).map(|w| w.count).unwrap_or(0);
        inner.limit_for(model).requests_per_window.saturating_sub(used)
    }

    /// When the current window ends; now if no window is open
    pub fn reset_time(&self, model: &str) -> DateTime<Utc> {
        let inner = self.lock();
        match inner.windows.get(model) {
            Some(window) => {
                let end = window.window_start
                    + Duration::from_millis(inner.limit_for(model).window_ms);
                to_wall_clock(end.saturating_duration_since(Instant::now()))
            }
            None => Utc::now(),
        }
    }

    pub fn cooldown_status(&self, model: &str) -> Option<CooldownStatus> {
        let inner = self.lock();
        inner
            .cooldown_remaining(model, Instant::now())
            .map(|remaining| CooldownStatus {
                remaining_ms: remaining.as_millis() as u64,
                reset_time: to_wall_clock(remaining),
            })
    }

    /// Forget the window and cooldown of one model
    pub fn reset_limits(&self, model: &str) {
        let mut inner = self.lock();
        inner.windows.remove(model);
        inner.cooldowns.remove(model);
    }

    /// Forget every window and cooldown
    pub fn force_reset(&self) {
        let mut inner = self.lock();
        inner.windows.clear();
        inner.cooldowns.clear();
    }

    /// Replace the limit used for models without an explicit entry
    pub fn update_global_limits(&self, limit: ModelLimit) {
        self.lock().default = limit;
    }
}
