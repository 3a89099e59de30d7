//! Retry policy and backoff delays.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::config::RetrySettings;

use super::ConnectionQuality;

/// Decides whether an outcome may be retried. `None` means no response arrived.
pub type RetryCondition = Arc<dyn Fn(Option<u16>) -> bool + Send + Sync>;

/// Source of jitter fractions in `[0, 1)`.
pub type JitterSource = Arc<dyn Fn() -> f64 + Send + Sync>;

/// Retries a missing response, any 5xx, 408 and 429.
pub fn default_retry_condition(status: Option<u16>) -> bool {
    match status {
        None => true,
        Some(code) => code >= 500 || code == 408 || code == 429,
    }
}

/// Uniformly random jitter.
pub fn random_jitter() -> JitterSource {
    Arc::new(rand::random::<f64>)
}

/// Always returns `fraction`. Useful for deterministic delays.
pub fn fixed_jitter(fraction: f64) -> JitterSource {
    Arc::new(move || fraction)
}

/// Effective retry policy for one call.
#[derive(Clone)]
pub struct RetryConfig {
    /// Cap on total attempts for one request, the first one included.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    /// Upper bound of the added jitter as a fraction of the backoff delay.
    pub jitter_ratio: f64,
    pub retry_condition: RetryCondition,
}

impl fmt::Debug for RetryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryConfig")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .field("backoff_multiplier", &self.backoff_multiplier)
            .field("jitter_ratio", &self.jitter_ratio)
            .finish_non_exhaustive()
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::from(&RetrySettings::default())
    }
}

impl From<&RetrySettings> for RetryConfig {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            base_delay: Duration::from_millis(settings.base_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
            backoff_multiplier: settings.backoff_multiplier,
            jitter_ratio: settings.jitter_ratio.clamp(0.0, 1.0),
            retry_condition: Arc::new(default_retry_condition),
        }
    }
}

impl RetryConfig {
    /// Applies per-call overrides on top of this policy.
    pub fn merged(&self, overrides: &RetryOverrides) -> Self {
        Self {
            max_retries: overrides.max_retries.unwrap_or(self.max_retries),
            base_delay: overrides.base_delay.unwrap_or(self.base_delay),
            max_delay: overrides.max_delay.unwrap_or(self.max_delay),
            backoff_multiplier: overrides
                .backoff_multiplier
                .unwrap_or(self.backoff_multiplier),
            jitter_ratio: self.jitter_ratio,
            retry_condition: overrides
                .retry_condition
                .clone()
                .unwrap_or_else(|| Arc::clone(&self.retry_condition)),
        }
    }

    pub fn should_retry(&self, status: Option<u16>) -> bool {
        (self.retry_condition)(status)
    }

    /// Exponential backoff after failed attempt number `attempt` (1-based),
    /// capped at `max_delay`. No jitter, no quality scaling.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(63) as i32;
        let raw = self.base_delay.as_millis() as f64 * self.backoff_multiplier.powi(exponent);
        let capped = raw.min(self.max_delay.as_millis() as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }

    /// Full delay after failed attempt number `attempt`:
    /// `backoff * (1 + jitter_ratio * jitter) * quality multiplier`.
    pub fn delay(&self, attempt: u32, jitter: f64, quality: ConnectionQuality) -> Duration {
        let backoff = self.backoff(attempt).as_millis() as f64;
        let jittered = backoff * (1.0 + self.jitter_ratio * jitter.clamp(0.0, 1.0));
        let scaled = jittered * quality.delay_multiplier();
        Duration::from_millis(scaled.round() as u64)
    }
}

/// Per-call changes to the default retry policy.
#[derive(Clone, Default)]
pub struct RetryOverrides {
    pub max_retries: Option<u32>,
    pub base_delay: Option<Duration>,
    pub max_delay: Option<Duration>,
    pub backoff_multiplier: Option<f64>,
    pub retry_condition: Option<RetryCondition>,
}

impl fmt::Debug for RetryOverrides {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryOverrides")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .field("backoff_multiplier", &self.backoff_multiplier)
            .field("retry_condition", &self.retry_condition.is_some())
            .finish()
    }
}

impl RetryOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = Some(delay);
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = Some(delay);
        self
    }

    pub fn backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = Some(multiplier);
        self
    }

    pub fn retry_condition<F>(mut self, condition: F) -> Self
    where
        F: Fn(Option<u16>) -> bool + Send + Sync + 'static,
    {
        self.retry_condition = Some(Arc::new(condition));
        self
    }
}
