//! Progressive response delay.
//!
//! Slows brute-force attempts without fully blocking: each consecutive
//! failure doubles an artificial response delay, capped at one minute. A
//! small random jitter keeps an observer measuring response latency from
//! enumerating the exact attempt count.
//!
//! The delay sequence for the default configuration:
//! 1 -> 1s, 2 -> 2s, 3 -> 4s, 4 -> 8s, 5 -> 16s, 6 -> 32s, >= 7 -> 60s.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use rand::Rng;

use crate::{
    Error,
    store::{CounterStore, keys, read_count},
};

/// Backoff parameters for the delay policy.
#[derive(Debug, Clone)]
pub struct DelayConfig {
    pub base_delay_ms: u64,
    pub backoff_factor: f64,
    pub max_delay_ms: u64,
    /// Jitter band as a fraction of the base delay (0.1 = +/-10%).
    pub jitter_ratio: f64,
    /// TTL of the failure counter, refreshed on every increment.
    pub counter_ttl: Duration,
}

impl Default for DelayConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 1_000,
            backoff_factor: 2.0,
            max_delay_ms: 60_000,
            jitter_ratio: 0.1,
            counter_ttl: Duration::hours(1),
        }
    }
}

/// Computes and applies exponentially increasing response delays per IP.
pub struct ProgressiveDelayService<S: CounterStore> {
    store: Arc<S>,
    config: DelayConfig,
}

impl<S: CounterStore> ProgressiveDelayService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            config: DelayConfig::default(),
        }
    }

    pub fn with_config(mut self, config: DelayConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &DelayConfig {
        &self.config
    }

    fn counter_key(ip: &str) -> String {
        format!("{}{}", keys::DELAY, ip)
    }

    /// Base delay (no jitter) for a given attempt count.
    fn base_delay_ms(&self, attempts: i64) -> u64 {
        if attempts <= 0 {
            return 0;
        }
        let exp = self.config.backoff_factor.powi((attempts - 1) as i32);
        let raw = self.config.base_delay_ms as f64 * exp;
        raw.min(self.config.max_delay_ms as f64) as u64
    }

    /// Apply the jitter band and clamp at zero.
    fn with_jitter(&self, base_ms: u64) -> u64 {
        if base_ms == 0 {
            return 0;
        }
        let band = self.config.jitter_ratio * base_ms as f64;
        let jitter = rand::rng().random_range(-band..=band);
        (base_ms as f64 + jitter).max(0.0).round() as u64
    }

    /// Current delay for an IP based on its recorded failures.
    ///
    /// A missing counter and a store failure both resolve to zero delay
    /// (fail open, logged). Never blocks the caller indefinitely.
    pub async fn current_delay(&self, ip: &str) -> StdDuration {
        let attempts = match read_count(self.store.as_ref(), &Self::counter_key(ip)).await {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!(ip = %ip, error = %e, "Delay counter read failed, using zero delay");
                return StdDuration::ZERO;
            }
        };
        StdDuration::from_millis(self.with_jitter(self.base_delay_ms(attempts)))
    }

    /// Record a failed attempt and return the delay for the new count.
    ///
    /// A store failure resolves to zero delay (fail open, logged).
    pub async fn record_failed_attempt(&self, ip: &str) -> StdDuration {
        match self.try_record_failed_attempt(ip).await {
            Ok(delay) => delay,
            Err(e) => {
                tracing::warn!(ip = %ip, error = %e, "Delay counter update failed, using zero delay");
                StdDuration::ZERO
            }
        }
    }

    async fn try_record_failed_attempt(&self, ip: &str) -> Result<StdDuration, Error> {
        let key = Self::counter_key(ip);
        let attempts = self.store.incr(&key).await?;
        self.store.expire(&key, self.config.counter_ttl).await?;
        Ok(StdDuration::from_millis(
            self.with_jitter(self.base_delay_ms(attempts)),
        ))
    }

    /// Suspend the caller for the IP's current delay.
    ///
    /// A zero delay resolves immediately. This is the intentional suspension
    /// point of the pipeline; everything else about it fails open.
    pub async fn apply_delay(&self, ip: &str) {
        let delay = self.current_delay(ip).await;
        if delay.is_zero() {
            return;
        }
        tracing::debug!(ip = %ip, delay_ms = delay.as_millis() as u64, "Applying progressive delay");
        tokio::time::sleep(delay).await;
    }

    /// Delete the delay counter.
    pub async fn reset(&self, ip: &str) -> Result<(), Error> {
        self.store.del(&Self::counter_key(ip)).await
    }
}
