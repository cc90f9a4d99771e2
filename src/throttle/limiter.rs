//! Worker-pool facing throttle handle.
//!
//! Bundles a registry, scheduler and sweeper built from one
//! [`ThrottleConfig`]. Construct it when the pool starts, share it by
//! reference or `Arc`, and call [`DomainThrottle::shutdown`] when the pool
//! stops.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::config::ThrottleConfig;

use super::clock::{Clock, MonotonicClock};
use super::error::{ThrottleError, ThrottleResult};
use super::key::{extract_domain, normalize_key};
use super::registry::{PurgeReport, ThrottleRegistry};
use super::scheduler::ReservationScheduler;
use super::state::ThrottleStats;
use super::sweeper::{PurgeSweeper, SweeperHandle};

/// Per-domain politeness throttle.
pub struct DomainThrottle {
    scheduler: Arc<ReservationScheduler>,
    sweeper: PurgeSweeper,
    sweep_interval: Duration,
    sweeper_handle: Option<SweeperHandle>,
}

impl DomainThrottle {
    /// Build a throttle using the monotonic system clock. No background
    /// sweeper runs until [`start_sweeper`](Self::start_sweeper) is called.
    pub fn new(config: &ThrottleConfig) -> ThrottleResult<Self> {
        Self::with_clock(config, Arc::new(MonotonicClock))
    }

    /// Build a throttle on a custom clock.
    pub fn with_clock(config: &ThrottleConfig, clock: Arc<dyn Clock>) -> ThrottleResult<Self> {
        config.validate()?;

        let registry = Arc::new(ThrottleRegistry::with_shards(
            config.shards,
            config.lock_timeout(),
        ));
        let scheduler = Arc::new(ReservationScheduler::with_clock(
            registry.clone(),
            config.backoff_interval(),
            clock.clone(),
        ));
        let sweeper = PurgeSweeper::new(registry, clock, config.retention_window());

        Ok(Self {
            scheduler,
            sweeper,
            sweep_interval: config.sweep_interval(),
            sweeper_handle: None,
        })
    }

    /// Build a throttle and start its background sweeper.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(config: &ThrottleConfig) -> ThrottleResult<Self> {
        let mut throttle = Self::new(config)?;
        throttle.start_sweeper();
        Ok(throttle)
    }

    /// Start the background sweeper if it is not already running.
    pub fn start_sweeper(&mut self) {
        if self.sweeper_handle.is_none() {
            self.sweeper_handle = Some(self.sweeper.clone().spawn(self.sweep_interval));
        }
    }

    /// Reserve a slot for `key` without waiting.
    pub fn reserve(&self, key: &str) -> ThrottleResult<Duration> {
        self.scheduler.reserve_now(key)
    }

    /// Reserve a slot for `key` and sleep until it starts.
    ///
    /// The sleep holds no locks. Dropping the returned future cancels the
    /// wait, but the slot stays consumed.
    pub async fn wait_for(&self, key: &str) -> ThrottleResult<Duration> {
        let wait = self.scheduler.reserve_now(key)?;
        if wait > Duration::ZERO {
            debug!("Rate limiting {}: waiting {:?}", key, wait);
            tokio::time::sleep(wait).await;
        }
        Ok(wait)
    }

    /// Wait for the URL's domain to be ready. Returns the normalized domain,
    /// which is the key the reservation was recorded under.
    pub async fn acquire(&self, url: &str) -> ThrottleResult<String> {
        let host = extract_domain(url).ok_or_else(|| ThrottleError::InvalidKey {
            key: url.to_string(),
            reason: "URL has no host",
        })?;
        let domain = normalize_key(&host)?;
        self.wait_for(&domain).await?;
        Ok(domain)
    }

    /// Run a purge pass immediately.
    pub fn sweep_now(&self) -> PurgeReport {
        self.sweeper.sweep()
    }

    /// Number of keys currently tracked.
    pub fn tracked_keys(&self) -> usize {
        self.scheduler.registry().snapshot_size()
    }

    /// Statistics for every tracked key.
    pub fn stats(&self) -> HashMap<String, ThrottleStats> {
        let now = self.scheduler.clock().now();
        self.scheduler.registry().snapshot(now)
    }

    pub fn scheduler(&self) -> &Arc<ReservationScheduler> {
        &self.scheduler
    }

    pub fn registry(&self) -> &Arc<ThrottleRegistry> {
        self.scheduler.registry()
    }

    /// Stop the background sweeper, if running.
    pub async fn shutdown(mut self) {
        if let Some(handle) = self.sweeper_handle.take() {
            handle.shutdown().await;
        }
    }
}

impl std::fmt::Debug for DomainThrottle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DomainThrottle")
            .field("scheduler", &self.scheduler)
            .field("sweep_interval", &self.sweep_interval)
            .field("sweeper_running", &self.sweeper_handle.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::super::clock::ManualClock;
    use super::*;

    fn create_test_throttle() -> (DomainThrottle, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let config = ThrottleConfig {
            backoff_interval_ms: 100,
            retention_window_ms: 1_000,
            ..Default::default()
        };
        let throttle = DomainThrottle::with_clock(&config, clock.clone()).unwrap();
        (throttle, clock)
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = ThrottleConfig {
            retention_window_ms: 10,
            backoff_interval_ms: 100,
            ..Default::default()
        };
        let err = DomainThrottle::new(&config).unwrap_err();
        assert!(matches!(err, ThrottleError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn test_acquire_returns_domain() {
        let (throttle, _clock) = create_test_throttle();
        let domain = throttle.acquire("https://Example.com/doc").await.unwrap();
        assert_eq!(domain, "example.com");
        assert_eq!(throttle.tracked_keys(), 1);
    }

    #[tokio::test]
    async fn test_acquire_returns_tracked_key() {
        let (throttle, _clock) = create_test_throttle();
        let domain = throttle.acquire("http://Example.COM./x").await.unwrap();
        assert_eq!(domain, "example.com");
        assert!(throttle.stats().contains_key(&domain));

        throttle.acquire("http://example.com/y").await.unwrap();
        assert_eq!(throttle.tracked_keys(), 1);
        assert_eq!(throttle.stats()[&domain].total_reservations, 2);
    }

    #[tokio::test]
    async fn test_acquire_rejects_hostless_url() {
        let (throttle, _clock) = create_test_throttle();
        let err = throttle.acquire("mailto:someone").await.unwrap_err();
        assert!(matches!(err, ThrottleError::InvalidKey { .. }));
    }

    #[tokio::test]
    async fn test_wait_for_sleeps_reserved_duration() {
        // Manual clock stays frozen, so the second caller is queued a full
        // interval behind the first and must really sleep it.
        let (throttle, _clock) = create_test_throttle();
        assert_eq!(throttle.wait_for("a.com").await.unwrap(), Duration::ZERO);

        let started = std::time::Instant::now();
        let wait = throttle.wait_for("a.com").await.unwrap();
        assert_eq!(wait, Duration::from_millis(100));
        assert!(started.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_cancelled_wait_keeps_slot() {
        let (throttle, _clock) = create_test_throttle();
        throttle.reserve("a.com").unwrap();

        let cancelled =
            tokio::time::timeout(Duration::from_millis(5), throttle.wait_for("a.com")).await;
        assert!(cancelled.is_err());

        // The abandoned slot was not refunded.
        assert_eq!(throttle.reserve("a.com").unwrap(), Duration::from_millis(200));
    }

    #[test]
    fn test_sweep_now_and_stats() {
        let (throttle, clock) = create_test_throttle();
        throttle.reserve("a.com").unwrap();
        throttle.reserve("a.com").unwrap();

        let stats = throttle.stats();
        assert_eq!(stats["a.com"].total_reservations, 2);
        assert_eq!(stats["a.com"].pending_wait, Duration::from_millis(200));

        clock.advance(Duration::from_secs(5));
        assert_eq!(throttle.sweep_now().removed, 1);
        assert_eq!(throttle.tracked_keys(), 0);
        assert_eq!(throttle.reserve("a.com").unwrap(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_start_and_shutdown() {
        let config = ThrottleConfig::default();
        let throttle = DomainThrottle::start(&config).unwrap();
        assert_eq!(throttle.reserve("a.com").unwrap(), Duration::ZERO);
        throttle.shutdown().await;
    }
}
