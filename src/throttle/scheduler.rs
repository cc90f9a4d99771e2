//! Reservation scheduling.
//!
//! Each key behaves like a capacity-1 token bucket refilled once per backoff
//! interval, implemented as a virtual schedule: a reservation claims the
//! next free slot and tells the caller how long to wait for it. Nothing here
//! sleeps; shard locks are held only while the slot is computed.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::debug;

use super::clock::{Clock, MonotonicClock};
use super::error::ThrottleResult;
use super::key::normalize_key;
use super::registry::ThrottleRegistry;

/// Computes per-key wait times and records the claimed slots.
pub struct ReservationScheduler {
    registry: Arc<ThrottleRegistry>,
    clock: Arc<dyn Clock>,
    backoff_interval: Duration,
}

impl ReservationScheduler {
    pub fn new(registry: Arc<ThrottleRegistry>, backoff_interval: Duration) -> Self {
        Self::with_clock(registry, backoff_interval, Arc::new(MonotonicClock))
    }

    pub fn with_clock(
        registry: Arc<ThrottleRegistry>,
        backoff_interval: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            registry,
            clock,
            backoff_interval,
        }
    }

    /// Reserve the next slot for `key` as of `now`.
    ///
    /// Returns how long the caller must wait before using the key. The slot
    /// is consumed immediately; it is not refunded if the caller gives up.
    pub fn reserve(&self, key: &str, now: Instant) -> ThrottleResult<Duration> {
        let key = normalize_key(key)?;
        let interval = self.backoff_interval;
        let wait = self
            .registry
            .with_key_state(&key, |state| state.reserve(now, interval))?;

        if wait > Duration::ZERO {
            debug!("Throttling {}: reserved slot in {:?}", key, wait);
        }
        Ok(wait)
    }

    /// Reserve the next slot for `key` as of the scheduler's clock.
    pub fn reserve_now(&self, key: &str) -> ThrottleResult<Duration> {
        self.reserve(key, self.clock.now())
    }

    pub fn backoff_interval(&self) -> Duration {
        self.backoff_interval
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn registry(&self) -> &Arc<ThrottleRegistry> {
        &self.registry
    }
}

impl std::fmt::Debug for ReservationScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReservationScheduler")
            .field("backoff_interval", &self.backoff_interval)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
