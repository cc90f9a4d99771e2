//! Concurrent key-to-state registry.
//!
//! Keys are spread over a fixed set of lock-striped shards. A reservation
//! locks only the shard its key hashes to, so callers for unrelated keys
//! rarely meet, and a single key's state is never mutated concurrently.
//! Lock acquisition is bounded: a caller that cannot get its shard within
//! the configured timeout gets a retryable error instead of blocking.

use std::collections::hash_map::RandomState;
use std::collections::HashMap;
use std::hash::BuildHasher;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, warn};

use super::error::{ThrottleError, ThrottleResult};
use super::state::{ThrottleState, ThrottleStats};

pub const DEFAULT_SHARDS: usize = 64;
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(250);

type Shard = Mutex<HashMap<String, ThrottleState>>;

/// Outcome of a purge pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeReport {
    /// Entries removed.
    pub removed: usize,
    /// Shards skipped because they stayed locked past the timeout.
    pub skipped_shards: usize,
}

/// Owns every key's throttle state.
pub struct ThrottleRegistry {
    shards: Box<[Shard]>,
    hasher: RandomState,
    lock_timeout: Duration,
}

impl ThrottleRegistry {
    pub fn new() -> Self {
        Self::with_shards(DEFAULT_SHARDS, DEFAULT_LOCK_TIMEOUT)
    }

    /// Create a registry with `shards` stripes (at least one).
    pub fn with_shards(shards: usize, lock_timeout: Duration) -> Self {
        let shards = (0..shards.max(1))
            .map(|_| Mutex::new(HashMap::new()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            shards,
            hasher: RandomState::new(),
            lock_timeout,
        }
    }

    fn shard_for(&self, key: &str) -> &Shard {
        let idx = (self.hasher.hash_one(key) % self.shards.len() as u64) as usize;
        &self.shards[idx]
    }

    fn lock_shard<'a>(
        &self,
        shard: &'a Shard,
    ) -> Option<MutexGuard<'a, HashMap<String, ThrottleState>>> {
        shard.try_lock_for(self.lock_timeout)
    }

    /// Run `f` with exclusive access to `key`'s state, creating it if absent.
    ///
    /// Lookup, creation and `f` all happen under one shard lock, so two first
    /// callers for a new key can never both see it vacant.
    pub fn with_key_state<R>(
        &self,
        key: &str,
        f: impl FnOnce(&mut ThrottleState) -> R,
    ) -> ThrottleResult<R> {
        let mut shard = self
            .lock_shard(self.shard_for(key))
            .ok_or_else(|| ThrottleError::Contended {
                key: key.to_string(),
                waited: self.lock_timeout,
            })?;

        if let Some(state) = shard.get_mut(key) {
            return Ok(f(state));
        }

        debug!("Tracking new throttle key {}", key);
        let state = shard.entry(key.to_string()).or_default();
        Ok(f(state))
    }

    /// Remove every entry idle since before `threshold`.
    ///
    /// Each shard is purged under its own lock, so a concurrent reservation
    /// either lands first (and the entry is kept as touched) or afterwards
    /// (and recreates a vacant entry).
    pub fn purge_older_than(&self, threshold: Instant) -> PurgeReport {
        let mut report = PurgeReport::default();

        for shard in self.shards.iter() {
            let Some(mut entries) = self.lock_shard(shard) else {
                report.skipped_shards += 1;
                continue;
            };
            let before = entries.len();
            entries.retain(|_, state| !state.is_idle_before(threshold));
            report.removed += before - entries.len();
        }

        if report.skipped_shards > 0 {
            warn!(
                "Throttle purge skipped {} contended shard(s); idle keys there remain until the next pass",
                report.skipped_shards
            );
        }
        report
    }

    /// Number of tracked keys.
    ///
    /// Shards still locked after the timeout are left out of the count.
    pub fn snapshot_size(&self) -> usize {
        let mut size = 0;
        let mut skipped = 0;
        for shard in self.shards.iter() {
            match self.lock_shard(shard) {
                Some(entries) => size += entries.len(),
                None => skipped += 1,
            }
        }
        warn_skipped("size", skipped);
        size
    }

    /// Statistics for every tracked key in shards that could be locked in time.
    pub fn snapshot(&self, now: Instant) -> HashMap<String, ThrottleStats> {
        let mut stats = HashMap::new();
        let mut skipped = 0;
        for shard in self.shards.iter() {
            let Some(entries) = self.lock_shard(shard) else {
                skipped += 1;
                continue;
            };
            stats.extend(entries.iter().map(|(k, v)| (k.clone(), v.stats(now))));
        }
        warn_skipped("snapshot", skipped);
        stats
    }

    /// Drop all tracked state. Contended shards are skipped and reported.
    pub fn clear(&self) -> PurgeReport {
        let mut report = PurgeReport::default();
        for shard in self.shards.iter() {
            let Some(mut entries) = self.lock_shard(shard) else {
                report.skipped_shards += 1;
                continue;
            };
            report.removed += entries.len();
            entries.clear();
        }
        warn_skipped("clear", report.skipped_shards);
        report
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }
}

fn warn_skipped(operation: &str, skipped: usize) {
    if skipped > 0 {
        warn!("Throttle {} skipped {} contended shard(s)", operation, skipped);
    }
}

impl Default for ThrottleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ThrottleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThrottleRegistry")
            .field("shards", &self.shards.len())
            .field("lock_timeout", &self.lock_timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INTERVAL: Duration = Duration::from_millis(100);

    #[test]
    fn test_creates_state_on_first_use() {
        let registry = ThrottleRegistry::new();
        let now = Instant::now();

        let wait = registry
            .with_key_state("example.com", |s| s.reserve(now, INTERVAL))
            .unwrap();
        assert_eq!(wait, Duration::ZERO);
        assert_eq!(registry.snapshot_size(), 1);

        let wait = registry
            .with_key_state("example.com", |s| s.reserve(now, INTERVAL))
            .unwrap();
        assert_eq!(wait, INTERVAL);
        assert_eq!(registry.snapshot_size(), 1);
    }

    #[test]
    fn test_single_shard_still_separates_keys() {
        let registry = ThrottleRegistry::with_shards(1, DEFAULT_LOCK_TIMEOUT);
        let now = Instant::now();

        registry
            .with_key_state("a.com", |s| s.reserve(now, INTERVAL))
            .unwrap();
        let wait = registry
            .with_key_state("b.com", |s| s.reserve(now, INTERVAL))
            .unwrap();
        assert_eq!(wait, Duration::ZERO);
        assert_eq!(registry.shard_count(), 1);
    }

    #[test]
    fn test_contended_shard_times_out() {
        let registry = ThrottleRegistry::with_shards(1, Duration::from_millis(10));
        let _held = registry.shards[0].lock();

        let err = registry
            .with_key_state("example.com", |s| s.total_reservations())
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_purge_removes_only_idle_entries() {
        let registry = ThrottleRegistry::new();
        let start = Instant::now();

        registry
            .with_key_state("old.com", |s| s.reserve(start, INTERVAL))
            .unwrap();
        let later = start + Duration::from_secs(10);
        registry
            .with_key_state("fresh.com", |s| s.reserve(later, INTERVAL))
            .unwrap();

        let report = registry.purge_older_than(start + Duration::from_secs(5));
        assert_eq!(report.removed, 1);
        assert_eq!(report.skipped_shards, 0);

        let remaining = registry.snapshot(later);
        assert!(remaining.contains_key("fresh.com"));
        assert!(!remaining.contains_key("old.com"));
    }

    #[test]
    fn test_purge_keeps_keys_with_queued_slots() {
        let registry = ThrottleRegistry::new();
        let start = Instant::now();
        for _ in 0..10 {
            registry
                .with_key_state("busy.com", |s| s.reserve(start, INTERVAL))
                .unwrap();
        }

        // Last touched at `start`, but slots run until start + 1s.
        let report = registry.purge_older_than(start + Duration::from_millis(500));
        assert_eq!(report.removed, 0);
        assert_eq!(registry.snapshot_size(), 1);
    }

    #[test]
    fn test_purge_skips_contended_shard() {
        let registry = ThrottleRegistry::with_shards(1, Duration::from_millis(10));
        let start = Instant::now();
        registry
            .with_key_state("old.com", |s| s.reserve(start, INTERVAL))
            .unwrap();

        let held = registry.shards[0].lock();
        let report = registry.purge_older_than(start + Duration::from_secs(5));
        drop(held);

        assert_eq!(report.skipped_shards, 1);
        assert_eq!(registry.snapshot_size(), 1);
    }

    #[test]
    fn test_clear() {
        let registry = ThrottleRegistry::new();
        let now = Instant::now();
        for key in ["a.com", "b.com", "c.com"] {
            registry
                .with_key_state(key, |s| s.reserve(now, INTERVAL))
                .unwrap();
        }
        assert_eq!(registry.snapshot_size(), 3);
        let report = registry.clear();
        assert_eq!(report.removed, 3);
        assert_eq!(registry.snapshot_size(), 0);
    }

    #[test]
    fn test_observers_skip_contended_shard() {
        let registry = ThrottleRegistry::with_shards(1, Duration::from_millis(10));
        let now = Instant::now();
        registry
            .with_key_state("a.com", |s| s.reserve(now, INTERVAL))
            .unwrap();

        let held = registry.shards[0].lock();
        let started = Instant::now();
        assert_eq!(registry.snapshot_size(), 0);
        assert!(registry.snapshot(now).is_empty());
        assert_eq!(registry.clear().skipped_shards, 1);
        assert!(started.elapsed() < Duration::from_secs(5));
        drop(held);

        assert_eq!(registry.snapshot_size(), 1);
    }

    #[test]
    fn test_read_only_access_leaves_schedule_intact() {
        let registry = ThrottleRegistry::new();
        let now = Instant::now();
        for _ in 0..2 {
            registry
                .with_key_state("a.com", |s| s.reserve(now, INTERVAL))
                .unwrap();
        }

        let (next, touched, total) = registry
            .with_key_state("a.com", |s| {
                (s.next_available(), s.last_touched(), s.total_reservations())
            })
            .unwrap();
        assert_eq!(next, Some(now + INTERVAL * 2));
        assert_eq!(touched, Some(now));
        assert_eq!(total, 2);

        let wait = registry
            .with_key_state("a.com", |s| s.reserve(now, INTERVAL))
            .unwrap();
        assert_eq!(wait, INTERVAL * 2);
    }
}
