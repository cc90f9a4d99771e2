//! Per-key reservation state.

use std::time::{Duration, Instant};

/// Reservation bookkeeping for a single key.
///
/// Created vacant on first use. `next_available` only ever moves forward for
/// as long as the entry lives; a purged and recreated key starts vacant again.
/// Fields are only reachable through [`reserve`](Self::reserve) and read-only
/// accessors.
#[derive(Debug, Clone, Default)]
pub struct ThrottleState {
    /// Earliest instant a new reservation may start without waiting.
    /// `None` means the key has never been reserved.
    next_available: Option<Instant>,
    /// When the last reservation was made. Used for eviction only.
    last_touched: Option<Instant>,
    /// Reservations made since the entry was created.
    total_reservations: u64,
}

impl ThrottleState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_available(&self) -> Option<Instant> {
        self.next_available
    }

    pub fn last_touched(&self) -> Option<Instant> {
        self.last_touched
    }

    pub fn total_reservations(&self) -> u64 {
        self.total_reservations
    }

    /// Claim the next slot and return how long the caller must wait for it.
    ///
    /// If `now` is earlier than previously recorded instants (a regressing
    /// clock source), the wait is still non-negative and neither instant moves
    /// backwards.
    pub fn reserve(&mut self, now: Instant, interval: Duration) -> Duration {
        let effective_start = match self.next_available {
            Some(next) if next > now => next,
            _ => now,
        };
        let wait = effective_start.saturating_duration_since(now);

        self.next_available = Some(effective_start + interval);
        self.last_touched = Some(match self.last_touched {
            Some(last) if last > now => last,
            _ => now,
        });
        self.total_reservations += 1;

        wait
    }

    /// Time a reservation made at `now` would have to wait.
    pub fn time_until_ready(&self, now: Instant) -> Duration {
        self.next_available
            .map(|next| next.saturating_duration_since(now))
            .unwrap_or(Duration::ZERO)
    }

    /// Whether the entry has been idle since before `threshold`: its last
    /// reservation was made before it and every reserved slot has started.
    pub fn is_idle_before(&self, threshold: Instant) -> bool {
        let touched_before = self.last_touched.map_or(true, |t| t < threshold);
        let drained = self.next_available.map_or(true, |n| n <= threshold);
        touched_before && drained
    }

    pub fn stats(&self, now: Instant) -> ThrottleStats {
        ThrottleStats {
            total_reservations: self.total_reservations,
            pending_wait: self.time_until_ready(now),
            idle_for: self.last_touched.map(|t| now.saturating_duration_since(t)),
        }
    }
}

/// Read-only view of a key's state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThrottleStats {
    pub total_reservations: u64,
    /// Wait a reservation made now would get.
    pub pending_wait: Duration,
    /// Time since the last reservation.
    pub idle_for: Option<Duration>,
}
