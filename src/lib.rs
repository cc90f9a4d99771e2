//! domain-throttle - per-domain politeness throttling for worker pools.
//!
//! Library surface used by URL-resolving workers before they contact a host,
//! plus the configuration layer shared with the `throttle` binary.

pub mod config;
pub mod throttle;

pub use config::{ConfigError, ThrottleConfig};
pub use throttle::{
    Clock, DomainThrottle, ManualClock, MonotonicClock, PurgeSweeper, ReservationScheduler,
    ThrottleError, ThrottleRegistry, ThrottleResult,
};
