//! Per-domain request throttling.
//!
//! Paces outbound requests from a concurrent worker pool so that no single
//! host sees requests closer together than the configured backoff interval:
//! - [`ReservationScheduler`] computes each caller's wait and claims its slot
//! - [`ThrottleRegistry`] holds per-key state behind lock-striped shards
//! - [`PurgeSweeper`] evicts keys that have gone idle
//! - [`DomainThrottle`] bundles the three with a start/shutdown lifecycle
//!
//! Reservations never sleep. Callers wait out the returned duration
//! themselves (or use [`DomainThrottle::wait_for`]).

pub mod clock;
mod error;
mod key;
mod limiter;
pub mod registry;
mod scheduler;
mod state;
mod sweeper;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use error::{ThrottleError, ThrottleResult};
pub use key::{extract_domain, normalize_key};
pub use limiter::DomainThrottle;
pub use registry::{PurgeReport, ThrottleRegistry};
pub use scheduler::ReservationScheduler;
pub use state::{ThrottleState, ThrottleStats};
pub use sweeper::{PurgeSweeper, SweeperHandle};
