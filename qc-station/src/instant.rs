//! Host clock handed to the sequencer.
//!
//! Ordering and deadlines use tokio's monotonic clock (so paused-time tests
//! control them); command ids and result timestamps use the wall clock
//! sampled at the same moment.

use core::cmp::Ordering;
use core::ops::Add;
use core::time::Duration;

use qc_core::clock::{SessionInstant, duration_millis};
use tokio::time::Instant;

#[derive(Copy, Clone, Debug)]
pub struct StationInstant {
    monotonic: Instant,
    unix_ms: u64,
}

impl StationInstant {
    #[must_use]
    pub fn now() -> Self {
        let unix_ms = u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0);
        Self {
            monotonic: Instant::now(),
            unix_ms,
        }
    }

    /// Monotonic instant used for `sleep_until`.
    #[must_use]
    pub const fn monotonic(&self) -> Instant {
        self.monotonic
    }
}

impl PartialEq for StationInstant {
    fn eq(&self, other: &Self) -> bool {
        self.monotonic == other.monotonic
    }
}

impl Eq for StationInstant {}

impl PartialOrd for StationInstant {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for StationInstant {
    fn cmp(&self, other: &Self) -> Ordering {
        self.monotonic.cmp(&other.monotonic)
    }
}

impl Add<Duration> for StationInstant {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self::Output {
        Self {
            monotonic: self.monotonic + rhs,
            unix_ms: self.unix_ms.saturating_add(duration_millis(rhs)),
        }
    }
}

impl SessionInstant for StationInstant {
    fn saturating_duration_since(&self, earlier: Self) -> Duration {
        self.monotonic.saturating_duration_since(earlier.monotonic)
    }

    fn unix_millis(&self) -> u64 {
        self.unix_ms
    }
}
