//! Monotonic instant abstraction shared by the orchestrator components.
//!
//! The station runs on tokio time while tests drive a millisecond counter, so
//! every component is generic over [`SessionInstant`] and receives `now`
//! explicitly instead of reading a clock.

use core::ops::Add;
use core::time::Duration;

/// Trait implemented by monotonic instant wrappers used to track deadlines.
pub trait SessionInstant: Copy + Ord + Add<Duration, Output = Self> {
    /// Returns the saturating duration from `earlier` to `self`.
    fn saturating_duration_since(&self, earlier: Self) -> Duration;

    /// Wall-clock milliseconds since the Unix epoch for this instant.
    ///
    /// Used for command identifiers and audit timestamps only; ordering and
    /// deadline checks always go through the monotonic comparison.
    fn unix_millis(&self) -> u64;
}

/// Converts a duration to whole milliseconds, saturating at `u64::MAX`.
#[must_use]
pub fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_millis_truncates_sub_millisecond_parts() {
        assert_eq!(duration_millis(Duration::from_micros(10_999)), 10);
        assert_eq!(duration_millis(Duration::ZERO), 0);
    }

    #[test]
    fn duration_millis_saturates() {
        assert_eq!(duration_millis(Duration::MAX), u64::MAX);
    }
}
