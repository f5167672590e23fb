//! Per-command timeout monitor.
//!
//! The monitor holds at most one countdown. Expiry is observed by polling
//! with an explicit `now`; a fired countdown disarms itself so it can be
//! reported at most once. Whether the expiry still applies is decided by the
//! caller against the correlator's active command.

use core::time::Duration;

use crate::clock::SessionInstant;
use crate::protocol::CommandId;

/// Countdown armed for a dispatched command.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ArmedTimeout<TInstant> {
    pub command_id: CommandId,
    pub armed_at: TInstant,
    pub deadline: TInstant,
    pub limit: Duration,
}

/// Reported when a countdown reaches its deadline.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TimeoutExpiry {
    pub command_id: CommandId,
    pub elapsed: Duration,
    pub limit: Duration,
}

pub struct TimeoutMonitor<TInstant> {
    armed: Option<ArmedTimeout<TInstant>>,
}

impl<TInstant> TimeoutMonitor<TInstant>
where
    TInstant: SessionInstant,
{
    /// Creates a monitor with no countdown.
    #[must_use]
    pub const fn new() -> Self {
        Self { armed: None }
    }

    /// Starts a countdown for `command_id`, replacing any previous one.
    pub fn arm(&mut self, command_id: CommandId, now: TInstant, limit: Duration) -> TInstant {
        let deadline = now + limit;
        self.armed = Some(ArmedTimeout {
            command_id,
            armed_at: now,
            deadline,
            limit,
        });
        deadline
    }

    /// Cancels the countdown regardless of which command owns it.
    pub fn cancel(&mut self) -> Option<ArmedTimeout<TInstant>> {
        self.armed.take()
    }

    /// Cancels the countdown only when it belongs to `command_id`.
    pub fn cancel_for(&mut self, command_id: &CommandId) -> bool {
        if self
            .armed
            .as_ref()
            .is_some_and(|armed| armed.command_id == *command_id)
        {
            self.armed = None;
            true
        } else {
            false
        }
    }

    /// Returns the expiry once `now` reaches the deadline, disarming the monitor.
    pub fn poll(&mut self, now: TInstant) -> Option<TimeoutExpiry> {
        match &self.armed {
            Some(armed) if now >= armed.deadline => {}
            _ => return None,
        }

        self.armed.take().map(|armed| TimeoutExpiry {
            elapsed: now.saturating_duration_since(armed.armed_at),
            command_id: armed.command_id,
            limit: armed.limit,
        })
    }

    #[must_use]
    pub fn deadline(&self) -> Option<TInstant> {
        self.armed.as_ref().map(|armed| armed.deadline)
    }

    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }
}

impl<TInstant> Default for TimeoutMonitor<TInstant>
where
    TInstant: SessionInstant,
{
    fn default() -> Self {
        Self::new()
    }
}
