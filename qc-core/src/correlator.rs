//! Command correlator.
//!
//! Owns the single in-flight command slot. Identifiers are issued here and a
//! command leaves the slot exactly once, through [`CommandCorrelator::resolve`],
//! whichever of the correlated event, the timeout, or a send failure gets
//! there first. A short history of resolved commands lets late duplicates be
//! recognised as stale instead of unrelated traffic.

use core::fmt;

use heapless::HistoryBuf;

use crate::catalog::TestDefinition;
use crate::clock::SessionInstant;
use crate::protocol::{CommandEnvelope, CommandId};

/// Number of resolved commands remembered for stale-event detection.
pub const RESOLVED_HISTORY: usize = 8;

/// Command currently awaiting a response.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ActiveCommand<TInstant> {
    pub id: CommandId,
    pub test_index: usize,
    pub dispatched_at: TInstant,
}

/// Bookkeeping for a command that already left the active slot.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResolvedCommand {
    pub id: CommandId,
    pub test_index: usize,
}

/// Reason a dispatch request was refused.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DispatchRejection {
    /// Another command is still unresolved.
    CommandInFlight { active: CommandId },
}

impl fmt::Display for DispatchRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchRejection::CommandInFlight { active } => {
                write!(f, "command {active} is still in flight")
            }
        }
    }
}

pub struct CommandCorrelator<TInstant> {
    active: Option<ActiveCommand<TInstant>>,
    last_issued_millis: Option<u64>,
    resolved: HistoryBuf<ResolvedCommand, RESOLVED_HISTORY>,
}

impl<TInstant> CommandCorrelator<TInstant>
where
    TInstant: SessionInstant,
{
    #[must_use]
    pub const fn new() -> Self {
        Self {
            active: None,
            last_issued_millis: None,
            resolved: HistoryBuf::new(),
        }
    }

    /// Issues a fresh identifier for `test` and claims the active slot.
    ///
    /// The identifier timestamp is bumped past the last one issued so two
    /// dispatches within the same millisecond still get distinct ids.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchRejection::CommandInFlight`] while another command
    /// is unresolved; nothing is recorded in that case.
    pub fn issue(
        &mut self,
        test: &TestDefinition,
        test_index: usize,
        now: TInstant,
    ) -> Result<CommandEnvelope, DispatchRejection> {
        if let Some(active) = &self.active {
            return Err(DispatchRejection::CommandInFlight {
                active: active.id.clone(),
            });
        }

        let mut millis = now.unix_millis();
        if let Some(last) = self.last_issued_millis
            && millis <= last
        {
            millis = last.saturating_add(1);
        }
        self.last_issued_millis = Some(millis);

        let id = CommandId::new(&test.command, millis);
        self.active = Some(ActiveCommand {
            id: id.clone(),
            test_index,
            dispatched_at: now,
        });

        Ok(CommandEnvelope::for_test(test, id))
    }

    /// Clears the active slot if it still holds `id`.
    ///
    /// Returns `None` when the command was already resolved or never issued,
    /// which makes every resolution path idempotent.
    pub fn resolve(&mut self, id: &CommandId) -> Option<ActiveCommand<TInstant>> {
        if self.active.as_ref().is_none_or(|active| active.id != *id) {
            return None;
        }

        let active = self.active.take()?;
        self.resolved.write(ResolvedCommand {
            id: active.id.clone(),
            test_index: active.test_index,
        });
        Some(active)
    }

    #[must_use]
    pub fn active(&self) -> Option<&ActiveCommand<TInstant>> {
        self.active.as_ref()
    }

    #[must_use]
    pub fn active_id(&self) -> Option<&CommandId> {
        self.active.as_ref().map(|active| &active.id)
    }

    /// Most recently resolved command for the given test, if remembered.
    #[must_use]
    pub fn last_resolved_for(&self, test_index: usize) -> Option<&ResolvedCommand> {
        self.resolved
            .oldest_ordered()
            .filter(|resolved| resolved.test_index == test_index)
            .last()
    }

    /// Returns the correlator to its initial state.
    pub fn clear(&mut self) {
        self.active = None;
        self.last_issued_millis = None;
        self.resolved = HistoryBuf::new();
    }
}

impl<TInstant> Default for CommandCorrelator<TInstant>
where
    TInstant: SessionInstant,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::mic_balance_test;
    use core::ops::Add;
    use core::time::Duration;

    #[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
    struct MockInstant(u64);

    impl Add<Duration> for MockInstant {
        type Output = Self;

        fn add(self, rhs: Duration) -> Self::Output {
            Self(self.0 + crate::clock::duration_millis(rhs))
        }
    }

    impl SessionInstant for MockInstant {
        fn saturating_duration_since(&self, earlier: Self) -> Duration {
            Duration::from_millis(self.0.saturating_sub(earlier.0))
        }

        fn unix_millis(&self) -> u64 {
            1_700_000_000_000 + self.0
        }
    }

    #[test]
    fn issue_claims_slot_and_builds_envelope() {
        let mut correlator = CommandCorrelator::new();
        let test = mic_balance_test();

        let envelope = correlator
            .issue(&test, 0, MockInstant(5))
            .expect("dispatch should succeed");

        assert_eq!(envelope.id.as_str(), "qa_mic_lr_test_1700000000005");
        assert_eq!(envelope.command, "qa_mic_lr_test");
        assert_eq!(correlator.active_id(), Some(&envelope.id));
    }

    #[test]
    fn second_issue_is_rejected_while_in_flight() {
        let mut correlator = CommandCorrelator::new();
        let test = mic_balance_test();
        let first = correlator.issue(&test, 0, MockInstant(0)).expect("first");

        let rejection = correlator
            .issue(&test, 1, MockInstant(1))
            .expect_err("second dispatch must be rejected");
        assert_eq!(
            rejection,
            DispatchRejection::CommandInFlight {
                active: first.id.clone()
            }
        );
        assert_eq!(correlator.active_id(), Some(&first.id));
    }

    #[test]
    fn resolve_is_once_only() {
        let mut correlator = CommandCorrelator::new();
        let test = mic_balance_test();
        let envelope = correlator.issue(&test, 0, MockInstant(0)).expect("issue");

        let resolved = correlator.resolve(&envelope.id).expect("first resolve");
        assert_eq!(resolved.test_index, 0);
        assert!(correlator.resolve(&envelope.id).is_none());
        assert!(correlator.active().is_none());
        assert_eq!(
            correlator.last_resolved_for(0).map(|resolved| &resolved.id),
            Some(&envelope.id)
        );
    }

    #[test]
    fn resolve_ignores_foreign_ids() {
        let mut correlator = CommandCorrelator::new();
        let test = mic_balance_test();
        let envelope = correlator.issue(&test, 0, MockInstant(0)).expect("issue");

        assert!(
            correlator
                .resolve(&CommandId::new("qa_mic_lr_test", 1))
                .is_none()
        );
        assert_eq!(correlator.active_id(), Some(&envelope.id));
    }

    #[test]
    fn ids_stay_unique_within_one_millisecond() {
        let mut correlator = CommandCorrelator::new();
        let test = mic_balance_test();

        let first = correlator.issue(&test, 0, MockInstant(7)).expect("first");
        correlator.resolve(&first.id);
        let second = correlator.issue(&test, 1, MockInstant(7)).expect("second");

        assert_ne!(first.id, second.id);
        assert_eq!(second.id.as_str(), "qa_mic_lr_test_1700000000008");
    }

    #[test]
    fn clear_forgets_everything() {
        let mut correlator = CommandCorrelator::new();
        let test = mic_balance_test();
        let first = correlator.issue(&test, 0, MockInstant(0)).expect("first");
        correlator.resolve(&first.id);
        correlator.issue(&test, 1, MockInstant(1)).expect("second");

        correlator.clear();

        assert!(correlator.active().is_none());
        assert!(correlator.last_resolved_for(0).is_none());
    }
}
