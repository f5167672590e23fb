//! Shared text rendering for the console front-ends.
//!
//! [`StatusFormatter`] renders a [`SessionState`] snapshot; the free
//! functions render results and run summaries. Both front-ends use the same
//! writers so the kiosk and technician views never disagree on wording.

use core::fmt;

use crate::results::{DeviceStatus, RunSummary, TestResult};
use crate::sequencer::{SessionPhase, SessionState};

const PROGRESS_BAR_WIDTH: usize = 20;

/// Renders a session snapshot into human-readable lines.
#[derive(Clone, Copy, Debug)]
pub struct StatusFormatter<'a> {
    phase: SessionPhase,
    state: &'a SessionState,
    total: usize,
}

impl<'a> StatusFormatter<'a> {
    #[must_use]
    pub const fn new(phase: SessionPhase, state: &'a SessionState, total: usize) -> Self {
        Self {
            phase,
            state,
            total,
        }
    }

    /// Writes the phase line (e.g. `session phase=running(0) test=1/1 progress=0%`).
    pub fn write_session_line<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        write!(writer, "session phase={}", self.phase)?;
        if self.total > 0 && !matches!(self.phase, SessionPhase::Idle) {
            write!(
                writer,
                " test={}/{}",
                (self.state.current_test_index + 1).min(self.total),
                self.total
            )?;
        }
        write!(writer, " progress={:.0}%", self.state.progress)
    }

    /// Writes the in-flight command line (e.g. `command active=none`).
    pub fn write_command_line<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        writer.write_str("command active=")?;
        match &self.state.active_command_id {
            Some(id) => write!(writer, "{id}"),
            None => writer.write_str("none"),
        }
    }

    /// Writes the operator prompt line, if a prompt is pending.
    pub fn write_prompt_line<W: fmt::Write>(&self, writer: &mut W) -> Result<bool, fmt::Error> {
        match &self.state.user_action_message {
            Some(message) if self.state.awaiting_user_action => {
                write!(writer, "ACTION REQUIRED: {message} (type 'confirm' when done)")?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Writes a fixed-width progress bar (e.g. `[##########----------] 50%`).
    pub fn write_progress_bar<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        write_progress_bar(writer, self.state.progress)
    }
}

/// Writes a fixed-width progress bar for `progress` in percent.
pub fn write_progress_bar<W: fmt::Write>(writer: &mut W, progress: f64) -> fmt::Result {
    let filled = filled_cells(progress);
    writer.write_char('[')?;
    for cell in 0..PROGRESS_BAR_WIDTH {
        writer.write_char(if cell < filled { '#' } else { '-' })?;
    }
    write!(writer, "] {progress:.0}%")
}

fn filled_cells(progress: f64) -> usize {
    let clamped = progress.clamp(0.0, 100.0);
    (0..=PROGRESS_BAR_WIDTH)
        .rev()
        .find(|cells| {
            let cells = u32::try_from(*cells).unwrap_or(u32::MAX);
            let width = u32::try_from(PROGRESS_BAR_WIDTH).unwrap_or(u32::MAX);
            f64::from(cells) * 100.0 <= clamped * f64::from(width)
        })
        .unwrap_or(0)
}

/// Writes one result row (e.g. `PASS Test Mic L/R Balance (3012 ms)`).
pub fn write_result_line<W: fmt::Write>(writer: &mut W, result: &TestResult) -> fmt::Result {
    write!(
        writer,
        "{:<4} {} ({} ms)",
        result.status, result.name, result.elapsed_ms
    )
}

/// Writes the device verdict (e.g. `DEVICE READY - 1/1 tests passed`).
pub fn write_verdict_line<W: fmt::Write>(writer: &mut W, summary: &RunSummary) -> fmt::Result {
    let label = match summary.device_status {
        DeviceStatus::Ready => "DEVICE READY",
        DeviceStatus::Defective => "DEVICE DEFECTIVE",
    };
    write!(
        writer,
        "{label} - {}/{} tests passed",
        summary.passed_tests, summary.total_tests
    )
}
