//! Test sequencer state machine.
//!
//! [`TestSequencer`] is the single mutation path for a QC session. Transport
//! notifications, timeout polling, send completions, and operator input all
//! arrive as method calls carrying an explicit `now`; each call returns the
//! [`SessionAction`]s the driver must perform. Nothing here performs I/O or
//! reads a clock, so the host station and the tests drive identical logic.

use core::fmt;
use core::time::Duration;

use serde::{Deserialize, Serialize};

use crate::catalog::{QC_RMS_THRESHOLD, TestCatalog, TestDefinition};
use crate::clock::{SessionInstant, duration_millis};
use crate::correlator::{ActiveCommand, CommandCorrelator, DispatchRejection};
use crate::evaluator::{DualChannelReading, evaluate};
use crate::protocol::{
    CommandEnvelope, CommandId, InboundEvent, InstructionMessage, SummaryMessage,
    TestResultMessage, TextLine, TextVerdict, decode,
};
use crate::results::{
    DeviceStatus, ResultAggregator, RunReport, SEND_FAILED_MARKER, TIMEOUT_MARKER, TestResult,
    TestStatus,
};
use crate::session_log::{LogLevel, SessionLog};
use crate::timeout::{TimeoutExpiry, TimeoutMonitor};

/// Pause between a recorded result and the next dispatch.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(1_500);

/// Tunables shared by every test in a session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub settle_delay_ms: u64,
    /// Threshold applied when a definition does not carry its own.
    pub rms_threshold: f64,
}

impl OrchestratorConfig {
    #[must_use]
    pub const fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: duration_millis(DEFAULT_SETTLE_DELAY),
            rms_threshold: QC_RMS_THRESHOLD,
        }
    }
}

/// Externally visible lifecycle phase.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SessionPhase {
    Idle,
    Connecting,
    Running { index: usize },
    AwaitingUserAction { index: usize },
    Completed,
}

impl SessionPhase {
    /// Returns `true` between `start` and completion.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(
            self,
            SessionPhase::Connecting
                | SessionPhase::Running { .. }
                | SessionPhase::AwaitingUserAction { .. }
        )
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionPhase::Idle => f.write_str("idle"),
            SessionPhase::Connecting => f.write_str("connecting"),
            SessionPhase::Running { index } => write!(f, "running({index})"),
            SessionPhase::AwaitingUserAction { index } => {
                write!(f, "awaiting-user-action({index})")
            }
            SessionPhase::Completed => f.write_str("completed"),
        }
    }
}

/// Snapshot of the session fields front-ends render.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SessionState {
    pub current_test_index: usize,
    pub progress: f64,
    pub awaiting_user_action: bool,
    pub user_action_message: Option<String>,
    pub is_running: bool,
    pub is_completed: bool,
    pub active_command_id: Option<CommandId>,
}

/// Side effects requested by the sequencer.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionAction {
    /// Locate and connect to the peripheral, then report the outcome.
    Connect,
    /// Write the envelope to the command channel, then report the outcome.
    Send(CommandEnvelope),
    /// Release the connection and the event subscription.
    Disconnect,
    /// Hand the finalized run to the persistence collaborator.
    Persist(RunReport),
}

/// Reasons `start` was refused.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum StartError {
    AlreadyActive(SessionPhase),
    EmptyCatalog,
}

impl fmt::Display for StartError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartError::AlreadyActive(phase) => {
                write!(f, "session already {phase}; reset before starting again")
            }
            StartError::EmptyCatalog => f.write_str("no tests are configured"),
        }
    }
}

impl std::error::Error for StartError {}

/// Reasons an explicit dispatch was refused.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DispatchError {
    NotRunning(SessionPhase),
    CommandInFlight(CommandId),
    AwaitingUserAction,
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::NotRunning(phase) => write!(f, "cannot dispatch while {phase}"),
            DispatchError::CommandInFlight(id) => write!(f, "command {id} is still in flight"),
            DispatchError::AwaitingUserAction => f.write_str("waiting for operator confirmation"),
        }
    }
}

impl std::error::Error for DispatchError {}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Phase {
    Idle,
    Connecting,
    Running,
    Completed,
}

/// Drives one peripheral through the test catalog.
pub struct TestSequencer<TInstant> {
    config: OrchestratorConfig,
    catalog: TestCatalog,
    phase: Phase,
    current_index: usize,
    correlator: CommandCorrelator<TInstant>,
    timeout: TimeoutMonitor<TInstant>,
    results: ResultAggregator,
    log: SessionLog,
    user_action: Option<String>,
    next_dispatch_at: Option<TInstant>,
    summaries: Vec<SummaryMessage>,
    session_id: Option<String>,
    started_at: Option<TInstant>,
    report: Option<RunReport>,
}

impl<TInstant> TestSequencer<TInstant>
where
    TInstant: SessionInstant,
{
    #[must_use]
    pub fn new(catalog: TestCatalog, config: OrchestratorConfig) -> Self {
        let total = catalog.len();
        Self {
            config,
            catalog,
            phase: Phase::Idle,
            current_index: 0,
            correlator: CommandCorrelator::new(),
            timeout: TimeoutMonitor::new(),
            results: ResultAggregator::new(total),
            log: SessionLog::new(),
            user_action: None,
            next_dispatch_at: None,
            summaries: Vec::new(),
            session_id: None,
            started_at: None,
            report: None,
        }
    }

    /// Begins a fresh session and asks the driver to connect.
    ///
    /// # Errors
    ///
    /// Returns [`StartError::AlreadyActive`] unless the sequencer is idle and
    /// [`StartError::EmptyCatalog`] when there is nothing to run.
    pub fn start(&mut self, now: TInstant) -> Result<Vec<SessionAction>, StartError> {
        if self.phase != Phase::Idle {
            return Err(StartError::AlreadyActive(self.phase()));
        }
        if self.catalog.is_empty() {
            return Err(StartError::EmptyCatalog);
        }

        self.clear_session();
        let session_id = format!("qc_{}", now.unix_millis() / 1_000);
        self.log.info(
            format!(
                "Starting QC session {session_id} with {} test(s)",
                self.catalog.len()
            ),
            now.unix_millis(),
        );
        self.session_id = Some(session_id);
        self.started_at = Some(now);
        self.phase = Phase::Connecting;

        Ok(vec![SessionAction::Connect])
    }

    /// Reports that the transport connected; dispatches the first test.
    pub fn connection_established(&mut self, now: TInstant) -> Vec<SessionAction> {
        if self.phase != Phase::Connecting {
            log::debug!("ignoring connection outcome while {}", self.phase());
            return Vec::new();
        }

        self.log.success("Connected to device", now.unix_millis());
        self.phase = Phase::Running;
        self.current_index = 0;
        self.dispatch_if_ready(now)
    }

    /// Reports that the connection attempt failed; no tests run.
    pub fn connection_failed(&mut self, reason: &str, now: TInstant) -> Vec<SessionAction> {
        if self.phase != Phase::Connecting {
            log::debug!("ignoring connection failure while {}", self.phase());
            return Vec::new();
        }

        self.log.push(
            LogLevel::Error,
            "Connection failed",
            Some(reason.to_string()),
            now.unix_millis(),
        );
        self.phase = Phase::Idle;
        self.timeout.cancel();
        self.correlator.clear();
        vec![SessionAction::Disconnect]
    }

    /// Dispatches the current test.
    ///
    /// The sequencer calls this itself once the settle delay has elapsed;
    /// calling it while a command is outstanding is rejected and logged.
    ///
    /// # Errors
    ///
    /// Returns a [`DispatchError`] when the session is not running, a command
    /// is in flight, or the user-action gate is closed.
    pub fn dispatch_current(&mut self, now: TInstant) -> Result<CommandEnvelope, DispatchError> {
        if self.phase != Phase::Running {
            return Err(DispatchError::NotRunning(self.phase()));
        }

        let Some(test) = self.catalog.get(self.current_index) else {
            return Err(DispatchError::NotRunning(self.phase()));
        };

        if let Some(active) = self.correlator.active_id() {
            self.log.warning(
                format!(
                    "Duplicate dispatch of '{}' rejected: command {active} still in flight",
                    test.name
                ),
                now.unix_millis(),
            );
            return Err(DispatchError::CommandInFlight(active.clone()));
        }

        if self.user_action.is_some() {
            return Err(DispatchError::AwaitingUserAction);
        }

        let envelope = match self.correlator.issue(test, self.current_index, now) {
            Ok(envelope) => envelope,
            Err(DispatchRejection::CommandInFlight { active }) => {
                return Err(DispatchError::CommandInFlight(active));
            }
        };

        self.next_dispatch_at = None;
        self.timeout.arm(envelope.id.clone(), now, test.timeout());
        self.log.info(
            format!("Starting test: {} ({})", test.name, envelope.id),
            now.unix_millis(),
        );
        Ok(envelope)
    }

    /// Reports that the envelope reached the peripheral.
    ///
    /// The countdown already runs from dispatch, so a write that never
    /// completes still ends in a timeout.
    pub fn send_completed(&mut self, command_id: &CommandId, now: TInstant) {
        match self.correlator.active() {
            Some(active) if active.id == *command_id => log::debug!(
                "{command_id} written after {} ms",
                duration_millis(now.saturating_duration_since(active.dispatched_at))
            ),
            _ => log::debug!("send of {command_id} completed after resolution"),
        }
    }

    /// Reports that writing the envelope failed; the test fails without a timeout.
    pub fn send_failed(
        &mut self,
        command_id: &CommandId,
        reason: &str,
        now: TInstant,
    ) -> Vec<SessionAction> {
        let Some(active) = self.correlator.resolve(command_id) else {
            log::debug!("send failure for {command_id} after resolution");
            return Vec::new();
        };
        self.timeout.cancel_for(command_id);

        let name = self.test_name(active.test_index);
        self.log.push(
            LogLevel::Error,
            format!("Failed to send command for '{name}'"),
            Some(reason.to_string()),
            now.unix_millis(),
        );

        let result = TestResult {
            name,
            status: TestStatus::Fail,
            details: format!("{SEND_FAILED_MARKER}: {reason}"),
            elapsed_ms: elapsed_ms(&active, now),
            timestamp_ms: now.unix_millis(),
            raw_response: None,
            evaluation_data: None,
        };
        self.complete_test(active.test_index, result, now)
    }

    /// Decodes and routes one notification from the event channel.
    pub fn handle_notification(&mut self, bytes: &[u8], now: TInstant) -> Vec<SessionAction> {
        if !matches!(self.phase, Phase::Running | Phase::Completed) {
            log::debug!(
                "dropping {} byte notification while {}",
                bytes.len(),
                self.phase()
            );
            return Vec::new();
        }

        self.log.info(
            format!("[BLE RX] {}", String::from_utf8_lossy(bytes).trim()),
            now.unix_millis(),
        );

        match decode(bytes) {
            InboundEvent::TestResult(message) => self.on_test_result(message, now),
            InboundEvent::Instruction(instruction) => {
                self.on_instruction(instruction, now);
                Vec::new()
            }
            InboundEvent::Summary(summary) => {
                self.log
                    .info(format!("Received {}", summary.summary_type), now.unix_millis());
                self.summaries.push(summary);
                Vec::new()
            }
            InboundEvent::Unrecognized(value) => {
                let kind = value
                    .get("type")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or("unknown")
                    .to_string();
                self.log.push(
                    LogLevel::Warning,
                    format!("Unhandled message type: {kind}"),
                    Some(value.to_string()),
                    now.unix_millis(),
                );
                Vec::new()
            }
            InboundEvent::Text(line) => self.on_text(line, now),
        }
    }

    /// Clears the user-action gate and resumes dispatch if one is due.
    pub fn confirm_user_action(&mut self, now: TInstant) -> Vec<SessionAction> {
        if self.user_action.take().is_none() {
            log::debug!("no user action pending");
            return Vec::new();
        }

        self.log.info("User action confirmed", now.unix_millis());
        self.poll(now)
    }

    /// Fires due timeouts and settle-delay dispatches.
    pub fn poll(&mut self, now: TInstant) -> Vec<SessionAction> {
        let mut actions = Vec::new();

        if let Some(expiry) = self.timeout.poll(now) {
            actions.extend(self.on_timeout(&expiry, now));
        }

        if self.next_dispatch_at.is_some_and(|due| now >= due) {
            actions.extend(self.dispatch_if_ready(now));
        }

        actions
    }

    /// Earliest instant at which [`poll`](Self::poll) has work to do.
    #[must_use]
    pub fn next_deadline(&self) -> Option<TInstant> {
        let dispatch = self
            .next_dispatch_at
            .filter(|_| self.phase == Phase::Running && self.user_action.is_none());

        match (self.timeout.deadline(), dispatch) {
            (Some(timeout), Some(dispatch)) => Some(timeout.min(dispatch)),
            (timeout, dispatch) => timeout.or(dispatch),
        }
    }

    /// Tears the session down from any phase and asks the driver to disconnect.
    pub fn reset(&mut self, now: TInstant) -> Vec<SessionAction> {
        let previous = self.phase();
        self.clear_session();
        self.phase = Phase::Idle;
        log::info!(
            target: "qc_core::session",
            "session reset from {previous} at {}",
            now.unix_millis()
        );
        vec![SessionAction::Disconnect]
    }

    /// Appends a driver-side note to the session log.
    pub fn note(
        &mut self,
        level: LogLevel,
        message: impl Into<String>,
        details: Option<String>,
        now: TInstant,
    ) {
        self.log.push(level, message, details, now.unix_millis());
    }

    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        match self.phase {
            Phase::Idle => SessionPhase::Idle,
            Phase::Connecting => SessionPhase::Connecting,
            Phase::Running if self.user_action.is_some() => SessionPhase::AwaitingUserAction {
                index: self.current_index,
            },
            Phase::Running => SessionPhase::Running {
                index: self.current_index,
            },
            Phase::Completed => SessionPhase::Completed,
        }
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        SessionState {
            current_test_index: self.current_index,
            progress: self.results.progress(),
            awaiting_user_action: self.user_action.is_some(),
            user_action_message: self.user_action.clone(),
            is_running: self.phase().is_active(),
            is_completed: self.phase == Phase::Completed,
            active_command_id: self.correlator.active_id().cloned(),
        }
    }

    #[must_use]
    pub fn results(&self) -> &ResultAggregator {
        &self.results
    }

    #[must_use]
    pub fn log(&self) -> &SessionLog {
        &self.log
    }

    #[must_use]
    pub fn summaries(&self) -> &[SummaryMessage] {
        &self.summaries
    }

    #[must_use]
    pub fn catalog(&self) -> &TestCatalog {
        &self.catalog
    }

    #[must_use]
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Finalized report of the last completed run, retained for save retries.
    #[must_use]
    pub fn report(&self) -> Option<&RunReport> {
        self.report.as_ref()
    }

    /// Returns `true` while a timeout countdown is armed.
    #[must_use]
    pub fn timeout_armed(&self) -> bool {
        self.timeout.is_armed()
    }

    #[must_use]
    pub fn current_test(&self) -> Option<&TestDefinition> {
        match self.phase {
            Phase::Running | Phase::Completed => self.catalog.get(self.current_index),
            Phase::Idle | Phase::Connecting => None,
        }
    }

    fn on_test_result(&mut self, message: TestResultMessage, now: TInstant) -> Vec<SessionAction> {
        let matched = self.correlator.active().cloned().filter(|active| {
            self.catalog
                .get(active.test_index)
                .is_some_and(|test| test.answers_kind(&message.kind))
        });

        let Some(active) = matched else {
            self.on_uncorrelated_result(&message, now);
            return Vec::new();
        };

        let Some(test) = self.catalog.get(active.test_index) else {
            return Vec::new();
        };
        let threshold = test
            .evaluation_threshold
            .unwrap_or(self.config.rms_threshold);

        let reading = match DualChannelReading::from_payload(&message.payload) {
            Ok(reading) => reading,
            Err(err) => {
                self.log.push(
                    LogLevel::Warning,
                    format!("Malformed {} response for {}: {err}", message.kind, active.id),
                    Some(message.raw.to_string()),
                    now.unix_millis(),
                );
                return Vec::new();
            }
        };

        if self.correlator.resolve(&active.id).is_none() {
            return Vec::new();
        }
        self.timeout.cancel_for(&active.id);

        let evaluation = evaluate(reading, threshold);
        for verdict in &evaluation.channels {
            self.log.info(
                format!(
                    "{} channel: {:.1} RMS ({})",
                    verdict.channel,
                    verdict.value,
                    TestStatus::from_passed(verdict.passed)
                ),
                now.unix_millis(),
            );
        }

        let status = TestStatus::from_passed(evaluation.overall_pass);
        self.log.push(
            verdict_level(status),
            format!("Test completed: {status}"),
            Some(evaluation.details.clone()),
            now.unix_millis(),
        );

        let result = TestResult {
            name: test.name.clone(),
            status,
            details: evaluation.details.clone(),
            elapsed_ms: elapsed_ms(&active, now),
            timestamp_ms: now.unix_millis(),
            raw_response: Some(message.raw),
            evaluation_data: Some(evaluation.data()),
        };
        self.complete_test(active.test_index, result, now)
    }

    fn on_uncorrelated_result(&mut self, message: &TestResultMessage, now: TInstant) {
        let stale = self.catalog.iter().enumerate().find_map(|(index, test)| {
            if test.answers_kind(&message.kind) {
                self.correlator.last_resolved_for(index)
            } else {
                None
            }
        });

        match stale {
            Some(resolved) => {
                let message = format!(
                    "Ignoring late {} result: command {} already resolved",
                    message.kind, resolved.id
                );
                self.log.info(message, now.unix_millis());
            }
            None => self.log.push(
                LogLevel::Warning,
                format!("Result {} does not match the command in flight", message.kind),
                Some(message.raw.to_string()),
                now.unix_millis(),
            ),
        }
    }

    fn on_instruction(&mut self, instruction: InstructionMessage, now: TInstant) {
        if instruction.wait_for_user {
            self.log.warning(
                format!("User action required: {}", instruction.instruction),
                now.unix_millis(),
            );
            self.open_gate(instruction.instruction);
        } else {
            self.log.info(
                format!("Instruction: {}", instruction.instruction),
                now.unix_millis(),
            );
        }
    }

    fn on_text(&mut self, line: TextLine, now: TInstant) -> Vec<SessionAction> {
        if line.is_unmatched() {
            self.log.push(
                LogLevel::Warning,
                "Unrecognized message",
                Some(line.text),
                now.unix_millis(),
            );
            return Vec::new();
        }

        if line.user_action {
            self.log.warning(
                format!("User action required: {}", line.text),
                now.unix_millis(),
            );
            self.open_gate(line.text.clone());
        }

        let Some(verdict) = line.verdict else {
            return Vec::new();
        };
        let Some(active) = self
            .correlator
            .active()
            .cloned()
            .and_then(|active| self.correlator.resolve(&active.id))
        else {
            self.log.info(
                "Ignoring text verdict with no command in flight",
                now.unix_millis(),
            );
            return Vec::new();
        };
        self.timeout.cancel_for(&active.id);

        let status = match verdict {
            TextVerdict::Pass => TestStatus::Pass,
            TextVerdict::Fail => TestStatus::Fail,
        };
        self.log.push(
            verdict_level(status),
            format!("Received test result: {status}"),
            None,
            now.unix_millis(),
        );

        let result = TestResult {
            name: self.test_name(active.test_index),
            status,
            details: line.text,
            elapsed_ms: elapsed_ms(&active, now),
            timestamp_ms: now.unix_millis(),
            raw_response: None,
            evaluation_data: None,
        };
        self.complete_test(active.test_index, result, now)
    }

    fn on_timeout(
        &mut self,
        expiry: &TimeoutExpiry,
        now: TInstant,
    ) -> Vec<SessionAction> {
        let Some(active) = self.correlator.resolve(&expiry.command_id) else {
            log::debug!("stale timeout for {}", expiry.command_id);
            return Vec::new();
        };

        let name = self.test_name(active.test_index);
        let elapsed = duration_millis(expiry.elapsed);
        let limit = duration_millis(expiry.limit);
        self.log.error(
            format!("Test '{name}' timed out after {elapsed} ms"),
            now.unix_millis(),
        );

        let result = TestResult {
            name,
            status: TestStatus::Fail,
            details: format!("{TIMEOUT_MARKER} after {elapsed} ms (limit {limit} ms)"),
            elapsed_ms: elapsed,
            timestamp_ms: now.unix_millis(),
            raw_response: None,
            evaluation_data: None,
        };
        self.complete_test(active.test_index, result, now)
    }

    fn complete_test(
        &mut self,
        test_index: usize,
        result: TestResult,
        now: TInstant,
    ) -> Vec<SessionAction> {
        self.results.record(test_index, result);

        if test_index + 1 < self.catalog.len() {
            self.current_index = test_index + 1;
            self.next_dispatch_at = Some(now + self.config.settle_delay());
            return Vec::new();
        }

        self.phase = Phase::Completed;
        self.next_dispatch_at = None;
        self.user_action = None;

        let summary = self.results.summary();
        self.log.push(
            match summary.device_status {
                DeviceStatus::Ready => LogLevel::Success,
                DeviceStatus::Defective => LogLevel::Error,
            },
            format!(
                "All tests completed: {}/{} passed, device {}",
                summary.passed_tests, summary.total_tests, summary.device_status
            ),
            None,
            now.unix_millis(),
        );

        let report = RunReport {
            session_id: self.session_id.clone().unwrap_or_default(),
            started_at_ms: self.started_at.map_or(0, |start| start.unix_millis()),
            finished_at_ms: now.unix_millis(),
            summary,
            results: self.results.results().to_vec(),
        };
        self.report = Some(report.clone());
        vec![SessionAction::Persist(report)]
    }

    fn dispatch_if_ready(&mut self, now: TInstant) -> Vec<SessionAction> {
        if self.phase != Phase::Running
            || self.user_action.is_some()
            || self.correlator.active().is_some()
        {
            return Vec::new();
        }

        match self.dispatch_current(now) {
            Ok(envelope) => vec![SessionAction::Send(envelope)],
            Err(err) => {
                log::debug!("dispatch deferred: {err}");
                Vec::new()
            }
        }
    }

    fn open_gate(&mut self, message: String) {
        if self.phase == Phase::Running {
            self.user_action = Some(message);
        }
    }

    fn test_name(&self, index: usize) -> String {
        self.catalog
            .get(index)
            .map(|test| test.name.clone())
            .unwrap_or_default()
    }

    fn clear_session(&mut self) {
        self.timeout.cancel();
        self.correlator.clear();
        self.results.clear(self.catalog.len());
        self.log.clear();
        self.current_index = 0;
        self.user_action = None;
        self.next_dispatch_at = None;
        self.summaries.clear();
        self.session_id = None;
        self.started_at = None;
        self.report = None;
    }
}

fn elapsed_ms<TInstant: SessionInstant>(active: &ActiveCommand<TInstant>, now: TInstant) -> u64 {
    duration_millis(now.saturating_duration_since(active.dispatched_at))
}

const fn verdict_level(status: TestStatus) -> LogLevel {
    match status {
        TestStatus::Pass => LogLevel::Success,
        TestStatus::Fail => LogLevel::Error,
    }
}
