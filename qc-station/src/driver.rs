//! Tokio driver for the test sequencer.
//!
//! One task owns the sequencer, the transport, and the result store. It
//! serializes operator control messages, transport notifications, and the
//! sequencer's next deadline through a single `select!`, executes the
//! [`SessionAction`]s the sequencer returns, and publishes a
//! [`SessionSnapshot`] after every step so front-ends can render without
//! touching session state directly.

use std::collections::VecDeque;
use std::future::pending;

use chrono::Utc;
use qc_core::catalog::TestCatalog;
use qc_core::protocol::CommandEnvelope;
use qc_core::results::{DeviceStatus, RunReport, RunSummary, TestResult};
use qc_core::sequencer::{SessionAction, SessionPhase, SessionState, TestSequencer};
use qc_core::session_log::{LogEntry, LogLevel};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{Instant, sleep_until};

use crate::config::{ConfigError, DiscoveryConfig, StationConfig};
use crate::discovery::{self, DiscoveryReporter};
use crate::instant::StationInstant;
use crate::persistence::{PersistenceError, ResultStore, StoredRun};
use crate::transport::{DiscoveredDevice, EventSubscription, Transport};

const CONTROL_QUEUE_DEPTH: usize = 16;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("orchestrator task is no longer running")]
    ChannelClosed,
    #[error("{0}")]
    Rejected(String),
    #[error("no completed run to save")]
    NothingToSave,
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error("orchestrator task failed: {0}")]
    Task(#[from] JoinError),
}

type Reply<T> = oneshot::Sender<Result<T, OrchestratorError>>;

/// Requests accepted by the driver task.
#[derive(Debug)]
pub enum ControlMessage {
    Start(Reply<()>),
    Confirm(Reply<()>),
    Reset(oneshot::Sender<()>),
    Save(Reply<String>),
    Shutdown,
}

/// Read-only view of the session published after every driver step.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionSnapshot {
    pub session_id: Option<String>,
    pub phase: SessionPhase,
    pub state: SessionState,
    pub total_tests: usize,
    pub current_test: Option<String>,
    pub results: Vec<TestResult>,
    pub summary: RunSummary,
    pub log: Vec<LogEntry>,
    pub device: Option<DiscoveredDevice>,
    /// A completed run has not been stored yet.
    pub pending_save: bool,
    pub last_saved: Option<String>,
}

impl SessionSnapshot {
    /// Final device status once the run has completed.
    #[must_use]
    pub fn verdict(&self) -> Option<DeviceStatus> {
        (self.phase == SessionPhase::Completed).then_some(self.summary.device_status)
    }
}

/// Handle to the running driver task.
pub struct Orchestrator {
    control: mpsc::Sender<ControlMessage>,
    snapshots: watch::Receiver<SessionSnapshot>,
    task: JoinHandle<()>,
}

impl Orchestrator {
    /// Spawns the driver on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when the configured test catalog is invalid.
    pub fn spawn<T, S>(transport: T, store: S, config: &StationConfig) -> Result<Self, ConfigError>
    where
        T: Transport + 'static,
        S: ResultStore + 'static,
    {
        Ok(Self::with_catalog(transport, store, config.catalog()?, config))
    }

    /// Spawns the driver with an already validated catalog.
    #[must_use]
    pub fn with_catalog<T, S>(
        transport: T,
        store: S,
        catalog: TestCatalog,
        config: &StationConfig,
    ) -> Self
    where
        T: Transport + 'static,
        S: ResultStore + 'static,
    {
        let sequencer = TestSequencer::new(catalog, config.orchestrator.clone());
        let (publisher, snapshots) = watch::channel(blank_snapshot());
        let session = Session {
            sequencer,
            store,
            device: None,
            stored: None,
            last_saved: None,
            snapshots: publisher,
        };
        session.publish();

        let (control, inbox) = mpsc::channel(CONTROL_QUEUE_DEPTH);
        let driver = Driver {
            transport,
            control: inbox,
            subscription: None,
            discovery: config.discovery.clone(),
            service_uuid: config.gatt.service_uuid.clone(),
            session,
        };

        Self {
            control,
            snapshots,
            task: tokio::spawn(driver.run()),
        }
    }

    /// Starts a QC session for the device on the fixture.
    ///
    /// Returns once the session is accepted; discovery and the tests proceed
    /// in the background.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::Rejected`] while a session is active.
    pub async fn start(&self) -> Result<(), OrchestratorError> {
        self.request(ControlMessage::Start).await?
    }

    /// Clears the user-action gate.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::Rejected`] when no prompt is pending.
    pub async fn confirm(&self) -> Result<(), OrchestratorError> {
        self.request(ControlMessage::Confirm).await?
    }

    /// Tears down the session and releases the connection.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::ChannelClosed`] when the driver has exited.
    pub async fn reset(&self) -> Result<(), OrchestratorError> {
        self.request(ControlMessage::Reset).await
    }

    /// Stores the last completed run, retrying a failed save.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::NothingToSave`] before any run completed
    /// and [`OrchestratorError::Persistence`] when the store fails again.
    pub async fn save(&self) -> Result<String, OrchestratorError> {
        self.request(ControlMessage::Save).await?
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshots.borrow().clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.clone()
    }

    /// Waits until a published snapshot satisfies `predicate`.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::ChannelClosed`] if the driver exits first.
    pub async fn wait_until(
        &self,
        predicate: impl FnMut(&SessionSnapshot) -> bool,
    ) -> Result<SessionSnapshot, OrchestratorError> {
        let mut snapshots = self.snapshots.clone();
        let snapshot = snapshots
            .wait_for(predicate)
            .await
            .map_err(|_| OrchestratorError::ChannelClosed)?;
        Ok(snapshot.clone())
    }

    /// Stops the driver, disconnecting from the peripheral.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::Task`] if the driver task panicked.
    pub async fn shutdown(self) -> Result<(), OrchestratorError> {
        if self.control.send(ControlMessage::Shutdown).await.is_err() {
            log::debug!("driver already stopped");
        }
        self.task.await?;
        Ok(())
    }

    async fn request<R>(
        &self,
        message: impl FnOnce(oneshot::Sender<R>) -> ControlMessage,
    ) -> Result<R, OrchestratorError> {
        let (reply, response) = oneshot::channel();
        self.control
            .send(message(reply))
            .await
            .map_err(|_| OrchestratorError::ChannelClosed)?;
        response.await.map_err(|_| OrchestratorError::ChannelClosed)
    }
}

/// Control message that preempts an in-progress connect or write.
enum Interrupt {
    Reset(oneshot::Sender<()>),
    Shutdown,
}

struct Driver<T, S> {
    transport: T,
    control: mpsc::Receiver<ControlMessage>,
    subscription: Option<EventSubscription>,
    discovery: DiscoveryConfig,
    service_uuid: String,
    session: Session<S>,
}

impl<T, S> Driver<T, S>
where
    T: Transport,
    S: ResultStore,
{
    async fn run(mut self) {
        loop {
            let deadline = self
                .session
                .sequencer
                .next_deadline()
                .map(|deadline| deadline.monotonic());

            tokio::select! {
                message = self.control.recv() => {
                    let Some(message) = message else {
                        break;
                    };
                    if !self.on_control(message).await {
                        break;
                    }
                }
                notification = next_notification(&mut self.subscription) => {
                    if let Some(bytes) = notification {
                        let actions = self
                            .session
                            .sequencer
                            .handle_notification(&bytes, StationInstant::now());
                        if !self.apply(actions).await {
                            break;
                        }
                    } else {
                        log::warn!("event channel closed by the transport");
                        self.subscription = None;
                    }
                }
                () = wait_until(deadline) => {
                    let actions = self.session.sequencer.poll(StationInstant::now());
                    if !self.apply(actions).await {
                        break;
                    }
                }
            }

            self.session.publish();
        }

        self.subscription = None;
        self.transport.disconnect().await;
        self.session.publish();
        log::info!("orchestrator stopped");
    }

    /// Handles one control message; returns `false` when the driver should stop.
    async fn on_control(&mut self, message: ControlMessage) -> bool {
        match message {
            ControlMessage::Shutdown => false,
            ControlMessage::Reset(reply) => {
                self.reset().await;
                reply.send(()).ok();
                true
            }
            other => {
                let actions = self.session.answer(other).await;
                self.apply(actions).await
            }
        }
    }

    /// Executes `actions`, servicing a reset that interrupted them.
    async fn apply(&mut self, actions: Vec<SessionAction>) -> bool {
        match self.execute(actions).await {
            Ok(()) => true,
            Err(Interrupt::Reset(reply)) => {
                self.reset().await;
                reply.send(()).ok();
                true
            }
            Err(Interrupt::Shutdown) => false,
        }
    }

    async fn reset(&mut self) {
        let actions = self.session.sequencer.reset(StationInstant::now());
        if let Some(run) = self.session.stored.take() {
            if self.session.last_saved.is_none() {
                log::warn!(
                    "discarding unsaved report {} on reset",
                    run.report.session_id
                );
            }
        }
        self.session.device = None;
        self.session.last_saved = None;

        if self.execute(actions).await.is_err() {
            log::debug!("reset interrupted while disconnecting");
        }
    }

    async fn execute(&mut self, actions: Vec<SessionAction>) -> Result<(), Interrupt> {
        let mut queue = VecDeque::from(actions);
        while let Some(action) = queue.pop_front() {
            match action {
                SessionAction::Connect => queue.extend(self.connect().await?),
                SessionAction::Send(envelope) => queue.extend(self.send(&envelope).await?),
                SessionAction::Disconnect => {
                    self.subscription = None;
                    self.transport.disconnect().await;
                }
                SessionAction::Persist(report) => self.session.persist(report).await,
            }
            self.session.publish();
        }
        Ok(())
    }

    /// Runs discovery while still answering control messages.
    ///
    /// A reset or shutdown drops the in-flight connect future, which cancels
    /// whatever scan or connect step it was waiting on.
    async fn connect(&mut self) -> Result<Vec<SessionAction>, Interrupt> {
        let discovery_config = self.discovery.clone();
        let service_uuid = self.service_uuid.clone();
        let (progress, mut progress_lines) = mpsc::unbounded_channel();
        let mut reporter = ChannelReporter { progress };
        let mut deferred = Vec::new();

        let outcome = {
            let connect = discovery::connect_peripheral(
                &mut self.transport,
                &discovery_config,
                &service_uuid,
                &mut reporter,
            );
            tokio::pin!(connect);

            loop {
                tokio::select! {
                    outcome = &mut connect => break outcome,
                    Some(line) = progress_lines.recv() => {
                        self.session.note(LogLevel::Info, line, None);
                        self.session.publish();
                    }
                    message = self.control.recv() => match message {
                        Some(ControlMessage::Reset(reply)) => return Err(Interrupt::Reset(reply)),
                        Some(ControlMessage::Shutdown) | None => return Err(Interrupt::Shutdown),
                        Some(other) => deferred.extend(self.session.answer(other).await),
                    }
                }
            }
        };

        while let Ok(line) = progress_lines.try_recv() {
            self.session.note(LogLevel::Info, line, None);
        }

        let now = StationInstant::now();
        let subscribed = outcome
            .map_err(|err| err.to_string())
            .and_then(|device| match self.transport.subscribe() {
                Ok(subscription) => Ok((device, subscription)),
                Err(err) => Err(err.to_string()),
            });

        match subscribed {
            Ok((device, subscription)) => {
                self.subscription = Some(subscription);
                self.session.device = Some(device);
                deferred.extend(self.session.sequencer.connection_established(now));
            }
            Err(reason) => {
                deferred.extend(self.session.sequencer.connection_failed(&reason, now));
            }
        }
        Ok(deferred)
    }

    /// Writes one envelope while the driver keeps servicing its other inputs.
    ///
    /// A write still pending at the deadline is dropped and the timeout
    /// result recorded; a reset or shutdown drops it as well.
    async fn send(&mut self, envelope: &CommandEnvelope) -> Result<Vec<SessionAction>, Interrupt> {
        let bytes = match envelope.encode() {
            Ok(bytes) => bytes,
            Err(err) => {
                return Ok(self.session.sequencer.send_failed(
                    &envelope.id,
                    &err.to_string(),
                    StationInstant::now(),
                ));
            }
        };

        self.session.note(
            LogLevel::Info,
            format!("[BLE TX] {}", String::from_utf8_lossy(&bytes)),
            None,
        );
        self.session.publish();

        let deadline = self
            .session
            .sequencer
            .next_deadline()
            .map(|deadline| deadline.monotonic());
        let mut deferred = Vec::new();

        let outcome = {
            let write = self.transport.send(&bytes);
            tokio::pin!(write);

            loop {
                tokio::select! {
                    outcome = &mut write => break Some(outcome),
                    () = wait_until(deadline) => break None,
                    Some(bytes) = next_notification(&mut self.subscription) => {
                        deferred.extend(
                            self.session
                                .sequencer
                                .handle_notification(&bytes, StationInstant::now()),
                        );
                        self.session.publish();
                    }
                    message = self.control.recv() => match message {
                        Some(ControlMessage::Reset(reply)) => return Err(Interrupt::Reset(reply)),
                        Some(ControlMessage::Shutdown) | None => return Err(Interrupt::Shutdown),
                        Some(other) => deferred.extend(self.session.answer(other).await),
                    }
                }
            }
        };

        let now = StationInstant::now();
        match outcome {
            Some(Ok(())) => self.session.sequencer.send_completed(&envelope.id, now),
            Some(Err(err)) => deferred.extend(self.session.sequencer.send_failed(
                &envelope.id,
                &err.to_string(),
                now,
            )),
            None => {
                log::warn!("write of {} still pending at its deadline", envelope.id);
                deferred.extend(self.session.sequencer.poll(now));
            }
        }
        Ok(deferred)
    }
}

/// Session state that does not depend on the transport.
struct Session<S> {
    sequencer: TestSequencer<StationInstant>,
    store: S,
    device: Option<DiscoveredDevice>,
    /// Last completed run, kept until reset so a failed save can be retried.
    stored: Option<StoredRun>,
    last_saved: Option<String>,
    snapshots: watch::Sender<SessionSnapshot>,
}

impl<S> Session<S>
where
    S: ResultStore,
{
    /// Answers start, confirm, and save requests.
    async fn answer(&mut self, message: ControlMessage) -> Vec<SessionAction> {
        let now = StationInstant::now();
        match message {
            ControlMessage::Start(reply) => match self.sequencer.start(now) {
                Ok(actions) => {
                    self.device = None;
                    self.stored = None;
                    self.last_saved = None;
                    reply.send(Ok(())).ok();
                    actions
                }
                Err(err) => {
                    reply
                        .send(Err(OrchestratorError::Rejected(err.to_string())))
                        .ok();
                    Vec::new()
                }
            },
            ControlMessage::Confirm(reply) => {
                if !self.sequencer.state().awaiting_user_action {
                    reply
                        .send(Err(OrchestratorError::Rejected(
                            "no user action is pending".to_string(),
                        )))
                        .ok();
                    return Vec::new();
                }
                reply.send(Ok(())).ok();
                self.sequencer.confirm_user_action(now)
            }
            ControlMessage::Save(reply) => {
                reply.send(self.save().await).ok();
                Vec::new()
            }
            ControlMessage::Reset(_) | ControlMessage::Shutdown => Vec::new(),
        }
    }

    async fn persist(&mut self, report: RunReport) {
        let run = StoredRun {
            report,
            device_name: self.device.as_ref().and_then(|device| device.name.clone()),
            device_address: self.device.as_ref().map(|device| device.address.clone()),
            recorded_at: Utc::now(),
            session_log: self.sequencer.log().to_text(),
        };
        self.stored = Some(run);
        self.last_saved = None;

        if let Err(err) = self.save().await {
            log::error!("run report kept for retry: {err}");
        }
    }

    async fn save(&mut self) -> Result<String, OrchestratorError> {
        let Some(run) = &self.stored else {
            return Err(OrchestratorError::NothingToSave);
        };

        match self.store.save(run).await {
            Ok(location) => {
                self.note(
                    LogLevel::Success,
                    format!("Results saved to {location}"),
                    None,
                );
                self.last_saved = Some(location.clone());
                Ok(location)
            }
            Err(err) => {
                self.note(
                    LogLevel::Error,
                    "Failed to save results",
                    Some(err.to_string()),
                );
                Err(err.into())
            }
        }
    }

    fn note(&mut self, level: LogLevel, message: impl Into<String>, details: Option<String>) {
        self.sequencer
            .note(level, message, details, StationInstant::now());
    }

    fn snapshot(&self) -> SessionSnapshot {
        let sequencer = &self.sequencer;
        SessionSnapshot {
            session_id: sequencer.session_id().map(str::to_string),
            phase: sequencer.phase(),
            state: sequencer.state(),
            total_tests: sequencer.catalog().len(),
            current_test: sequencer.current_test().map(|test| test.name.clone()),
            results: sequencer.results().results().to_vec(),
            summary: sequencer.results().summary(),
            log: sequencer.log().entries().to_vec(),
            device: self.device.clone(),
            pending_save: self.stored.is_some() && self.last_saved.is_none(),
            last_saved: self.last_saved.clone(),
        }
    }

    fn publish(&self) {
        self.snapshots.send_replace(self.snapshot());
    }
}

fn blank_snapshot() -> SessionSnapshot {
    SessionSnapshot {
        session_id: None,
        phase: SessionPhase::Idle,
        state: SessionState::default(),
        total_tests: 0,
        current_test: None,
        results: Vec::new(),
        summary: RunSummary {
            total_tests: 0,
            passed_tests: 0,
            failed_tests: 0,
            device_status: DeviceStatus::Defective,
        },
        log: Vec::new(),
        device: None,
        pending_save: false,
        last_saved: None,
    }
}

/// Forwards discovery progress into the driver's session log.
struct ChannelReporter {
    progress: mpsc::UnboundedSender<String>,
}

impl DiscoveryReporter for ChannelReporter {
    fn scanning(&mut self, attempt: u32, of: u32) {
        self.progress
            .send(format!("Scanning for device (attempt {attempt}/{of})"))
            .ok();
    }

    fn found(&mut self, device: &DiscoveredDevice) {
        self.progress
            .send(format!(
                "Found device: {} ({})",
                device.display_name(),
                device.address
            ))
            .ok();
    }
}

async fn next_notification(subscription: &mut Option<EventSubscription>) -> Option<Vec<u8>> {
    match subscription {
        Some(subscription) => subscription.recv().await,
        None => pending().await,
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending().await,
    }
}
