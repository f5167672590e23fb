use std::io;
use std::path::PathBuf;
use std::time::Duration;

use log::LevelFilter;
use qc_core::sequencer::{OrchestratorConfig, SessionPhase};
use qc_station::config::{DiscoveryConfig, FrontEnd, SimulatorConfig};
use qc_station::console::{Console, TranscriptLogger};
use qc_station::persistence::JsonFileStore;
use qc_station::transport::SimulatedPeripheral;
use qc_station::{Orchestrator, SessionSnapshot, StationConfig};
use tokio::sync::watch;

const TRANSCRIPT_DIR: &str = "transcripts";
const RUN_LIMIT: Duration = Duration::from_secs(60);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum TranscriptProfile {
    Ready,
    Defective,
    Prompt,
}

impl TranscriptProfile {
    fn log_path(self) -> PathBuf {
        let name = match self {
            TranscriptProfile::Ready => "station-ready.log",
            TranscriptProfile::Defective => "station-defective.log",
            TranscriptProfile::Prompt => "station-prompt.log",
        };
        PathBuf::from(TRANSCRIPT_DIR).join(name)
    }

    fn header(self) -> &'static str {
        match self {
            TranscriptProfile::Ready => "BLE QC station transcript: passing device",
            TranscriptProfile::Defective => "BLE QC station transcript: weak right microphone",
            TranscriptProfile::Prompt => "BLE QC station transcript: operator prompt",
        }
    }

    fn config(self) -> StationConfig {
        let simulator = match self {
            TranscriptProfile::Ready => SimulatorConfig::default(),
            TranscriptProfile::Defective => SimulatorConfig {
                rms_right: 1_200.0,
                ..SimulatorConfig::default()
            },
            TranscriptProfile::Prompt => SimulatorConfig {
                instruction: Some("Press the button on the device".to_string()),
                instruction_waits: true,
                ..SimulatorConfig::default()
            },
        };

        StationConfig {
            orchestrator: OrchestratorConfig {
                settle_delay_ms: 200,
                ..OrchestratorConfig::default()
            },
            discovery: DiscoveryConfig {
                post_ready_delay_ms: 100,
                scan_window_ms: 300,
                retry_delay_ms: 100,
                post_connect_delay_ms: 100,
                ..DiscoveryConfig::default()
            },
            simulator: SimulatorConfig {
                response_delay_ms: 600,
                ..simulator
            },
            front_end: FrontEnd::Technician,
            ..StationConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> io::Result<()> {
    env_logger::Builder::new()
        .filter_level(LevelFilter::Warn)
        .format_timestamp_millis()
        .parse_default_env()
        .init();

    record_profile(TranscriptProfile::Ready).await?;
    record_profile(TranscriptProfile::Defective).await?;
    record_profile(TranscriptProfile::Prompt).await?;
    Ok(())
}

async fn record_profile(profile: TranscriptProfile) -> io::Result<()> {
    let config = profile.config();
    let transport = SimulatedPeripheral::new(config.simulator.clone(), config.gatt.clone());
    let store = JsonFileStore::new(PathBuf::from(TRANSCRIPT_DIR).join("results"));
    let orchestrator = Orchestrator::spawn(transport, store, &config).map_err(io::Error::other)?;

    let transcript = TranscriptLogger::create(&profile.log_path(), profile.header())?;
    let mut console = Console::new(config.front_end, Some(transcript), orchestrator.snapshot());

    console.handle_line(&orchestrator, "help").await?;
    console.handle_line(&orchestrator, "start").await?;

    if profile == TranscriptProfile::Prompt {
        follow(&mut console, &orchestrator, |snapshot| {
            matches!(
                snapshot.phase,
                SessionPhase::AwaitingUserAction { .. } | SessionPhase::Completed
            )
        })
        .await?;
        console.handle_line(&orchestrator, "status").await?;
        console.handle_line(&orchestrator, "confirm").await?;
    }

    follow(&mut console, &orchestrator, |snapshot| {
        snapshot.phase == SessionPhase::Completed && !snapshot.pending_save
    })
    .await?;

    console.handle_line(&orchestrator, "results").await?;
    console.handle_line(&orchestrator, "log 5").await?;
    console.handle_line(&orchestrator, "reset").await?;
    console.handle_line(&orchestrator, "exit").await?;

    orchestrator.shutdown().await.map_err(io::Error::other)
}

/// Streams snapshot updates into the transcript until `done` holds.
async fn follow(
    console: &mut Console,
    orchestrator: &Orchestrator,
    done: impl FnMut(&SessionSnapshot) -> bool,
) -> io::Result<()> {
    let snapshots = orchestrator.subscribe();
    tokio::time::timeout(RUN_LIMIT, observe_until(console, snapshots, done))
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "QC run did not finish"))?
}

async fn observe_until(
    console: &mut Console,
    mut snapshots: watch::Receiver<SessionSnapshot>,
    mut done: impl FnMut(&SessionSnapshot) -> bool,
) -> io::Result<()> {
    loop {
        let snapshot = snapshots.borrow_and_update().clone();
        console.observe(&snapshot)?;
        if done(&snapshot) {
            return Ok(());
        }
        if snapshots.changed().await.is_err() {
            return Err(io::Error::other("orchestrator stopped"));
        }
    }
}
