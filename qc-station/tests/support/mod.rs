#![allow(dead_code)]

use std::time::Duration;

use qc_core::catalog::{TestDefinition, mic_balance_test};
use qc_station::config::SimulatorConfig;
use qc_station::persistence::MemoryStore;
use qc_station::transport::SimulatedPeripheral;
use qc_station::transport::simulated::SimulatorHandle;
use qc_station::{Orchestrator, SessionSnapshot, StationConfig};
use serde_json::Map;

/// Virtual time allowed for any single wait before a test gives up.
const WAIT_LIMIT: Duration = Duration::from_secs(300);

pub struct Station {
    pub orchestrator: Orchestrator,
    pub device: SimulatorHandle,
    pub store: MemoryStore,
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn config_with(simulator: SimulatorConfig) -> StationConfig {
    StationConfig {
        simulator,
        ..StationConfig::default()
    }
}

pub fn speaker_test() -> TestDefinition {
    TestDefinition {
        name: "Test Speaker Sweep".to_string(),
        command: "qa_speaker_test".to_string(),
        result_kind: Some("speaker_test".to_string()),
        payload: Map::new(),
        timeout_ms: 5_000,
        evaluation_threshold: Some(1_000.0),
        description: "Sweep the speaker and listen on both microphones".to_string(),
    }
}

pub fn two_test_config(simulator: SimulatorConfig) -> StationConfig {
    StationConfig {
        tests: vec![mic_balance_test(), speaker_test()],
        ..config_with(simulator)
    }
}

pub fn spawn(config: &StationConfig) -> Station {
    init_logging();
    let peripheral = SimulatedPeripheral::new(config.simulator.clone(), config.gatt.clone());
    let device = peripheral.handle();
    let store = MemoryStore::new();
    let orchestrator =
        Orchestrator::spawn(peripheral, store.clone(), config).expect("valid configuration");

    Station {
        orchestrator,
        device,
        store,
    }
}

pub async fn wait_for(
    orchestrator: &Orchestrator,
    predicate: impl FnMut(&SessionSnapshot) -> bool,
) -> SessionSnapshot {
    tokio::time::timeout(WAIT_LIMIT, orchestrator.wait_until(predicate))
        .await
        .expect("snapshot condition not reached in time")
        .expect("orchestrator stopped")
}

pub fn logged(snapshot: &SessionSnapshot, prefix: &str) -> bool {
    snapshot
        .log
        .iter()
        .any(|entry| entry.message.starts_with(prefix))
}
