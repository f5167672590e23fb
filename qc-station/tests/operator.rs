mod support;

use qc_core::results::DeviceStatus;
use qc_core::sequencer::SessionPhase;
use qc_station::OrchestratorError;
use qc_station::config::SimulatorConfig;

use support::{config_with, logged, spawn, two_test_config, wait_for};

fn prompting_device() -> SimulatorConfig {
    SimulatorConfig {
        instruction: Some("Press the button on the device".to_string()),
        instruction_waits: true,
        ..SimulatorConfig::default()
    }
}

#[tokio::test(start_paused = true)]
async fn operator_gate_holds_next_dispatch_until_confirmed() {
    let station = spawn(&two_test_config(prompting_device()));

    station.orchestrator.start().await.expect("start");
    let gated = wait_for(&station.orchestrator, |snapshot| {
        snapshot.phase == SessionPhase::AwaitingUserAction { index: 1 }
    })
    .await;

    assert!(gated.state.awaiting_user_action);
    assert!(logged(&gated, "User action required"));
    assert_eq!(gated.results.len(), 1);

    tokio::time::sleep(std::time::Duration::from_secs(20)).await;
    assert_eq!(
        station.device.received().len(),
        1,
        "second command must wait for the operator"
    );

    station.orchestrator.confirm().await.expect("confirm");
    let done = wait_for(&station.orchestrator, |snapshot| {
        snapshot.phase == SessionPhase::Completed
    })
    .await;

    let commands: Vec<_> = station
        .device
        .received()
        .into_iter()
        .map(|envelope| envelope.command)
        .collect();
    assert_eq!(commands, ["qa_mic_lr_test", "qa_speaker_test"]);
    assert_eq!(done.results.len(), 2);
    assert_eq!(done.verdict(), Some(DeviceStatus::Ready));
    assert!(!done.state.awaiting_user_action);
}

#[tokio::test(start_paused = true)]
async fn confirm_without_prompt_is_rejected() {
    let station = spawn(&config_with(SimulatorConfig::default()));

    let err = station
        .orchestrator
        .confirm()
        .await
        .expect_err("nothing to confirm");
    assert!(matches!(err, OrchestratorError::Rejected(_)), "{err}");
    assert_eq!(station.orchestrator.snapshot().phase, SessionPhase::Idle);
}

#[tokio::test(start_paused = true)]
async fn reset_after_run_releases_the_link() {
    let station = spawn(&config_with(SimulatorConfig::default()));

    station.orchestrator.start().await.expect("start");
    wait_for(&station.orchestrator, |snapshot| {
        snapshot.phase == SessionPhase::Completed
    })
    .await;
    assert!(station.device.is_connected());

    station.orchestrator.reset().await.expect("reset");
    let snapshot = station.orchestrator.snapshot();
    assert_eq!(snapshot.phase, SessionPhase::Idle);
    assert!(snapshot.results.is_empty());
    assert!(snapshot.last_saved.is_none());
    assert!(!station.device.is_connected());
    assert!(!station.device.has_event_sink());
    assert!(
        !station.device.inject(br#"{"kind":"mic_lr_test","payload":{}}"#.to_vec()),
        "nothing should be listening after reset"
    );
}

#[tokio::test(start_paused = true)]
async fn failed_save_can_be_retried() {
    let station = spawn(&config_with(SimulatorConfig::default()));
    station.store.set_failure(Some("disk full"));

    station.orchestrator.start().await.expect("start");
    let done = wait_for(&station.orchestrator, |snapshot| {
        snapshot.phase == SessionPhase::Completed
    })
    .await;
    assert!(done.pending_save);
    assert!(done.last_saved.is_none());
    assert!(logged(&done, "Failed to save results"));

    let err = station.orchestrator.save().await.expect_err("store still failing");
    assert!(matches!(err, OrchestratorError::Persistence(_)), "{err}");
    assert!(station.store.runs().is_empty());

    station.store.set_failure(None);
    let location = station.orchestrator.save().await.expect("retry succeeds");
    assert!(location.starts_with("memory://qc_"));
    assert_eq!(station.store.runs().len(), 1);

    let saved = wait_for(&station.orchestrator, |snapshot| !snapshot.pending_save).await;
    assert_eq!(saved.last_saved.as_deref(), Some(location.as_str()));
}

#[tokio::test(start_paused = true)]
async fn save_before_any_run_has_nothing_to_store() {
    let station = spawn(&config_with(SimulatorConfig::default()));

    let err = station.orchestrator.save().await.expect_err("no report yet");
    assert!(matches!(err, OrchestratorError::NothingToSave), "{err}");
}

#[tokio::test(start_paused = true)]
async fn shutdown_disconnects_the_peripheral() {
    let station = spawn(&config_with(SimulatorConfig::default()));

    station.orchestrator.start().await.expect("start");
    wait_for(&station.orchestrator, |snapshot| {
        snapshot.phase == SessionPhase::Completed
    })
    .await;

    station.orchestrator.shutdown().await.expect("shutdown");
    assert!(!station.device.is_connected());
    assert!(!station.device.has_event_sink());
}
