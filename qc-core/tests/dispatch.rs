mod support;

use qc_core::catalog::{TestCatalog, mic_balance_test};
use qc_core::results::DeviceStatus;
use qc_core::sequencer::{
    DispatchError, OrchestratorConfig, SessionAction, SessionPhase, StartError, TestSequencer,
};
use qc_core::session_log::LogLevel;

use support::{
    MockInstant, at, begin, expect_persist, expect_send, mic_reply, single_test_sequencer,
    speaker_reply, speaker_test,
};

#[test]
fn duplicate_dispatch_is_rejected_and_logged() {
    let mut sequencer = single_test_sequencer();
    let envelope = begin(&mut sequencer, at(0));

    let rejection = sequencer
        .dispatch_current(at(50))
        .expect_err("second dispatch must be rejected");
    assert_eq!(rejection, DispatchError::CommandInFlight(envelope.id.clone()));

    let entry = sequencer.log().latest().expect("log entry");
    assert_eq!(entry.level, LogLevel::Warning);
    assert!(entry.message.starts_with("Duplicate dispatch"));
    assert_eq!(sequencer.state().active_command_id, Some(envelope.id));
    assert_eq!(sequencer.next_deadline(), Some(at(10_000)));
}

#[test]
fn dispatch_outside_running_phase_is_rejected() {
    let mut sequencer = single_test_sequencer();
    assert_eq!(
        sequencer.dispatch_current(at(0)),
        Err(DispatchError::NotRunning(SessionPhase::Idle))
    );

    sequencer.start(at(0)).expect("start");
    assert_eq!(
        sequencer.dispatch_current(at(1)),
        Err(DispatchError::NotRunning(SessionPhase::Connecting))
    );
}

#[test]
fn send_failure_fails_test_without_timeout() {
    let mut sequencer = single_test_sequencer();
    sequencer.start(at(0)).expect("start");
    let envelope = expect_send(&sequencer.connection_established(at(0)));

    let report = expect_persist(&sequencer.send_failed(&envelope.id, "GATT write failed", at(5)));
    let result = &report.results[0];
    assert!(result.is_send_failure());
    assert_eq!(result.details, "SEND_FAILED: GATT write failed");
    assert_eq!(report.summary.device_status, DeviceStatus::Defective);
    assert!(!sequencer.timeout_armed());

    sequencer.send_completed(&envelope.id, at(6));
    assert!(!sequencer.timeout_armed());
    assert!(sequencer.poll(at(20_000)).is_empty());
    assert_eq!(sequencer.results().results().len(), 1);
}

#[test]
fn identifiers_stay_unique_without_settle_delay() {
    let catalog = TestCatalog::new(vec![mic_balance_test(), speaker_test()]).expect("catalog");
    let config = OrchestratorConfig {
        settle_delay_ms: 0,
        ..OrchestratorConfig::default()
    };
    let mut sequencer: TestSequencer<MockInstant> = TestSequencer::new(catalog, config);
    let first = begin(&mut sequencer, at(0));

    assert!(
        sequencer
            .handle_notification(&mic_reply(5_000.0, 5_000.0), at(0))
            .is_empty()
    );
    let second = expect_send(&sequencer.poll(at(0)));

    assert_ne!(first.id, second.id);
    assert_eq!(first.id.as_str(), "qa_mic_lr_test_1700000000000");
    assert_eq!(second.id.as_str(), "qa_speaker_test_1700000000001");

    sequencer.send_completed(&second.id, at(0));
    let actions = sequencer.handle_notification(&speaker_reply(1_100.0, 1_100.0), at(800));
    assert_eq!(expect_persist(&actions).summary.device_status, DeviceStatus::Ready);
}

#[test]
fn start_requires_idle_and_a_non_empty_catalog() {
    let mut sequencer = single_test_sequencer();
    begin(&mut sequencer, at(0));
    assert_eq!(
        sequencer.start(at(10)),
        Err(StartError::AlreadyActive(SessionPhase::Running { index: 0 }))
    );

    let empty = TestCatalog::new(Vec::new()).expect("empty catalog");
    let mut sequencer: TestSequencer<MockInstant> =
        TestSequencer::new(empty, OrchestratorConfig::default());
    assert_eq!(sequencer.start(at(0)), Err(StartError::EmptyCatalog));
    assert_eq!(sequencer.phase(), SessionPhase::Idle);
}

#[test]
fn connect_failure_runs_no_tests() {
    let mut sequencer = single_test_sequencer();
    sequencer.start(at(0)).expect("start");

    assert_eq!(
        sequencer.connection_failed("Device not found after 3 attempts", at(21_000)),
        vec![SessionAction::Disconnect]
    );
    assert_eq!(sequencer.phase(), SessionPhase::Idle);
    assert!(sequencer.results().results().is_empty());
    assert!(sequencer.next_deadline().is_none());
    assert!(sequencer.connection_established(at(21_100)).is_empty());
}
