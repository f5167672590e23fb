mod support;

use qc_core::results::{DeviceStatus, TestStatus};
use qc_core::session_log::LogLevel;
use qc_core::sequencer::SessionPhase;

use support::{
    at, begin, expect_persist, expect_send, mic_reply, single_test_sequencer, speaker_reply,
    two_test_sequencer,
};

#[test]
fn passing_balance_test_completes_and_persists_ready_device() {
    let mut sequencer = single_test_sequencer();
    let envelope = begin(&mut sequencer, at(0));
    assert_eq!(envelope.command, "qa_mic_lr_test");
    assert_eq!(envelope.payload["volume_percent"], 95);

    let actions = sequencer.handle_notification(&mic_reply(5_000.0, 5_100.0), at(3_000));
    let report = expect_persist(&actions);

    assert_eq!(report.session_id, "qc_1700000000");
    assert_eq!(report.summary.device_status, DeviceStatus::Ready);
    assert_eq!(report.summary.passed_tests, 1);
    assert_eq!(report.finished_at_ms, 1_700_000_003_000);

    let result = &report.results[0];
    assert_eq!(result.status, TestStatus::Pass);
    assert_eq!(
        result.details,
        "L: 5000.0 RMS (PASS), R: 5100.0 RMS (PASS) [Threshold: >4500]"
    );
    assert_eq!(result.elapsed_ms, 3_000);
    assert!(result.raw_response.is_some());
    assert!(
        result
            .evaluation_data
            .is_some_and(|data| data.left_passed && data.right_passed)
    );

    let state = sequencer.state();
    assert!(state.is_completed);
    assert!(!state.is_running);
    assert!((state.progress - 100.0).abs() < f64::EPSILON);
    assert_eq!(sequencer.phase(), SessionPhase::Completed);
    assert!(!sequencer.timeout_armed());
    assert!(sequencer.next_deadline().is_none());
    assert_eq!(sequencer.report(), Some(&report));
}

#[test]
fn weak_channel_marks_device_defective() {
    let mut sequencer = single_test_sequencer();
    begin(&mut sequencer, at(0));

    let actions = sequencer.handle_notification(&mic_reply(4_000.0, 5_000.0), at(2_500));
    let report = expect_persist(&actions);

    assert_eq!(report.summary.device_status, DeviceStatus::Defective);
    assert_eq!(report.summary.failed_tests, 1);
    assert!(report.results[0].details.ends_with("; failed: L=4000.0"));
}

#[test]
fn next_test_waits_for_settle_delay() {
    let mut sequencer = two_test_sequencer();
    begin(&mut sequencer, at(0));

    let actions = sequencer.handle_notification(&mic_reply(5_000.0, 5_000.0), at(3_000));
    assert!(actions.is_empty());

    let state = sequencer.state();
    assert_eq!(state.current_test_index, 1);
    assert!((state.progress - 50.0).abs() < f64::EPSILON);
    assert!(state.active_command_id.is_none());
    assert_eq!(sequencer.next_deadline(), Some(at(4_500)));

    assert!(sequencer.poll(at(4_499)).is_empty());
    let envelope = expect_send(&sequencer.poll(at(4_500)));
    assert_eq!(envelope.command, "qa_speaker_test");
    sequencer.send_completed(&envelope.id, at(4_510));

    let actions = sequencer.handle_notification(&speaker_reply(1_500.0, 1_200.0), at(6_000));
    let report = expect_persist(&actions);
    assert_eq!(report.results.len(), 2);
    assert_eq!(report.results[1].name, "Test Speaker Sweep");
    assert_eq!(report.results[1].elapsed_ms, 1_500);
    assert_eq!(report.summary.device_status, DeviceStatus::Ready);
}

#[test]
fn text_pass_line_resolves_active_test() {
    let mut sequencer = single_test_sequencer();
    begin(&mut sequencer, at(0));

    let actions = sequencer.handle_notification(b"MIC TEST PASS\r\n", at(1_200));
    let report = expect_persist(&actions);

    let result = &report.results[0];
    assert_eq!(result.status, TestStatus::Pass);
    assert_eq!(result.details, "MIC TEST PASS");
    assert!(result.evaluation_data.is_none());
}

#[test]
fn text_fail_line_resolves_active_test_as_failure() {
    let mut sequencer = single_test_sequencer();
    begin(&mut sequencer, at(0));

    let report = expect_persist(&sequencer.handle_notification(b"MIC TEST FAIL", at(900)));
    assert_eq!(report.results[0].status, TestStatus::Fail);
    assert_eq!(report.summary.device_status, DeviceStatus::Defective);
}

#[test]
fn unmatched_text_is_a_warning_only() {
    let mut sequencer = single_test_sequencer();
    let envelope = begin(&mut sequencer, at(0));

    assert!(sequencer.handle_notification(b"booting dsp", at(100)).is_empty());

    let entry = sequencer.log().latest().expect("log entry");
    assert_eq!(entry.level, LogLevel::Warning);
    assert_eq!(entry.message, "Unrecognized message");
    assert_eq!(entry.details.as_deref(), Some("booting dsp"));
    assert_eq!(sequencer.state().active_command_id, Some(envelope.id));
}

#[test]
fn summaries_and_unknown_messages_do_not_resolve() {
    let mut sequencer = single_test_sequencer();
    let envelope = begin(&mut sequencer, at(0));

    let summary = br#"{"type":"qa_mic_summary","passed":true}"#;
    assert!(sequencer.handle_notification(summary, at(100)).is_empty());
    assert_eq!(sequencer.summaries().len(), 1);
    assert_eq!(sequencer.summaries()[0].summary_type, "qa_mic_summary");

    let unknown = br#"{"type":"battery","level":87}"#;
    assert!(sequencer.handle_notification(unknown, at(200)).is_empty());
    let entry = sequencer.log().latest().expect("log entry");
    assert_eq!(entry.level, LogLevel::Warning);
    assert_eq!(entry.message, "Unhandled message type: battery");

    assert_eq!(sequencer.state().active_command_id, Some(envelope.id));
    assert!(sequencer.results().results().is_empty());
}

#[test]
fn malformed_result_leaves_timeout_as_fallback() {
    let mut sequencer = single_test_sequencer();
    let envelope = begin(&mut sequencer, at(0));

    let malformed = br#"{"kind":"mic_lr_test","payload":{"baseline":{}}}"#;
    assert!(sequencer.handle_notification(malformed, at(1_000)).is_empty());
    assert_eq!(sequencer.state().active_command_id, Some(envelope.id));
    assert!(sequencer.timeout_armed());

    let report = expect_persist(&sequencer.poll(at(10_000)));
    assert!(report.results[0].is_timeout());
}

#[test]
fn result_for_another_test_is_not_correlated() {
    let mut sequencer = two_test_sequencer();
    let envelope = begin(&mut sequencer, at(0));

    assert!(
        sequencer
            .handle_notification(&speaker_reply(2_000.0, 2_000.0), at(500))
            .is_empty()
    );
    assert_eq!(sequencer.state().active_command_id, Some(envelope.id));
    assert!(sequencer.results().results().is_empty());
    assert_eq!(
        sequencer.log().latest().map(|entry| entry.level),
        Some(LogLevel::Warning)
    );
}

#[test]
fn chatty_peripheral_keeps_the_full_audit_trail() {
    let mut sequencer = single_test_sequencer();
    begin(&mut sequencer, at(0));

    for index in 0..600 {
        assert!(
            sequencer
                .handle_notification(format!("debug tick {index}").as_bytes(), at(1 + index))
                .is_empty()
        );
    }
    let actions = sequencer.handle_notification(&mic_reply(5_000.0, 5_000.0), at(3_000));
    let report = expect_persist(&actions);
    assert_eq!(report.results[0].status, TestStatus::Pass);

    let log = sequencer.log();
    assert!(log.len() > 1_200);
    let first = log.oldest_first().next().expect("first entry");
    assert!(first.message.starts_with("Starting QC session"));

    let text = log.to_text();
    assert!(text.contains("Starting QC session"));
    assert!(text.contains("Starting test: Test Mic L/R Balance"));
    assert!(text.contains("debug tick 0"));
}
