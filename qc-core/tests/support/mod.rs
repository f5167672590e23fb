#![allow(dead_code)]

use core::ops::Add;
use core::time::Duration;

use qc_core::catalog::{TestCatalog, TestDefinition, mic_balance_test};
use qc_core::clock::{SessionInstant, duration_millis};
use qc_core::protocol::CommandEnvelope;
use qc_core::sequencer::{OrchestratorConfig, SessionAction, TestSequencer};
use serde_json::{Map, json};

pub const UNIX_EPOCH_OFFSET_MS: u64 = 1_700_000_000_000;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct MockInstant(pub u64);

impl Add<Duration> for MockInstant {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self::Output {
        Self(self.0 + duration_millis(rhs))
    }
}

impl SessionInstant for MockInstant {
    fn saturating_duration_since(&self, earlier: Self) -> Duration {
        Duration::from_millis(self.0.saturating_sub(earlier.0))
    }

    fn unix_millis(&self) -> u64 {
        UNIX_EPOCH_OFFSET_MS + self.0
    }
}

pub fn at(ms: u64) -> MockInstant {
    MockInstant(ms)
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn speaker_test() -> TestDefinition {
    TestDefinition {
        name: "Test Speaker Sweep".to_string(),
        command: "qa_speaker_test".to_string(),
        result_kind: None,
        payload: Map::new(),
        timeout_ms: 5_000,
        evaluation_threshold: Some(1_000.0),
        description: "Sweep the speaker and listen on both microphones".to_string(),
    }
}

pub fn single_test_sequencer() -> TestSequencer<MockInstant> {
    init_logging();
    TestSequencer::new(TestCatalog::builtin(), OrchestratorConfig::default())
}

pub fn two_test_sequencer() -> TestSequencer<MockInstant> {
    init_logging();
    let catalog =
        TestCatalog::new(vec![mic_balance_test(), speaker_test()]).expect("valid catalog");
    TestSequencer::new(catalog, OrchestratorConfig::default())
}

pub fn mic_reply(left: f64, right: f64) -> Vec<u8> {
    json!({
        "kind": "mic_lr_test",
        "payload": {
            "baseline": {"rms_L": 12.0, "rms_R": 14.0},
            "tone": {"rms_L": left, "rms_R": right}
        }
    })
    .to_string()
    .into_bytes()
}

pub fn speaker_reply(left: f64, right: f64) -> Vec<u8> {
    json!({
        "kind": "qa_speaker_test",
        "payload": {"tone": {"rms_L": left, "rms_R": right}}
    })
    .to_string()
    .into_bytes()
}

pub fn instruction(text: &str, wait_for_user: bool) -> Vec<u8> {
    json!({
        "type": "qa_instruction",
        "instruction": text,
        "wait_for_user": wait_for_user
    })
    .to_string()
    .into_bytes()
}

pub fn expect_send(actions: &[SessionAction]) -> CommandEnvelope {
    match actions {
        [SessionAction::Send(envelope)] => envelope.clone(),
        other => panic!("expected a single send action, got {other:?}"),
    }
}

pub fn expect_persist(actions: &[SessionAction]) -> qc_core::results::RunReport {
    match actions {
        [SessionAction::Persist(report)] => report.clone(),
        other => panic!("expected a single persist action, got {other:?}"),
    }
}

/// Starts a session, connects, and confirms the first send at `now`.
pub fn begin(sequencer: &mut TestSequencer<MockInstant>, now: MockInstant) -> CommandEnvelope {
    assert_eq!(
        sequencer.start(now).expect("start"),
        vec![SessionAction::Connect]
    );
    let envelope = expect_send(&sequencer.connection_established(now));
    sequencer.send_completed(&envelope.id, now);
    envelope
}
