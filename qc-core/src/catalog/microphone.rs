//! Microphone left/right balance test.
//!
//! The peripheral waits `wait_ms`, plays a `freq_hz` tone for `tone_ms` at
//! `volume_percent`, and reports baseline and tone RMS amplitude for both
//! microphone channels. Each channel must exceed [`QC_RMS_THRESHOLD`].

use core::time::Duration;

use serde_json::{Map, Value};

use super::TestDefinition;

/// Display name of the balance test; results are keyed by it.
pub const MIC_BALANCE_TEST_NAME: &str = "Test Mic L/R Balance";
/// Command tag written to the control characteristic.
pub const MIC_LR_COMMAND: &str = "qa_mic_lr_test";
/// Event `kind` the firmware answers the balance test with.
pub const MIC_LR_RESULT_KIND: &str = "mic_lr_test";
/// Silence captured before the tone to establish a baseline.
pub const MIC_BASELINE_WAIT: Duration = Duration::from_millis(2_000);
/// Duration of the reference tone.
pub const MIC_TONE_DURATION: Duration = Duration::from_millis(2_000);
/// Speaker volume used for the reference tone.
pub const MIC_TONE_VOLUME_PERCENT: u8 = 95;
/// Reference tone frequency.
pub const MIC_TONE_FREQUENCY_HZ: u16 = 1_000;
/// Time allowed for the peripheral to report the measurement.
pub const MIC_TEST_TIMEOUT: Duration = Duration::from_millis(10_000);
/// Minimum RMS amplitude (exclusive) each channel must reach under tone.
pub const QC_RMS_THRESHOLD: f64 = 4_500.0;

/// Builds the microphone balance test definition.
#[must_use]
pub fn mic_balance_test() -> TestDefinition {
    let mut payload = Map::new();
    payload.insert("wait_ms".into(), Value::from(duration_ms(MIC_BASELINE_WAIT)));
    payload.insert("tone_ms".into(), Value::from(duration_ms(MIC_TONE_DURATION)));
    payload.insert("volume_percent".into(), Value::from(MIC_TONE_VOLUME_PERCENT));
    payload.insert("freq_hz".into(), Value::from(MIC_TONE_FREQUENCY_HZ));

    TestDefinition {
        name: MIC_BALANCE_TEST_NAME.to_string(),
        command: MIC_LR_COMMAND.to_string(),
        result_kind: Some(MIC_LR_RESULT_KIND.to_string()),
        payload,
        timeout_ms: duration_ms(MIC_TEST_TIMEOUT),
        evaluation_threshold: Some(QC_RMS_THRESHOLD),
        description: "Test microphone left/right balance".to_string(),
    }
}

fn duration_ms(duration: Duration) -> u64 {
    crate::clock::duration_millis(duration)
}
