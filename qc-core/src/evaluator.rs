//! Pass/fail evaluation of dual-channel RMS telemetry.
//!
//! Evaluation is a pure function of the reading and the threshold. A channel
//! passes only when its amplitude is strictly greater than the threshold; a
//! reading exactly at the threshold fails.

use core::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Microphone channel identifiers.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Channel {
    Left,
    Right,
}

impl Channel {
    /// Short label used in detail strings.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Channel::Left => "L",
            Channel::Right => "R",
        }
    }

    const fn field(self) -> &'static str {
        match self {
            Channel::Left => "rms_L",
            Channel::Right => "rms_R",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Reasons a telemetry payload could not be evaluated.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TelemetryError {
    /// The payload has no `tone` section.
    MissingTone,
    /// The named channel is absent or not a number.
    MissingChannel(Channel),
}

impl fmt::Display for TelemetryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryError::MissingTone => f.write_str("payload has no tone measurement"),
            TelemetryError::MissingChannel(channel) => {
                write!(f, "tone measurement lacks a numeric rms_{channel} value")
            }
        }
    }
}

impl std::error::Error for TelemetryError {}

/// RMS amplitude measured on both channels while the tone played.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct DualChannelReading {
    pub left: f64,
    pub right: f64,
}

impl DualChannelReading {
    #[must_use]
    pub const fn new(left: f64, right: f64) -> Self {
        Self { left, right }
    }

    /// Extracts `tone.rms_L` / `tone.rms_R` from a test-result payload.
    ///
    /// # Errors
    ///
    /// Returns a [`TelemetryError`] when the tone section or either channel
    /// value is missing or non-numeric.
    pub fn from_payload(payload: &Value) -> Result<Self, TelemetryError> {
        let tone = payload.get("tone").ok_or(TelemetryError::MissingTone)?;
        let read = |channel: Channel| {
            tone.get(channel.field())
                .and_then(Value::as_f64)
                .ok_or(TelemetryError::MissingChannel(channel))
        };

        Ok(Self::new(read(Channel::Left)?, read(Channel::Right)?))
    }

    const fn value(&self, channel: Channel) -> f64 {
        match channel {
            Channel::Left => self.left,
            Channel::Right => self.right,
        }
    }
}

/// Verdict for one channel.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ChannelVerdict {
    pub channel: Channel,
    pub value: f64,
    pub passed: bool,
}

/// Channel-level breakdown stored alongside a result for audits.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EvaluationData {
    #[serde(rename = "rms_L")]
    pub rms_left: f64,
    #[serde(rename = "rms_R")]
    pub rms_right: f64,
    pub left_passed: bool,
    pub right_passed: bool,
    pub threshold: f64,
}

/// Outcome of [`evaluate`].
#[derive(Clone, Debug, PartialEq)]
pub struct Evaluation {
    pub overall_pass: bool,
    pub channels: [ChannelVerdict; 2],
    pub threshold: f64,
    pub details: String,
}

impl Evaluation {
    /// Channels that did not clear the threshold.
    pub fn failed_channels(&self) -> impl Iterator<Item = &ChannelVerdict> {
        self.channels.iter().filter(|verdict| !verdict.passed)
    }

    /// Structured breakdown for the audit record.
    #[must_use]
    pub fn data(&self) -> EvaluationData {
        let [left, right] = self.channels;
        EvaluationData {
            rms_left: left.value,
            rms_right: right.value,
            left_passed: left.passed,
            right_passed: right.passed,
            threshold: self.threshold,
        }
    }
}

/// Evaluates a dual-channel reading against `threshold`.
#[must_use]
pub fn evaluate(reading: DualChannelReading, threshold: f64) -> Evaluation {
    let channels = [Channel::Left, Channel::Right].map(|channel| {
        let value = reading.value(channel);
        ChannelVerdict {
            channel,
            value,
            passed: value > threshold,
        }
    });
    let overall_pass = channels.iter().all(|verdict| verdict.passed);

    let mut details = channels
        .iter()
        .map(|verdict| {
            format!(
                "{}: {:.1} RMS ({})",
                verdict.channel,
                verdict.value,
                if verdict.passed { "PASS" } else { "FAIL" }
            )
        })
        .collect::<Vec<_>>()
        .join(", ");
    details.push_str(&format!(" [Threshold: >{threshold}]"));

    let mut evaluation = Evaluation {
        overall_pass,
        channels,
        threshold,
        details,
    };

    if !overall_pass {
        let failed: Vec<String> = evaluation
            .failed_channels()
            .map(|verdict| format!("{}={:.1}", verdict.channel, verdict.value))
            .collect();
        evaluation
            .details
            .push_str(&format!("; failed: {}", failed.join(", ")));
    }

    evaluation
}
