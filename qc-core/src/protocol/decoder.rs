//! Event decoder for notifications received on the event characteristic.
//!
//! Decoding never fails: anything that is not a recognised JSON message
//! degrades to [`InboundEvent::Unrecognized`] or [`InboundEvent::Text`] so the
//! sequencer can log it and move on.

use serde::Deserialize;
use serde_json::Value;

/// Discriminator value for operator instructions.
pub const INSTRUCTION_TYPE: &str = "qa_instruction";
/// Keyword that marks a passing plain-text result.
pub const PASS_KEYWORD: &str = "PASS";
/// Keyword that marks a failing plain-text result.
pub const FAIL_KEYWORD: &str = "FAIL";
/// Lower-case phrases that indicate the peripheral is waiting on the operator.
pub const USER_ACTION_PHRASES: &[&str] = &[
    "user action",
    "wait for user",
    "waiting for user",
    "press the button",
    "disconnect the cable",
];

/// One decoded notification.
#[derive(Clone, Debug, PartialEq)]
pub enum InboundEvent {
    /// Test-result-shaped message carrying a `kind` discriminator.
    TestResult(TestResultMessage),
    /// `qa_instruction` prompt for the operator.
    Instruction(InstructionMessage),
    /// `qa_*_summary` message kept for display only.
    Summary(SummaryMessage),
    /// Valid JSON without a discriminator we understand.
    Unrecognized(Value),
    /// Non-JSON payload.
    Text(TextLine),
}

/// Structured test telemetry.
#[derive(Clone, Debug, PartialEq)]
pub struct TestResultMessage {
    pub kind: String,
    /// Contents of the `payload` field, or `null` when absent.
    pub payload: Value,
    /// Entire message as received, kept for the audit trail.
    pub raw: Value,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct InstructionMessage {
    #[serde(default)]
    pub instruction: String,
    #[serde(default)]
    pub wait_for_user: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SummaryMessage {
    pub summary_type: String,
    pub body: Value,
}

/// Verdict recovered from a plain-text line.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TextVerdict {
    Pass,
    Fail,
}

/// Plain-text notification and the keywords found in it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextLine {
    pub text: String,
    pub verdict: Option<TextVerdict>,
    pub user_action: bool,
}

impl TextLine {
    /// Scans `text` for the fixed pass/fail keywords and user-action phrases.
    ///
    /// Matching is literal substring search, so it can misfire on unrelated
    /// words containing the keywords; callers treat it as a fallback only.
    #[must_use]
    pub fn scan(text: String) -> Self {
        let verdict = if text.contains(PASS_KEYWORD) {
            Some(TextVerdict::Pass)
        } else if text.contains(FAIL_KEYWORD) {
            Some(TextVerdict::Fail)
        } else {
            None
        };

        let lowered = text.to_lowercase();
        let user_action = USER_ACTION_PHRASES
            .iter()
            .any(|phrase| lowered.contains(phrase));

        Self {
            text,
            verdict,
            user_action,
        }
    }

    /// Returns `true` when neither a verdict nor a prompt was recognised.
    #[must_use]
    pub const fn is_unmatched(&self) -> bool {
        self.verdict.is_none() && !self.user_action
    }
}

/// Decodes a raw notification buffer.
#[must_use]
pub fn decode(bytes: &[u8]) -> InboundEvent {
    let text = String::from_utf8_lossy(bytes);
    let trimmed = text.trim_matches(|c: char| c.is_whitespace() || c == '\0');

    match serde_json::from_str::<Value>(trimmed) {
        Ok(value) => classify(value),
        Err(_) => InboundEvent::Text(TextLine::scan(trimmed.to_string())),
    }
}

fn classify(value: Value) -> InboundEvent {
    if let Some(kind) = value.get("kind").and_then(Value::as_str) {
        return InboundEvent::TestResult(TestResultMessage {
            kind: kind.to_string(),
            payload: value.get("payload").cloned().unwrap_or(Value::Null),
            raw: value,
        });
    }

    match value.get("type").and_then(Value::as_str) {
        Some(INSTRUCTION_TYPE) => match InstructionMessage::deserialize(&value) {
            Ok(instruction) => InboundEvent::Instruction(instruction),
            Err(_) => InboundEvent::Unrecognized(value),
        },
        Some(kind) if is_summary_type(kind) => InboundEvent::Summary(SummaryMessage {
            summary_type: kind.to_string(),
            body: value,
        }),
        _ => InboundEvent::Unrecognized(value),
    }
}

fn is_summary_type(kind: &str) -> bool {
    kind.strip_prefix("qa_")
        .and_then(|rest| rest.strip_suffix("_summary"))
        .is_some_and(|middle| !middle.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_mic_result() {
        let bytes = br#"{"kind":"mic_lr_test","payload":{"baseline":{"rms_L":12.5,"rms_R":11.0},"tone":{"rms_L":5000.0,"rms_R":5100.0},"detect":true}}"#;
        let InboundEvent::TestResult(message) = decode(bytes) else {
            panic!("expected test result");
        };
        assert_eq!(message.kind, "mic_lr_test");
        assert_eq!(message.payload["tone"]["rms_R"], 5100.0);
        assert_eq!(message.raw["kind"], "mic_lr_test");
    }

    #[test]
    fn result_without_payload_keeps_null() {
        let InboundEvent::TestResult(message) = decode(br#"{"kind":"mic_lr_test"}"#) else {
            panic!("expected test result");
        };
        assert!(message.payload.is_null());
    }

    #[test]
    fn decodes_instruction_with_default_flag() {
        let event = decode(br#"{"type":"qa_instruction","instruction":"Unplug USB"}"#);
        assert_eq!(
            event,
            InboundEvent::Instruction(InstructionMessage {
                instruction: "Unplug USB".to_string(),
                wait_for_user: false,
            })
        );

        let event = decode(
            br#"{"type":"qa_instruction","instruction":"Unplug USB","wait_for_user":true}"#,
        );
        let InboundEvent::Instruction(instruction) = event else {
            panic!("expected instruction");
        };
        assert!(instruction.wait_for_user);
    }

    #[test]
    fn malformed_instruction_is_unrecognized() {
        let event = decode(br#"{"type":"qa_instruction","wait_for_user":"yes"}"#);
        assert!(matches!(event, InboundEvent::Unrecognized(_)));
    }

    #[test]
    fn decodes_summary_types() {
        let event = decode(br#"{"type":"qa_mic_summary","passed":true}"#);
        let InboundEvent::Summary(summary) = event else {
            panic!("expected summary");
        };
        assert_eq!(summary.summary_type, "qa_mic_summary");
        assert_eq!(summary.body["passed"], true);

        assert!(matches!(
            decode(br#"{"type":"qa__summary"}"#),
            InboundEvent::Unrecognized(_)
        ));
    }

    #[test]
    fn unknown_json_is_unrecognized() {
        assert!(matches!(
            decode(br#"{"type":"heartbeat"}"#),
            InboundEvent::Unrecognized(_)
        ));
        assert!(matches!(decode(b"42"), InboundEvent::Unrecognized(_)));
    }

    #[test]
    fn plain_text_scans_keywords() {
        let InboundEvent::Text(line) = decode(b"MIC TEST PASS\r\n") else {
            panic!("expected text");
        };
        assert_eq!(line.text, "MIC TEST PASS");
        assert_eq!(line.verdict, Some(TextVerdict::Pass));
        assert!(!line.user_action);

        let InboundEvent::Text(line) = decode(b"result: FAIL") else {
            panic!("expected text");
        };
        assert_eq!(line.verdict, Some(TextVerdict::Fail));
    }

    #[test]
    fn plain_text_detects_user_action() {
        let InboundEvent::Text(line) = decode(b"Please disconnect the cable now") else {
            panic!("expected text");
        };
        assert!(line.user_action);
        assert!(line.verdict.is_none());
        assert!(!line.is_unmatched());
    }

    #[test]
    fn invalid_utf8_degrades_to_text() {
        let InboundEvent::Text(line) = decode(&[0xff, 0xfe, b'o', b'k']) else {
            panic!("expected text");
        };
        assert!(line.text.ends_with("ok"));
        assert!(line.is_unmatched());
    }
}
