//! Result aggregation and the finalized run report.
//!
//! Results are keyed by test name: recording a second result for the same
//! test replaces the first in place, so the set never holds more than one
//! entry per definition.

use core::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::evaluator::EvaluationData;

/// Marker placed in the details of results synthesized from a send failure.
pub const SEND_FAILED_MARKER: &str = "SEND_FAILED";
/// Marker placed in the details of results synthesized from a timeout.
pub const TIMEOUT_MARKER: &str = "TIMEOUT";

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Pass,
    Fail,
}

impl TestStatus {
    #[must_use]
    pub const fn from_passed(passed: bool) -> Self {
        if passed { TestStatus::Pass } else { TestStatus::Fail }
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            TestStatus::Pass => "PASS",
            TestStatus::Fail => "FAIL",
        })
    }
}

/// Verdict recorded for one test definition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub name: String,
    pub status: TestStatus,
    pub details: String,
    pub elapsed_ms: u64,
    pub timestamp_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation_data: Option<EvaluationData>,
}

impl TestResult {
    #[must_use]
    pub fn passed(&self) -> bool {
        self.status == TestStatus::Pass
    }

    /// Returns `true` when the result was synthesized by the timeout monitor.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        self.status == TestStatus::Fail && self.details.starts_with(TIMEOUT_MARKER)
    }

    /// Returns `true` when the command never reached the peripheral.
    #[must_use]
    pub fn is_send_failure(&self) -> bool {
        self.status == TestStatus::Fail && self.details.starts_with(SEND_FAILED_MARKER)
    }
}

/// Whether [`ResultAggregator::record`] added or replaced an entry.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RecordOutcome {
    Inserted,
    Replaced,
}

/// Status written back for the device once a run completes.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Ready,
    Defective,
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            DeviceStatus::Ready => "ready",
            DeviceStatus::Defective => "defective",
        })
    }
}

/// Pass/fail counts for the current result set.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total_tests: usize,
    pub passed_tests: usize,
    pub failed_tests: usize,
    pub device_status: DeviceStatus,
}

/// Finalized result set handed to the persistence collaborator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub session_id: String,
    pub started_at_ms: u64,
    pub finished_at_ms: u64,
    #[serde(flatten)]
    pub summary: RunSummary,
    pub results: Vec<TestResult>,
}

/// Accumulates results for one session.
#[derive(Clone, Debug, Default)]
pub struct ResultAggregator {
    total: usize,
    results: Vec<TestResult>,
    progress: f64,
}

impl ResultAggregator {
    #[must_use]
    pub fn new(total: usize) -> Self {
        Self {
            total,
            results: Vec::with_capacity(total),
            progress: 0.0,
        }
    }

    /// Upserts `result` and recomputes progress from the owning test index.
    pub fn record(&mut self, test_index: usize, result: TestResult) -> RecordOutcome {
        self.progress = progress_percent(test_index + 1, self.total);

        if let Some(existing) = self
            .results
            .iter_mut()
            .find(|existing| existing.name == result.name)
        {
            *existing = result;
            RecordOutcome::Replaced
        } else {
            self.results.push(result);
            RecordOutcome::Inserted
        }
    }

    #[must_use]
    pub fn results(&self) -> &[TestResult] {
        &self.results
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&TestResult> {
        self.results.iter().find(|result| result.name == name)
    }

    /// Completion percentage in `0.0..=100.0`.
    #[must_use]
    pub const fn progress(&self) -> f64 {
        self.progress
    }

    #[must_use]
    pub const fn total(&self) -> usize {
        self.total
    }

    #[must_use]
    pub fn summary(&self) -> RunSummary {
        let passed_tests = self.results.iter().filter(|result| result.passed()).count();
        let failed_tests = self.results.len() - passed_tests;
        let device_status = if failed_tests == 0 && self.results.len() == self.total {
            DeviceStatus::Ready
        } else {
            DeviceStatus::Defective
        };

        RunSummary {
            total_tests: self.total,
            passed_tests,
            failed_tests,
            device_status,
        }
    }

    /// Drops all results and prepares for a catalog of `total` tests.
    pub fn clear(&mut self, total: usize) {
        self.total = total;
        self.results.clear();
        self.progress = 0.0;
    }
}

fn progress_percent(completed: usize, total: usize) -> f64 {
    if total == 0 {
        return 100.0;
    }
    let completed = u32::try_from(completed.min(total)).unwrap_or(u32::MAX);
    let total = u32::try_from(total).unwrap_or(u32::MAX);
    f64::from(completed) * 100.0 / f64::from(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(name: &str, status: TestStatus, details: &str) -> TestResult {
        TestResult {
            name: name.to_string(),
            status,
            details: details.to_string(),
            elapsed_ms: 0,
            timestamp_ms: 0,
            raw_response: None,
            evaluation_data: None,
        }
    }

    #[test]
    fn record_upserts_by_name() {
        let mut aggregator = ResultAggregator::new(2);
        assert_eq!(
            aggregator.record(0, result("mic", TestStatus::Fail, "TIMEOUT after 10000 ms")),
            RecordOutcome::Inserted
        );
        assert_eq!(
            aggregator.record(0, result("mic", TestStatus::Pass, "ok")),
            RecordOutcome::Replaced
        );

        assert_eq!(aggregator.results().len(), 1);
        assert!(aggregator.get("mic").is_some_and(TestResult::passed));
    }

    #[test]
    fn progress_tracks_index_plus_one() {
        let mut aggregator = ResultAggregator::new(4);
        aggregator.record(0, result("a", TestStatus::Pass, ""));
        assert!((aggregator.progress() - 25.0).abs() < f64::EPSILON);
        aggregator.record(3, result("d", TestStatus::Pass, ""));
        assert!((aggregator.progress() - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn summary_reports_defective_on_any_failure() {
        let mut aggregator = ResultAggregator::new(2);
        aggregator.record(0, result("a", TestStatus::Pass, ""));
        aggregator.record(1, result("b", TestStatus::Fail, "SEND_FAILED: link lost"));

        let summary = aggregator.summary();
        assert_eq!(summary.passed_tests, 1);
        assert_eq!(summary.failed_tests, 1);
        assert_eq!(summary.device_status, DeviceStatus::Defective);
        assert!(aggregator.get("b").is_some_and(TestResult::is_send_failure));
    }

    #[test]
    fn summary_ready_only_when_every_test_passed() {
        let mut aggregator = ResultAggregator::new(2);
        aggregator.record(0, result("a", TestStatus::Pass, ""));
        assert_eq!(aggregator.summary().device_status, DeviceStatus::Defective);
        aggregator.record(1, result("b", TestStatus::Pass, ""));
        assert_eq!(aggregator.summary().device_status, DeviceStatus::Ready);
    }

    #[test]
    fn report_serializes_flat_summary() {
        let mut aggregator = ResultAggregator::new(1);
        aggregator.record(0, result("a", TestStatus::Pass, "fine"));
        let report = RunReport {
            session_id: "qc_1700000000".to_string(),
            started_at_ms: 1,
            finished_at_ms: 2,
            summary: aggregator.summary(),
            results: aggregator.results().to_vec(),
        };

        let value = serde_json::to_value(&report).expect("serialize");
        assert_eq!(value["total_tests"], 1);
        assert_eq!(value["device_status"], "ready");
        assert_eq!(value["results"][0]["status"], "pass");
        assert!(value["results"][0].get("raw_response").is_none());
    }
}
