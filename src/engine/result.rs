use std::fmt;
use std::time::Duration;

use serde_json::Value;

use crate::driver::DriverError;

/// The outcome status of a step or test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Passed,
    Failed,
    Error,
    Skipped,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Passed => write!(f, "passed"),
            Self::Failed => write!(f, "failed"),
            Self::Error => write!(f, "error"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

/// Error raised by the engine while executing a step or hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineError {
    pub kind: EngineErrorKind,
    pub message: String,
    pub detail: Option<String>,
}

impl EngineError {
    pub fn new(kind: EngineErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            detail: None,
        }
    }

    pub fn assertion(message: impl Into<String>) -> Self {
        Self::new(EngineErrorKind::AssertionFailed, message)
    }

    pub fn invalid_param(message: impl Into<String>) -> Self {
        Self::new(EngineErrorKind::InvalidParam, message)
    }

    /// Whether this failure marks the owning step `error` rather than
    /// `failed`. Assertion mismatches and explicit skips are expected test
    /// outcomes; everything else is an execution error.
    pub fn is_hard_error(&self) -> bool {
        !matches!(
            self.kind,
            EngineErrorKind::AssertionFailed | EngineErrorKind::Skip
        )
    }
}

impl From<DriverError> for EngineError {
    fn from(e: DriverError) -> Self {
        let kind = if e.timed_out {
            EngineErrorKind::Timeout
        } else {
            EngineErrorKind::Driver
        };
        Self {
            kind,
            message: e.message,
            detail: e.detail,
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Classification of engine errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineErrorKind {
    /// Explicit skip request; short-circuits without failing the test.
    Skip,
    /// Expected-vs-actual mismatch inside an assertion-style step.
    AssertionFailed,
    /// No registered handler for a step's type.
    UnknownType,
    /// Procedure absent from both the suite-local and project tables.
    ProcedureNotFound,
    /// I/O failure from the browser/HTTP backend.
    Driver,
    /// A lifecycle hook failed.
    HookFailure,
    /// The run's cancellation signal fired.
    Cancelled,
    /// A step exceeded the configured timeout.
    Timeout,
    /// A step received a missing or ill-typed parameter.
    InvalidParam,
}

impl fmt::Display for EngineErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Skip => write!(f, "skipped"),
            Self::AssertionFailed => write!(f, "assertion failed"),
            Self::UnknownType => write!(f, "unknown step type"),
            Self::ProcedureNotFound => write!(f, "procedure not found"),
            Self::Driver => write!(f, "driver error"),
            Self::HookFailure => write!(f, "hook failure"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Timeout => write!(f, "timeout"),
            Self::InvalidParam => write!(f, "invalid parameter"),
        }
    }
}

/// Result of executing a single step.
#[derive(Debug, Clone)]
pub struct StepResult {
    pub id: String,
    pub step_type: String,
    pub status: StepStatus,
    pub duration: Duration,
    pub output: Option<Value>,
    pub error: Option<EngineError>,
    pub screenshot: Option<Vec<u8>>,
}

impl StepResult {
    pub fn passed(id: &str, step_type: &str, duration: Duration, output: Option<Value>) -> Self {
        Self {
            id: id.to_owned(),
            step_type: step_type.to_owned(),
            status: StepStatus::Passed,
            duration,
            output,
            error: None,
            screenshot: None,
        }
    }

    pub fn from_error(id: &str, step_type: &str, duration: Duration, error: EngineError) -> Self {
        let status = match error.kind {
            EngineErrorKind::Skip => StepStatus::Skipped,
            EngineErrorKind::AssertionFailed => StepStatus::Failed,
            _ => StepStatus::Error,
        };
        Self {
            id: id.to_owned(),
            step_type: step_type.to_owned(),
            status,
            duration,
            output: None,
            error: Some(error),
            screenshot: None,
        }
    }

    pub fn skipped(id: &str, step_type: &str) -> Self {
        Self {
            id: id.to_owned(),
            step_type: step_type.to_owned(),
            status: StepStatus::Skipped,
            duration: Duration::ZERO,
            output: None,
            error: None,
            screenshot: None,
        }
    }
}

/// Identifies which data row a fan-out iteration ran with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSetRef {
    pub name: String,
    pub index: usize,
}

/// Result of one test run (one fan-out iteration of one test case).
#[derive(Debug, Clone)]
pub struct TestResult {
    pub test_id: String,
    pub test_name: String,
    pub status: StepStatus,
    pub duration: Duration,
    pub steps: Vec<StepResult>,
    pub error: Option<EngineError>,
    pub dataset: Option<DataSetRef>,
}

impl TestResult {
    pub fn skipped(test_id: &str, test_name: &str) -> Self {
        Self {
            test_id: test_id.to_owned(),
            test_name: test_name.to_owned(),
            status: StepStatus::Skipped,
            duration: Duration::ZERO,
            steps: Vec::new(),
            error: None,
            dataset: None,
        }
    }
}

/// The complete result of one test file run.
#[derive(Debug, Clone)]
pub struct FileResult {
    pub suite_name: String,
    pub results: Vec<TestResult>,
    pub total_duration: Duration,
    pub summary: RunSummary,
}

/// Summary statistics over a file's test results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub errors: usize,
    pub skipped: usize,
}

impl RunSummary {
    /// Whether the run was fully successful (no failures or errors).
    pub fn success(&self) -> bool {
        self.failed == 0 && self.errors == 0
    }

    pub fn from_results(results: &[TestResult]) -> Self {
        let mut summary = Self {
            total: results.len(),
            passed: 0,
            failed: 0,
            errors: 0,
            skipped: 0,
        };
        for r in results {
            match r.status {
                StepStatus::Passed => summary.passed += 1,
                StepStatus::Failed => summary.failed += 1,
                StepStatus::Error => summary.errors += 1,
                StepStatus::Skipped => summary.skipped += 1,
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn step_status_display() {
        assert_eq!(StepStatus::Passed.to_string(), "passed");
        assert_eq!(StepStatus::Failed.to_string(), "failed");
        assert_eq!(StepStatus::Error.to_string(), "error");
        assert_eq!(StepStatus::Skipped.to_string(), "skipped");
    }

    #[test]
    fn engine_error_display() {
        let err = EngineError::assertion("expected 200, got 404");
        assert_eq!(err.to_string(), "assertion failed: expected 200, got 404");
    }

    #[test]
    fn assertion_and_skip_are_not_hard_errors() {
        assert!(!EngineError::assertion("x").is_hard_error());
        assert!(!EngineError::new(EngineErrorKind::Skip, "reason").is_hard_error());
        assert!(EngineError::new(EngineErrorKind::UnknownType, "x").is_hard_error());
        assert!(EngineError::new(EngineErrorKind::Driver, "x").is_hard_error());
    }

    #[test]
    fn from_error_maps_status_by_kind() {
        let failed = StepResult::from_error(
            "s1",
            "assert_equals",
            Duration::ZERO,
            EngineError::assertion("mismatch"),
        );
        assert_eq!(failed.status, StepStatus::Failed);

        let skipped = StepResult::from_error(
            "s2",
            "skip",
            Duration::ZERO,
            EngineError::new(EngineErrorKind::Skip, "not ready"),
        );
        assert_eq!(skipped.status, StepStatus::Skipped);

        let errored = StepResult::from_error(
            "s3",
            "mystery",
            Duration::ZERO,
            EngineError::new(EngineErrorKind::UnknownType, "no handler"),
        );
        assert_eq!(errored.status, StepStatus::Error);
    }

    #[test]
    fn passed_step_carries_output() {
        let result = StepResult::passed("s1", "get_title", Duration::from_millis(5), Some(json!("T")));
        assert_eq!(result.status, StepStatus::Passed);
        assert_eq!(result.output, Some(json!("T")));
        assert!(result.error.is_none());
    }

    #[test]
    fn skipped_test_has_zero_duration_and_no_steps() {
        let result = TestResult::skipped("t1", "disabled test");
        assert_eq!(result.status, StepStatus::Skipped);
        assert_eq!(result.duration, Duration::ZERO);
        assert!(result.steps.is_empty());
    }

    #[test]
    fn summary_counts_by_status() {
        let mut passed = TestResult::skipped("a", "a");
        passed.status = StepStatus::Passed;
        let mut failed = TestResult::skipped("b", "b");
        failed.status = StepStatus::Failed;
        let skipped = TestResult::skipped("c", "c");

        let summary = RunSummary::from_results(&[passed, failed, skipped]);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.passed, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.errors, 0);
        assert!(!summary.success());
    }

    #[test]
    fn driver_error_converts_with_detail() {
        let e: EngineError = DriverError {
            message: "boom".into(),
            detail: Some("url".into()),
            timed_out: false,
        }
        .into();
        assert_eq!(e.kind, EngineErrorKind::Driver);
        assert_eq!(e.detail.as_deref(), Some("url"));
    }

    #[test]
    fn timed_out_driver_error_converts_to_timeout_kind() {
        let e: EngineError = DriverError::timeout("request timed out after 5s").into();
        assert_eq!(e.kind, EngineErrorKind::Timeout);
        let result = StepResult::from_error("s1", "http_request", Duration::ZERO, e);
        assert_eq!(result.status, StepStatus::Error);
    }
}
