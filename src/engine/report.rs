use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::engine::result::{FileResult, StepResult, TestResult};

/// Serializable run result for report output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileReport {
    pub suite: String,
    pub run: RunMetadata,
    pub tests: Vec<TestReport>,
    pub summary: SummaryReport,
}

/// Metadata about the run execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMetadata {
    pub duration_ms: u64,
}

/// A single test's result in the report (one entry per data iteration).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestReport {
    pub id: String,
    pub name: String,
    pub status: String,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset: Option<DataSetReport>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<StepReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorReport>,
}

/// Which data row a fan-out iteration ran with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSetReport {
    pub name: String,
    pub index: usize,
}

/// A single step's execution result in the report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepReport {
    pub order: usize,
    pub id: String,
    #[serde(rename = "type")]
    pub step_type: String,
    pub status: String,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorReport>,
}

/// Error detail in the report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorReport {
    pub kind: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Summary statistics in the report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryReport {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub errors: usize,
    pub success: bool,
}

fn error_report(error: &crate::engine::result::EngineError) -> ErrorReport {
    ErrorReport {
        kind: error.kind.to_string(),
        message: error.message.clone(),
        detail: error.detail.clone(),
    }
}

fn step_report(order: usize, step: &StepResult) -> StepReport {
    StepReport {
        order,
        id: step.id.clone(),
        step_type: step.step_type.clone(),
        status: step.status.to_string(),
        duration_ms: step.duration.as_millis() as u64,
        output: step.output.clone(),
        error: step.error.as_ref().map(error_report),
    }
}

fn test_report(test: &TestResult) -> TestReport {
    TestReport {
        id: test.test_id.clone(),
        name: test.test_name.clone(),
        status: test.status.to_string(),
        duration_ms: test.duration.as_millis() as u64,
        dataset: test.dataset.as_ref().map(|d| DataSetReport {
            name: d.name.clone(),
            index: d.index,
        }),
        steps: test
            .steps
            .iter()
            .enumerate()
            .map(|(i, s)| step_report(i + 1, s))
            .collect(),
        error: test.error.as_ref().map(error_report),
    }
}

/// Convert a [`FileResult`] into a serializable [`FileReport`].
/// Screenshot bytes stay out of the report; they are an artifact concern.
pub fn to_report(result: &FileResult) -> FileReport {
    FileReport {
        suite: result.suite_name.clone(),
        run: RunMetadata {
            duration_ms: result.total_duration.as_millis() as u64,
        },
        tests: result.results.iter().map(test_report).collect(),
        summary: SummaryReport {
            total: result.summary.total,
            passed: result.summary.passed,
            failed: result.summary.failed,
            skipped: result.summary.skipped,
            errors: result.summary.errors,
            success: result.summary.success(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use serde_json::json;

    use crate::engine::result::{
        DataSetRef, EngineError, EngineErrorKind, RunSummary, StepStatus,
    };

    fn make_file_result(results: Vec<TestResult>) -> FileResult {
        let summary = RunSummary::from_results(&results);
        FileResult {
            suite_name: "Checkout".into(),
            results,
            total_duration: Duration::from_millis(500),
            summary,
        }
    }

    fn passing_test(id: &str, steps: Vec<StepResult>) -> TestResult {
        TestResult {
            test_id: id.to_owned(),
            test_name: id.to_owned(),
            status: StepStatus::Passed,
            duration: Duration::from_millis(100),
            steps,
            error: None,
            dataset: None,
        }
    }

    #[test]
    fn report_from_all_passed_run() {
        let result = make_file_result(vec![passing_test(
            "t1",
            vec![
                StepResult::passed("s1", "navigate", Duration::from_millis(40), None),
                StepResult::passed("s2", "get_title", Duration::from_millis(10), Some(json!("T"))),
            ],
        )]);
        let report = to_report(&result);
        assert_eq!(report.suite, "Checkout");
        assert_eq!(report.tests.len(), 1);
        assert!(report.tests[0].steps.iter().all(|s| s.status == "passed"));
        assert_eq!(report.tests[0].steps[1].output, Some(json!("T")));
        assert!(report.summary.success);
    }

    #[test]
    fn report_includes_error_detail() {
        let mut test = passing_test(
            "t1",
            vec![StepResult::from_error(
                "s1",
                "assert_equals",
                Duration::from_millis(5),
                EngineError {
                    kind: EngineErrorKind::AssertionFailed,
                    message: "expected 200, got 404".into(),
                    detail: Some("GET /orders".into()),
                },
            )],
        );
        test.status = StepStatus::Failed;
        test.error = Some(EngineError::assertion("expected 200, got 404"));

        let report = to_report(&make_file_result(vec![test]));
        let step = &report.tests[0].steps[0];
        assert_eq!(step.status, "failed");
        let err = step.error.as_ref().unwrap();
        assert_eq!(err.kind, "assertion failed");
        assert_eq!(err.detail.as_deref(), Some("GET /orders"));
        assert!(!report.summary.success);
    }

    #[test]
    fn report_step_ordering_and_timing() {
        let result = make_file_result(vec![passing_test(
            "t1",
            vec![
                StepResult::passed("a", "x", Duration::from_millis(10), None),
                StepResult::passed("b", "x", Duration::from_millis(20), None),
                StepResult::passed("c", "x", Duration::from_millis(30), None),
            ],
        )]);
        let report = to_report(&result);
        assert_eq!(report.run.duration_ms, 500);
        let orders: Vec<usize> = report.tests[0].steps.iter().map(|s| s.order).collect();
        assert_eq!(orders, [1, 2, 3]);
        assert_eq!(report.tests[0].steps[2].duration_ms, 30);
    }

    #[test]
    fn report_carries_dataset_reference() {
        let mut test = passing_test("login", vec![]);
        test.dataset = Some(DataSetRef {
            name: "admin".into(),
            index: 0,
        });
        let report = to_report(&make_file_result(vec![test]));
        let dataset = report.tests[0].dataset.as_ref().unwrap();
        assert_eq!(dataset.name, "admin");
        assert_eq!(dataset.index, 0);
    }

    #[test]
    fn report_serializes_without_empty_fields() {
        let report = to_report(&make_file_result(vec![passing_test(
            "t1",
            vec![StepResult::passed("s1", "click", Duration::ZERO, None)],
        )]));
        let text = serde_json::to_string(&report).unwrap();
        assert!(!text.contains("\"error\""));
        assert!(!text.contains("\"output\""));
        assert!(!text.contains("\"dataset\""));
    }
}
