use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Per-test classification returned by the harness
///
/// Index-aligned with the test spec. This enum (plus the optional debug
/// payload) is the only state that crosses the harness boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    Passed,
    Failed,
    Timeout,
    RuntimeError,
    CompileError,
    NonZeroExit { code: i32 },
}

impl Verdict {
    pub fn is_pass(&self) -> bool {
        matches!(self, Verdict::Passed)
    }

    /// Integer encoding used by reward pipelines built on the APPS/TACO
    /// convention: 1 passed, 0 failed, -1 timeout, -2 runtime error,
    /// -3 non-zero exit, -4 compile error.
    pub fn legacy_code(&self) -> i32 {
        match self {
            Verdict::Passed => 1,
            Verdict::Failed => 0,
            Verdict::Timeout => -1,
            Verdict::RuntimeError => -2,
            Verdict::NonZeroExit { .. } => -3,
            Verdict::CompileError => -4,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Passed => write!(f, "passed"),
            Verdict::Failed => write!(f, "failed"),
            Verdict::Timeout => write!(f, "timeout"),
            Verdict::RuntimeError => write!(f, "runtime_error"),
            Verdict::CompileError => write!(f, "compile_error"),
            Verdict::NonZeroExit { code } => write!(f, "returncode:{}", code),
        }
    }
}

/// Diagnostic record emitted per executed test case in debug mode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugRecord {
    pub index: usize,
    pub input: String,
    pub expected: String,
    pub actual: Option<String>,
    pub stderr: String,
}

/// Output of one harness run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HarnessReport {
    pub verdicts: Vec<Verdict>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug: Option<Vec<DebugRecord>>,
}

impl HarnessReport {
    pub fn passed(&self) -> usize {
        self.verdicts.iter().filter(|v| v.is_pass()).count()
    }

    pub fn all_passed(&self) -> bool {
        !self.verdicts.is_empty() && self.verdicts.iter().all(Verdict::is_pass)
    }
}

/// Test spec as received from callers
///
/// Either the serialized literal form (`"{'inputs': [...], ...}"`) or an
/// already structured JSON mapping. Validation happens in the normalizer so
/// that a malformed spec yields an empty report instead of a transport error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawTestSpec {
    Serialized(String),
    Structured(serde_json::Value),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRequest {
    pub id: Uuid,
    pub candidate_source: String,
    pub test_spec: RawTestSpec,
    #[serde(default)]
    pub harness_template: String,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub early_stop: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    pub job_id: Uuid,
    pub overall_status: JobStatus,
    pub verdicts: Vec<Verdict>,
    pub passed: usize,
    pub total: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug: Option<Vec<DebugRecord>>,
    pub completed_at: DateTime<Utc>,
}

impl JobResult {
    pub fn from_report(job_id: Uuid, report: HarnessReport) -> Self {
        let passed = report.passed();
        let total = report.verdicts.len();
        let overall_status = if report.all_passed() {
            JobStatus::Completed
        } else {
            JobStatus::Failed
        };

        Self {
            job_id,
            overall_status,
            verdicts: report.verdicts,
            passed,
            total,
            debug: report.debug,
            completed_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict_wire_format() {
        let json = serde_json::to_string(&Verdict::NonZeroExit { code: 1 }).unwrap();
        assert_eq!(json, r#"{"verdict":"non_zero_exit","code":1}"#);

        let json = serde_json::to_string(&Verdict::RuntimeError).unwrap();
        assert_eq!(json, r#"{"verdict":"runtime_error"}"#);

        let back: Verdict = serde_json::from_str(r#"{"verdict":"compile_error"}"#).unwrap();
        assert_eq!(back, Verdict::CompileError);
    }

    #[test]
    fn test_legacy_codes() {
        assert_eq!(Verdict::Passed.legacy_code(), 1);
        assert_eq!(Verdict::Failed.legacy_code(), 0);
        assert_eq!(Verdict::Timeout.legacy_code(), -1);
        assert_eq!(Verdict::CompileError.legacy_code(), -4);
        assert_eq!(Verdict::NonZeroExit { code: 2 }.to_string(), "returncode:2");
    }

    #[test]
    fn test_raw_spec_accepts_both_forms() {
        let serialized: RawTestSpec =
            serde_json::from_str(r#""{'inputs': [], 'outputs': []}""#).unwrap();
        assert!(matches!(serialized, RawTestSpec::Serialized(_)));

        let structured: RawTestSpec =
            serde_json::from_str(r#"{"inputs": [[1]], "outputs": [1], "fn_name": "f"}"#).unwrap();
        assert!(matches!(structured, RawTestSpec::Structured(_)));
    }

    #[test]
    fn test_job_result_summary() {
        let report = HarnessReport {
            verdicts: vec![Verdict::Passed, Verdict::Failed, Verdict::Passed],
            debug: None,
        };
        let result = JobResult::from_report(Uuid::new_v4(), report);
        assert_eq!(result.passed, 2);
        assert_eq!(result.total, 3);
        assert_eq!(result.overall_status, JobStatus::Failed);
    }

    #[test]
    fn test_empty_report_is_not_a_pass() {
        assert!(!HarnessReport::default().all_passed());
    }
}
