use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCase {
    #[serde(alias = "test_id")]
    pub id: u32,
    #[serde(default)]
    pub input: String,
    #[serde(alias = "expectedOutput", alias = "expected")]
    pub expected_output: String,
    #[serde(default, alias = "is_sample")]
    pub sample: bool,
}

/// Inbound judging call. Test cases are evaluated in the order given.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeRequest {
    pub language: String,
    #[serde(alias = "code")]
    pub source: String,
    #[serde(alias = "testcases", alias = "testCases")]
    pub test_cases: Vec<TestCase>,
    #[serde(default, alias = "timeoutMs")]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionLimits {
    pub run_timeout_ms: u64,
    pub compile_timeout_ms: u64,
    pub max_output_chars: usize,
    pub max_diagnostic_chars: usize,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            run_timeout_ms: 5_000,
            compile_timeout_ms: 30_000,
            max_output_chars: 10_000,
            max_diagnostic_chars: 1_000,
        }
    }
}

impl ExecutionLimits {
    pub fn normalized(mut self) -> Self {
        self.run_timeout_ms = self.run_timeout_ms.clamp(50, 60_000);
        self.compile_timeout_ms = self.compile_timeout_ms.clamp(1_000, 120_000);
        self.max_output_chars = self.max_output_chars.clamp(1_000, 4_000_000);
        self.max_diagnostic_chars = self.max_diagnostic_chars.clamp(100, 100_000);
        self
    }

    /// Per-call copy with the run deadline replaced.
    pub fn with_run_timeout(self, timeout_ms: u64) -> Self {
        Self {
            run_timeout_ms: timeout_ms,
            ..self
        }
        .normalized()
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_millis(self.run_timeout_ms)
    }

    pub fn compile_timeout(&self) -> Duration {
        Duration::from_millis(self.compile_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileResult {
    pub success: bool,
    pub diagnostic: String,
}

impl CompileResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            diagnostic: String::new(),
        }
    }

    pub fn failed(diagnostic: impl Into<String>) -> Self {
        Self {
            success: false,
            diagnostic: diagnostic.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
    pub exit_code: Option<i32>,
    pub duration_ms: u128,
}

impl ExecutionResult {
    pub fn spawn_failure(message: String) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: message,
            timed_out: false,
            exit_code: None,
            duration_ms: 0,
        }
    }

    pub fn describe_exit(&self) -> String {
        match self.exit_code {
            Some(code) => format!("process exited with status {code}"),
            None => "process terminated by signal".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verdict {
    #[serde(rename = "Accepted")]
    Accepted,
    #[serde(rename = "Wrong Answer")]
    WrongAnswer,
    #[serde(rename = "Runtime Error")]
    RuntimeError,
    #[serde(rename = "Time Limit Exceeded")]
    TimeLimitExceeded,
    #[serde(rename = "Compilation Error")]
    CompilationError,
}

impl Verdict {
    pub fn all() -> &'static [Verdict] {
        &[
            Verdict::Accepted,
            Verdict::WrongAnswer,
            Verdict::RuntimeError,
            Verdict::TimeLimitExceeded,
            Verdict::CompilationError,
        ]
    }

    pub fn label(&self) -> &'static str {
        match self {
            Verdict::Accepted => "accepted",
            Verdict::WrongAnswer => "wrong_answer",
            Verdict::RuntimeError => "runtime_error",
            Verdict::TimeLimitExceeded => "time_limit_exceeded",
            Verdict::CompilationError => "compilation_error",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Verdict::Accepted => "Accepted",
            Verdict::WrongAnswer => "Wrong Answer",
            Verdict::RuntimeError => "Runtime Error",
            Verdict::TimeLimitExceeded => "Time Limit Exceeded",
            Verdict::CompilationError => "Compilation Error",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedTest {
    pub test_id: u32,
    pub input: String,
    pub expected: String,
    pub actual: String,
    pub error: Option<String>,
}

/// Verdict document for one judging call.
///
/// `passed <= total` always holds, `Accepted` implies `passed == total`, every
/// verdict other than `Accepted` and `CompilationError` carries `failed_test`,
/// and `CompilationError` carries a non-empty `error` with `passed == 0`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JudgeResult {
    pub verdict: Verdict,
    pub passed: usize,
    pub total: usize,
    pub failed_test: Option<FailedTest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JudgeResult {
    pub fn accepted(total: usize) -> Self {
        Self {
            verdict: Verdict::Accepted,
            passed: total,
            total,
            failed_test: None,
            error: None,
        }
    }

    pub fn compilation_error(total: usize, diagnostic: String) -> Self {
        let diagnostic = if diagnostic.trim().is_empty() {
            "compilation failed".to_string()
        } else {
            diagnostic
        };
        Self {
            verdict: Verdict::CompilationError,
            passed: 0,
            total,
            failed_test: None,
            error: Some(diagnostic),
        }
    }

    pub fn failed(verdict: Verdict, passed: usize, total: usize, failed_test: FailedTest) -> Self {
        Self {
            verdict,
            passed,
            total,
            failed_test: Some(failed_test),
            error: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeResponse {
    pub judge_id: Uuid,
    #[serde(flatten)]
    pub result: JudgeResult,
    pub elapsed_ms: u128,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguagesResponse {
    pub languages: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_limits_to_safe_bounds() {
        let normalized = ExecutionLimits {
            run_timeout_ms: 1,
            compile_timeout_ms: 999_999,
            max_output_chars: 1,
            max_diagnostic_chars: 99_000_000,
        }
        .normalized();

        assert_eq!(normalized.run_timeout_ms, 50);
        assert_eq!(normalized.compile_timeout_ms, 120_000);
        assert_eq!(normalized.max_output_chars, 1_000);
        assert_eq!(normalized.max_diagnostic_chars, 100_000);
    }

    #[test]
    fn run_timeout_override_keeps_other_limits() {
        let limits = ExecutionLimits::default().with_run_timeout(1_500);
        assert_eq!(limits.run_timeout_ms, 1_500);
        assert_eq!(limits.compile_timeout_ms, 30_000);
        assert_eq!(limits.max_output_chars, 10_000);
    }

    #[test]
    fn verdict_serializes_as_display_text() {
        let json = serde_json::to_string(&Verdict::TimeLimitExceeded).unwrap();
        assert_eq!(json, "\"Time Limit Exceeded\"");
        assert_eq!(Verdict::WrongAnswer.to_string(), "Wrong Answer");
    }

    #[test]
    fn request_accepts_legacy_field_names() {
        let raw = r#"{
            "language": "python",
            "code": "print(1)",
            "testcases": [{"id": 1, "input": "", "expected_output": "1"}]
        }"#;
        let request: JudgeRequest = serde_json::from_str(raw).unwrap();
        assert_eq!(request.source, "print(1)");
        assert_eq!(request.test_cases.len(), 1);
        assert!(!request.test_cases[0].sample);
        assert_eq!(request.timeout_ms, None);
    }

    #[test]
    fn compilation_error_never_has_empty_diagnostic() {
        let result = JudgeResult::compilation_error(3, "  ".to_string());
        assert_eq!(result.passed, 0);
        assert_eq!(result.total, 3);
        assert_eq!(result.error.as_deref(), Some("compilation failed"));
    }

    #[test]
    fn response_flattens_result_fields() {
        let response = JudgeResponse {
            judge_id: Uuid::nil(),
            result: JudgeResult::accepted(2),
            elapsed_ms: 12,
        };
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["verdict"], "Accepted");
        assert_eq!(value["passed"], 2);
        assert!(value["failed_test"].is_null());
        assert!(value.get("error").is_none());
    }
}
