//! Verdict engine: compile once, then walk the test cases in order and stop
//! at the first one that does not pass.

use std::sync::Arc;

use anyhow::Context;
use tracing::Instrument;
use uuid::Uuid;

use crate::engine::{
    config::{JudgeConfig, RequestBounds},
    error::JudgeError,
    models::{ExecutionLimits, ExecutionResult, FailedTest, JudgeRequest, JudgeResult, TestCase, Verdict},
    runner::{LanguageRunner, RunnerRegistry},
    workspace::{Workspace, WorkspaceManager},
};

const TIMED_OUT_ACTUAL: &str = "Execution timed out";
const TIMED_OUT_ERROR: &str = "Time limit exceeded";

/// Result of checking one test case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaseOutcome {
    Passed,
    Failed(Verdict, FailedTest),
}

/// Classifies one execution against its test case.
///
/// A timeout wins over every other signal, then a failed run, and only a
/// clean exit reaches the (edge-trimmed) output comparison.
pub fn evaluate_case(case: &TestCase, execution: &ExecutionResult) -> CaseOutcome {
    if execution.timed_out {
        return CaseOutcome::Failed(
            Verdict::TimeLimitExceeded,
            FailedTest {
                test_id: case.id,
                input: case.input.clone(),
                expected: case.expected_output.clone(),
                actual: TIMED_OUT_ACTUAL.to_string(),
                error: Some(TIMED_OUT_ERROR.to_string()),
            },
        );
    }

    if !execution.success {
        let error = if execution.stderr.trim().is_empty() {
            execution.describe_exit()
        } else {
            execution.stderr.clone()
        };
        return CaseOutcome::Failed(
            Verdict::RuntimeError,
            FailedTest {
                test_id: case.id,
                input: case.input.clone(),
                expected: case.expected_output.clone(),
                actual: execution.stdout.trim().to_string(),
                error: Some(error),
            },
        );
    }

    let actual = execution.stdout.trim();
    let expected = case.expected_output.trim();
    if actual == expected {
        CaseOutcome::Passed
    } else {
        CaseOutcome::Failed(
            Verdict::WrongAnswer,
            FailedTest {
                test_id: case.id,
                input: case.input.clone(),
                expected: expected.to_string(),
                actual: actual.to_string(),
                error: None,
            },
        )
    }
}

/// A validated request bound to the runner that will judge it.
pub struct Admission {
    runner: Arc<dyn LanguageRunner>,
    limits: ExecutionLimits,
    request: JudgeRequest,
}

impl Admission {
    pub fn language(&self) -> &str {
        self.runner.language()
    }

    pub fn test_cases(&self) -> usize {
        self.request.test_cases.len()
    }
}

pub struct VerdictEngine {
    registry: RunnerRegistry,
    workspaces: WorkspaceManager,
    limits: ExecutionLimits,
    bounds: RequestBounds,
}

impl VerdictEngine {
    pub fn new(
        registry: RunnerRegistry,
        workspaces: WorkspaceManager,
        limits: ExecutionLimits,
        bounds: RequestBounds,
    ) -> Self {
        Self {
            registry,
            workspaces,
            limits,
            bounds,
        }
    }

    pub fn from_config(config: &JudgeConfig) -> Self {
        Self::new(
            RunnerRegistry::standard(&config.toolchains),
            WorkspaceManager::new(config.workspace_root.clone()),
            config.limits,
            config.bounds,
        )
    }

    pub fn languages(&self) -> Vec<String> {
        self.registry.languages()
    }

    pub fn limits(&self) -> ExecutionLimits {
        self.limits
    }

    pub fn bounds(&self) -> RequestBounds {
        self.bounds
    }

    /// Boundary checks: validates the request and binds it to a runner.
    ///
    /// Touches neither the filesystem nor any process, so rejections stay
    /// cheap and never wait behind admitted calls.
    pub fn admit(&self, request: JudgeRequest) -> Result<Admission, JudgeError> {
        self.validate(&request)?;
        let runner = self
            .registry
            .resolve(&request.language)
            .ok_or_else(|| JudgeError::UnsupportedLanguage(request.language.clone()))?;
        let limits = match request.timeout_ms {
            Some(timeout_ms) => self.limits.with_run_timeout(timeout_ms),
            None => self.limits,
        };
        Ok(Admission {
            runner,
            limits,
            request,
        })
    }

    /// Judges an admitted submission in a fresh workspace.
    ///
    /// Every outcome, including compile failures, is a `JudgeResult`;
    /// `Err(Internal)` is reserved for infrastructure faults.
    pub async fn run(&self, judge_id: Uuid, admission: Admission) -> Result<JudgeResult, JudgeError> {
        let Admission {
            runner,
            limits,
            request,
        } = admission;
        let span = tracing::info_span!("judge", judge_id = %judge_id, language = runner.language());
        async move {
            let workspace = self
                .workspaces
                .acquire(judge_id)
                .await
                .context("failed to create workspace")?;
            let outcome = run_submission(runner.as_ref(), &workspace, &request, &limits).await;
            workspace.release().await;

            let result = outcome?;
            tracing::info!(
                verdict = %result.verdict,
                passed = result.passed,
                total = result.total,
                "judging finished"
            );
            Ok::<_, JudgeError>(result)
        }
        .instrument(span)
        .await
    }

    #[cfg(test)]
    pub async fn judge(&self, judge_id: Uuid, request: JudgeRequest) -> Result<JudgeResult, JudgeError> {
        let admission = self.admit(request)?;
        self.run(judge_id, admission).await
    }

    fn validate(&self, request: &JudgeRequest) -> Result<(), JudgeError> {
        if request.language.trim().is_empty() {
            return Err(JudgeError::MalformedRequest("language is empty".to_string()));
        }
        if request.source.trim().is_empty() {
            return Err(JudgeError::MalformedRequest("source is empty".to_string()));
        }
        if request.source.len() > self.bounds.max_source_bytes {
            return Err(JudgeError::MalformedRequest(format!(
                "source exceeds {} bytes",
                self.bounds.max_source_bytes
            )));
        }
        if request.test_cases.is_empty() {
            return Err(JudgeError::MalformedRequest(
                "at least one test case is required".to_string(),
            ));
        }
        if request.test_cases.len() > self.bounds.max_test_cases {
            return Err(JudgeError::MalformedRequest(format!(
                "too many test cases; max is {}",
                self.bounds.max_test_cases
            )));
        }
        if let Some(case) = request.test_cases.iter().find(|case| {
            case.input.len() > self.bounds.max_case_bytes
                || case.expected_output.len() > self.bounds.max_case_bytes
        }) {
            return Err(JudgeError::MalformedRequest(format!(
                "test case {} exceeds {} bytes",
                case.id, self.bounds.max_case_bytes
            )));
        }
        if request.timeout_ms == Some(0) {
            return Err(JudgeError::MalformedRequest(
                "timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

async fn run_submission(
    runner: &dyn LanguageRunner,
    workspace: &Workspace,
    request: &JudgeRequest,
    limits: &ExecutionLimits,
) -> anyhow::Result<JudgeResult> {
    let total = request.test_cases.len();

    let compiled = runner.compile(workspace, &request.source, limits).await?;
    if !compiled.success {
        tracing::info!("compilation failed");
        return Ok(JudgeResult::compilation_error(total, compiled.diagnostic));
    }

    let mut passed = 0;
    for case in &request.test_cases {
        let execution = runner.execute(workspace, &case.input, limits).await;
        tracing::debug!(
            test_id = case.id,
            exit_code = ?execution.exit_code,
            timed_out = execution.timed_out,
            elapsed_ms = execution.duration_ms as u64,
            "test case executed"
        );
        match evaluate_case(case, &execution) {
            CaseOutcome::Passed => passed += 1,
            CaseOutcome::Failed(verdict, failed_test) => {
                return Ok(JudgeResult::failed(verdict, passed, total, failed_test));
            }
        }
    }

    Ok(JudgeResult::accepted(total))
}
