use std::{sync::Arc, time::Instant};

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, State, rejection::JsonRejection},
    http::StatusCode,
    routing::{get, post},
};
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::engine::{
    error::JudgeError,
    metrics::MetricsRegistry,
    models::{JudgeRequest, JudgeResponse, LanguagesResponse},
    verdict::VerdictEngine,
};

#[derive(Clone)]
pub struct AppState {
    engine: Arc<VerdictEngine>,
    metrics: Arc<MetricsRegistry>,
    permits: Arc<Semaphore>,
}

/// Builds the HTTP surface. `permits` bounds concurrent judging; closing it
/// turns every call still waiting for a permit into a 503.
pub fn routes(
    engine: Arc<VerdictEngine>,
    metrics_registry: Arc<MetricsRegistry>,
    permits: Arc<Semaphore>,
) -> Router {
    let body_limit = engine.bounds().body_limit();
    let state = AppState {
        engine,
        metrics: metrics_registry,
        permits,
    };
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/languages", get(languages))
        .route("/judge", post(judge))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "judge",
        "languages": state.engine.languages(),
    }))
}

async fn metrics(State(state): State<AppState>) -> (StatusCode, String) {
    (StatusCode::OK, state.metrics.render_prometheus())
}

async fn languages(State(state): State<AppState>) -> Json<LanguagesResponse> {
    Json(LanguagesResponse {
        languages: state.engine.languages(),
    })
}

async fn judge(
    State(state): State<AppState>,
    payload: Result<Json<JudgeRequest>, JsonRejection>,
) -> Result<Json<JudgeResponse>, JudgeError> {
    let judge_id = Uuid::new_v4();
    let admission = payload
        .map_err(|rejection| JudgeError::MalformedRequest(rejection.body_text()))
        .and_then(|Json(request)| state.engine.admit(request))
        .map_err(|err| {
            state.metrics.rejected();
            tracing::info!(judge_id = %judge_id, reason = %err, "submission rejected");
            err
        })?;
    tracing::info!(
        judge_id = %judge_id,
        language = admission.language(),
        test_cases = admission.test_cases(),
        "submission received"
    );

    let _permit = state.permits.acquire().await.map_err(|_| {
        state.metrics.rejected();
        JudgeError::ShuttingDown
    })?;
    let _in_flight = state.metrics.track_in_flight();
    let started = Instant::now();

    match state.engine.run(judge_id, admission).await {
        Ok(result) => {
            state.metrics.judged(result.verdict);
            Ok(Json(JudgeResponse {
                judge_id,
                result,
                elapsed_ms: started.elapsed().as_millis(),
            }))
        }
        Err(err) => {
            state.metrics.internal_error();
            tracing::error!(judge_id = %judge_id, error = %err, "judging failed");
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{path::Path, time::Duration};

    use axum::{
        body::{Body, to_bytes},
        http::{Request, header},
    };
    use tower::ServiceExt;

    use super::*;
    use crate::engine::{
        config::RequestBounds,
        models::ExecutionLimits,
        runner::{InterpretedRunner, RunnerRegistry},
        workspace::WorkspaceManager,
    };

    fn app(root: &Path) -> (Router, Arc<MetricsRegistry>) {
        app_with_permits(root, Arc::new(Semaphore::new(2)))
    }

    fn app_with_permits(root: &Path, permits: Arc<Semaphore>) -> (Router, Arc<MetricsRegistry>) {
        let mut registry = RunnerRegistry::new();
        registry.register(Arc::new(InterpretedRunner::new("sh", "sh", "main.sh")), &["shell"]);
        let engine = VerdictEngine::new(
            registry,
            WorkspaceManager::new(root.to_path_buf()),
            ExecutionLimits::default(),
            RequestBounds::default(),
        );
        let metrics = Arc::new(MetricsRegistry::new());
        (routes(Arc::new(engine), metrics.clone(), permits), metrics)
    }

    fn judge_request(body: &serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/judge")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn sleeper() -> serde_json::Value {
        serde_json::json!({
            "language": "sh",
            "code": "sleep 3\n",
            "testcases": [{"id": 1, "input": "", "expected_output": ""}]
        })
    }

    async fn post_judge(app: Router, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
        let response = app.oneshot(judge_request(&body)).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn judges_a_submission_end_to_end() {
        let root = tempfile::tempdir().unwrap();
        let (app, metrics) = app(root.path());

        let (status, body) = post_judge(
            app,
            serde_json::json!({
                "language": "shell",
                "code": "read a b\necho $((a + b))\n",
                "testcases": [
                    {"id": 1, "input": "1 2", "expected_output": "3"},
                    {"id": 2, "input": "5 7", "expected_output": "12"}
                ]
            }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["verdict"], "Accepted");
        assert_eq!(body["passed"], 2);
        assert_eq!(body["total"], 2);
        assert!(body["failed_test"].is_null());
        assert!(body["judge_id"].is_string());
        assert!(metrics.render_prometheus().contains("judge_verdicts_total{verdict=\"accepted\"} 1"));
    }

    #[tokio::test]
    async fn wrong_answer_reports_failing_test() {
        let root = tempfile::tempdir().unwrap();
        let (app, _) = app(root.path());

        let (status, body) = post_judge(
            app,
            serde_json::json!({
                "language": "sh",
                "source": "read a b\necho $((a + b))\n",
                "test_cases": [{"id": 4, "input": "1 2", "expectedOutput": "4"}]
            }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["verdict"], "Wrong Answer");
        assert_eq!(body["passed"], 0);
        assert_eq!(body["failed_test"]["test_id"], 4);
        assert_eq!(body["failed_test"]["actual"], "3");
        assert_eq!(body["failed_test"]["expected"], "4");
    }

    #[tokio::test]
    async fn unsupported_language_is_a_bad_request() {
        let root = tempfile::tempdir().unwrap();
        let ws_root = root.path().join("ws");
        let (app, metrics) = app(&ws_root);

        let (status, body) = post_judge(
            app,
            serde_json::json!({
                "language": "brainfuck",
                "code": "+++",
                "testcases": [{"id": 1, "input": "", "expected_output": ""}]
            }),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "unsupported language: brainfuck");
        assert!(body["verdict"].is_null());
        assert!(!ws_root.exists());
        assert!(metrics.render_prometheus().contains("judge_rejected_total 1"));
    }

    #[tokio::test]
    async fn structurally_invalid_body_is_malformed() {
        let root = tempfile::tempdir().unwrap();
        let (app, _) = app(root.path());

        let (status, body) = post_judge(app, serde_json::json!({ "language": "sh" })).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().starts_with("malformed request"));
    }

    #[tokio::test]
    async fn lists_supported_languages() {
        let root = tempfile::tempdir().unwrap();
        let (app, _) = app(root.path());

        let response = app
            .oneshot(Request::builder().uri("/languages").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["languages"], serde_json::json!(["sh"]));
    }

    #[tokio::test]
    async fn health_reports_service_status() {
        let root = tempfile::tempdir().unwrap();
        let (app, _) = app(root.path());

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["service"], "judge");
    }

    #[tokio::test]
    async fn cancelled_call_leaves_nothing_in_flight() {
        let root = tempfile::tempdir().unwrap();
        let (app, metrics) = app(root.path());

        let cancelled = tokio::time::timeout(
            Duration::from_millis(300),
            app.oneshot(judge_request(&sleeper())),
        )
        .await;

        assert!(cancelled.is_err());
        assert!(metrics.render_prometheus().contains("judge_in_flight 0"));
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn rejections_do_not_wait_for_a_permit() {
        let root = tempfile::tempdir().unwrap();
        let (app, _) = app_with_permits(root.path(), Arc::new(Semaphore::new(1)));

        let busy = tokio::spawn(app.clone().oneshot(judge_request(&sleeper())));
        tokio::time::sleep(Duration::from_millis(200)).await;

        let started = Instant::now();
        let (status, body) = post_judge(
            app.clone(),
            serde_json::json!({
                "language": "cobol",
                "code": "DISPLAY 1.",
                "testcases": [{"id": 1, "input": "", "expected_output": "1"}]
            }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "unsupported language: cobol");

        let (status, _) = post_judge(app, serde_json::json!({ "language": "sh" })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(started.elapsed() < Duration::from_millis(500));

        busy.abort();
    }

    #[tokio::test]
    async fn closed_admission_answers_service_unavailable() {
        let root = tempfile::tempdir().unwrap();
        let permits = Arc::new(Semaphore::new(1));
        let (app, metrics) = app_with_permits(root.path(), permits.clone());
        permits.close();

        let (status, body) = post_judge(
            app,
            serde_json::json!({
                "language": "sh",
                "code": "echo 1\n",
                "testcases": [{"id": 1, "input": "", "expected_output": "1"}]
            }),
        )
        .await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], "judge is shutting down");
        assert!(body["verdict"].is_null());
        assert!(metrics.render_prometheus().contains("judge_in_flight 0"));
    }

    #[tokio::test]
    async fn bodies_beyond_two_megabytes_are_judged() {
        let root = tempfile::tempdir().unwrap();
        let (app, _) = app(root.path());

        let input = "7".repeat(60_000);
        let cases: Vec<serde_json::Value> = (1..=40)
            .map(|id| serde_json::json!({"id": id, "input": input, "expected_output": "ok"}))
            .collect();
        let body = serde_json::json!({
            "language": "sh",
            "code": "echo no\n",
            "testcases": cases
        });
        assert!(body.to_string().len() > 2 * 1024 * 1024);

        let (status, body) = post_judge(app, body).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["verdict"], "Wrong Answer");
        assert_eq!(body["total"], 40);
        assert_eq!(body["failed_test"]["test_id"], 1);
    }
}
