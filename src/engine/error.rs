use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::engine::models::Verdict;

/// Failures that reject a judging call instead of producing a verdict.
#[derive(Debug, Error)]
pub enum JudgeError {
    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),
    #[error("malformed request: {0}")]
    MalformedRequest(String),
    #[error("judge is shutting down")]
    ShuttingDown,
    #[error("internal error: {0}")]
    Internal(String),
}

impl JudgeError {
    pub fn status(&self) -> StatusCode {
        match self {
            JudgeError::UnsupportedLanguage(_) | JudgeError::MalformedRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            JudgeError::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
            JudgeError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    /// Always `null`: a rejected call never reaches a verdict.
    verdict: Option<Verdict>,
}

impl IntoResponse for JudgeError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.to_string(),
            verdict: None,
        });
        (self.status(), body).into_response()
    }
}

impl From<anyhow::Error> for JudgeError {
    fn from(value: anyhow::Error) -> Self {
        Self::Internal(format!("{value:#}"))
    }
}
