use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use repopilot_db::StoreError;
use serde_json::json;
use thiserror::Error;

/// Thin mapping from domain errors to HTTP responses. Handler bodies are glue
/// over `Store`/`Deployment` calls, so almost everything funnels through
/// `#[from] StoreError`; the remaining variants cover request validation that
/// has no `Store` counterpart (batch id limits, missing feedback, wrong task
/// status for a transition).
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Store(
                StoreError::RepoNotFound(_)
                | StoreError::TaskNotFound(_)
                | StoreError::RunNotFound(_)
                | StoreError::NotificationNotFound(_),
            ) => StatusCode::NOT_FOUND,
            ApiError::Store(StoreError::InvalidStatus(_)) => StatusCode::BAD_REQUEST,
            ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "request failed");
        }
        (status, Json(json!({"error": self.to_string()}))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
