use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use ichats_core::error::CoreError;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("unauthorized")]
    Unauthorized,
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("internal server error")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Body is `{error, message}`; `error` is a stable short code and `message`
/// the human-readable detail. Internal causes are logged, never returned.
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = match &self {
            ApiError::Unauthorized => "unauthorized",
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Internal(err) => {
                tracing::error!(error = %format!("{err:#}"), "request failed");
                "internal"
            }
        };
        let message = match &self {
            ApiError::Internal(_) => "internal server error".to_string(),
            other => other.to_string(),
        };
        (status, Json(json!({ "error": code, "message": message }))).into_response()
    }
}

impl From<CoreError> for ApiError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::Malformed(msg) => ApiError::BadRequest(msg),
            err @ CoreError::TargetUnreachable(_) => ApiError::BadRequest(err.to_string()),
            CoreError::Persistence(err) => ApiError::Internal(anyhow::anyhow!(err)),
        }
    }
}
