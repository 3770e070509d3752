use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Collects every handler failure into the response shapes spec.md §6 names
/// (400/404/409/500; 429 is enforced ahead of handlers by `rate_limit`).
pub enum ApiError {
    BadRequest(String),
    NotFound,
    Conflict(String),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound => (StatusCode::NOT_FOUND, "not found".to_string()),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Internal(err) => {
                tracing::error!(error = %err, "internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
        };
        (status, Json(ErrorBody { error: message })).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        ApiError::Internal(e)
    }
}

impl From<pa_store::DeleteError> for ApiError {
    fn from(e: pa_store::DeleteError) -> Self {
        match e {
            pa_store::DeleteError::NotFound(_) => ApiError::NotFound,
            pa_store::DeleteError::RunningConflict(_) => ApiError::Conflict(e.to_string()),
            pa_store::DeleteError::Db(err) => ApiError::Internal(err.into()),
        }
    }
}
