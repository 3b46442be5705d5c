use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use holdwatch_core::errors::{CheckpointError, DatabaseError, Error as CoreError};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unprocessable(String),
    #[error("{0}")]
    Upstream(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        let message = err.to_string();
        match err {
            CoreError::Checkpoint(CheckpointError::NotFound(_))
            | CoreError::InvestorNotFound(_)
            | CoreError::Database(DatabaseError::NotFound(_)) => ApiError::NotFound(message),
            CoreError::Checkpoint(_) => ApiError::Conflict(message),
            CoreError::Validation(_) | CoreError::InvalidConfigValue(_) => {
                ApiError::BadRequest(message)
            }
            CoreError::Reconcile(_) | CoreError::Parse(_) => ApiError::Unprocessable(message),
            CoreError::Fetch(_) => ApiError::Upstream(message),
            other => ApiError::Internal(anyhow::Error::new(other)),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {:#}", self);
        }
        let body = Json(json!({
            "code": status.as_u16(),
            "message": self.to_string(),
        }));
        (status, body).into_response()
    }
}
