use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<steward_engine::EngineError> for ApiError {
    fn from(err: steward_engine::EngineError) -> Self {
        match err {
            steward_engine::EngineError::NotFound(name) => {
                ApiError::NotFound(format!("Deployment not found: {}", name))
            }
            steward_engine::EngineError::InvalidInput(msg) => ApiError::BadRequest(msg),
            steward_engine::EngineError::Validation(e) => ApiError::BadRequest(e.to_string()),
            _ => ApiError::Internal(err.to_string()),
        }
    }
}
