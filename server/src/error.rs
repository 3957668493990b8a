//! Maps `engine::CoreError` onto the `{error:{code,message,details}}`
//! envelope and HTTP status of spec §6/§7.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use credit_sim_engine::error::ErrorCode;
use credit_sim_engine::CoreError;
use serde_json::json;

pub struct ApiError(pub CoreError);

impl From<CoreError> for ApiError {
    fn from(e: CoreError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            CoreError::Validation(_) => StatusCode::BAD_REQUEST,
            CoreError::Unauthorized => StatusCode::UNAUTHORIZED,
            CoreError::Forbidden { .. } => StatusCode::FORBIDDEN,
            CoreError::StateConflict { .. } => StatusCode::CONFLICT,
            CoreError::BusinessRejection(_) => StatusCode::UNPROCESSABLE_ENTITY,
            CoreError::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
            CoreError::Fatal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let code = match self.0.code() {
            ErrorCode::Forbidden => "E006",
            ErrorCode::StateConflict => "E008",
            ErrorCode::Validation => "E009",
            ErrorCode::Internal => "E010",
        };
        let mut body = json!({
            "error": {
                "code": code,
                "message": self.0.to_string(),
            }
        });
        if let Some(details) = self.0.details() {
            body["error"]["details"] = details.clone();
        }
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
