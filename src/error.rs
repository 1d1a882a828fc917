use crate::models::FailureResponse;
use crate::storage::StorageError;
use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    MalformedRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("request body too large")]
    PayloadTooLarge,
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::MalformedRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Storage(StorageError::NotFound(_) | StorageError::InvalidName(_)) => {
                StatusCode::NOT_FOUND
            }
            ApiError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self.status_code() {
            StatusCode::BAD_REQUEST => "bad_request",
            StatusCode::NOT_FOUND => "not_found",
            StatusCode::PAYLOAD_TOO_LARGE => "payload_too_large",
            _ => "storage_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::warn!(error = %self, status = status.as_u16(), "request rejected");
        }

        let body = FailureResponse {
            success: false,
            message: self.to_string(),
            error: self.code().to_string(),
        };
        (
            status,
            [(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")],
            Json(body),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_errors_map_to_status() {
        let missing = ApiError::from(StorageError::NotFound("a.html".into()));
        assert_eq!(missing.status_code(), StatusCode::NOT_FOUND);

        let exists = ApiError::from(StorageError::AlreadyExists("a.html".into()));
        assert_eq!(exists.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(exists.code(), "storage_error");

        let bad = ApiError::MalformedRequest("unsupported content type".into());
        assert_eq!(bad.status_code(), StatusCode::BAD_REQUEST);
    }
}
