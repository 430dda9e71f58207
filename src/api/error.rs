//! JSON error responses for the HTTP surface.

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::error;

use crate::errors::KitchenError;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Machine-readable code, e.g. "not_found"
    pub error: String,
    pub message: String,
}

#[derive(Debug)]
pub enum ApiError {
    /// 400
    BadRequest(String),
    /// 404
    NotFound(String),
    /// 409
    Conflict(String),
    /// 415
    UnsupportedMediaType(String),
    /// 502
    BadGateway(String),
    /// 500
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg),
            ApiError::UnsupportedMediaType(msg) => {
                (StatusCode::UNSUPPORTED_MEDIA_TYPE, "unsupported_media_type", msg)
            }
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, "upstream_error", msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg),
        };

        let body = ErrorBody {
            error: error_code.to_string(),
            message,
        };

        (status, Json(body)).into_response()
    }
}

impl From<KitchenError> for ApiError {
    fn from(err: KitchenError) -> Self {
        match err {
            KitchenError::NotFound(msg) => ApiError::NotFound(msg),
            KitchenError::Duplicate(msg) | KitchenError::InUse(msg) => ApiError::Conflict(msg),
            KitchenError::Validation(msg) => ApiError::BadRequest(msg),
            KitchenError::UnsupportedImage(msg) => ApiError::UnsupportedMediaType(msg),
            upstream @ KitchenError::Upstream { .. } => ApiError::BadGateway(upstream.to_string()),
            KitchenError::Persistence(detail) => {
                error!(detail = %detail, "Persistence failure");
                ApiError::Internal("storage failure".to_string())
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(format!("invalid JSON body: {}", rejection.body_text()))
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(format!("invalid path: {}", rejection.body_text()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (KitchenError::NotFound("recipe 1".into()), StatusCode::NOT_FOUND),
            (KitchenError::Duplicate("Milk".into()), StatusCode::CONFLICT),
            (KitchenError::InUse("Milk".into()), StatusCode::CONFLICT),
            (KitchenError::Validation("bad".into()), StatusCode::BAD_REQUEST),
            (KitchenError::UnsupportedImage("pdf".into()), StatusCode::UNSUPPORTED_MEDIA_TYPE),
            (
                KitchenError::Upstream {
                    attempted: vec!["a".into()],
                    reason: "down".into(),
                },
                StatusCode::BAD_GATEWAY,
            ),
            (KitchenError::Persistence("connection reset".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, status) in cases {
            assert_eq!(ApiError::from(err).into_response().status(), status);
        }
    }

    #[test]
    fn test_persistence_detail_is_not_exposed() {
        let err = ApiError::from(KitchenError::Persistence("password authentication failed".into()));
        assert!(matches!(err, ApiError::Internal(ref msg) if msg == "storage failure"));
    }
}
