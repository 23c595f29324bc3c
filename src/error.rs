use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::db::DbError;

/// The crate-wide error kinds. Lower layers keep their own narrow,
/// `thiserror`-derived errors (`DbError`, `EstimatorError`, ...); `AppError` is the
/// seam where those get translated for a request handler.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("no readings available")]
    NoReadingsAvailable,

    #[error("dependency unavailable: {0}")]
    DependencyUnavailable(#[from] DbError),

    #[error("no sites configured")]
    ConfigUnconfigured,

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        AppError::DependencyUnavailable(DbError::SqlxError(e))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::InvalidArgument(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::NoReadingsAvailable => {
                return StatusCode::NOT_FOUND.into_response();
            }
            AppError::DependencyUnavailable(e) => {
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
            AppError::ConfigUnconfigured => (
                StatusCode::SERVICE_UNAVAILABLE,
                "no sites configured".to_string(),
            ),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<AppError> for tonic::Status {
    fn from(e: AppError) -> Self {
        match e {
            AppError::InvalidArgument(msg) => tonic::Status::invalid_argument(msg),
            AppError::NoReadingsAvailable => tonic::Status::not_found("no readings available"),
            AppError::DependencyUnavailable(e) => tonic::Status::internal(e.to_string()),
            AppError::ConfigUnconfigured => tonic::Status::internal("no sites configured"),
            AppError::Internal(msg) => tonic::Status::internal(msg),
        }
    }
}

/// A compute-kernel fault (PELT, smoothing). Never propagates as a panic: the kernel
/// boundary catches it with `catch_unwind` and the caller falls back to the previous
/// cache value.
#[derive(Debug, thiserror::Error)]
#[error("computation failed: {0}")]
pub struct ComputationFailed(pub String);
