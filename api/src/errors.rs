use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

use crate::services::curves::CurveError;

/// Standard error response body.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Human-readable error message
    pub error: String,
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("External service error: {0}")]
    ExternalServiceError(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::ExternalServiceError(_) => StatusCode::BAD_GATEWAY,
            AppError::InternalError(_) | AppError::DatabaseError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            AppError::NotFound(msg)
            | AppError::BadRequest(msg)
            | AppError::ExternalServiceError(msg)
            | AppError::InternalError(msg) => msg,
            AppError::DatabaseError(err) => {
                tracing::error!("Database error: {:?}", err);
                "Internal database error".to_string()
            }
        };

        (status, axum::Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<CurveError> for AppError {
    fn from(err: CurveError) -> Self {
        match err {
            CurveError::CropNotFound { .. } | CurveError::CurveNumberNotFound { .. } => {
                AppError::NotFound(err.to_string())
            }
            CurveError::InvalidPeriod(_) | CurveError::InvalidPeriodRange { .. } => {
                AppError::BadRequest(err.to_string())
            }
            CurveError::SourceNotFound(_) | CurveError::Load { .. } => {
                tracing::error!("Crop coefficient source error: {}", err);
                AppError::InternalError(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_curve_lookup_errors_are_not_found() {
        let err: AppError = CurveError::CropNotFound {
            crop_code: "NOPE".to_string(),
            available: vec!["ALFP".to_string(), "BEET".to_string()],
        }
        .into();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert!(err.to_string().contains("ALFP, BEET"));

        let err: AppError = CurveError::CurveNumberNotFound {
            curve_number: 99,
            available: vec![1, 2],
        }
        .into();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_invalid_period_is_bad_request() {
        let err: AppError = CurveError::InvalidPeriod(22).into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_source_errors_are_internal() {
        let err: AppError = CurveError::SourceNotFound(PathBuf::from("/missing.txt")).into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_into_response_status() {
        let response = AppError::BadRequest("station parameter is required".to_string())
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = AppError::DatabaseError(sqlx::Error::RowNotFound).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
