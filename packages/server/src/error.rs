use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use common::StoreError;
use sea_orm::DbErr;
use serde::Serialize;
use utoipa::ToSchema;

/// Structured error response body.
#[derive(Serialize, ToSchema)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

/// Application-level error type.
#[derive(Debug)]
pub enum AppError {
    Validation(String),
    NotFound(String),
    /// Block graph or catalogue is misconfigured (bad arity, template
    /// placeholder count, cycle).
    Configuration(String),
    /// A pipeline evaluation failed (subprocess error, missing input file).
    Evaluation(String),
    /// Thumbnail generation failed.
    Thumbnail(String),
    Internal(String),
}

impl AppError {
    fn status_and_body(self) -> (StatusCode, ErrorBody) {
        match self {
            AppError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    code: "VALIDATION_ERROR",
                    message: msg,
                },
            ),
            AppError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                ErrorBody {
                    code: "NOT_FOUND",
                    message: msg,
                },
            ),
            AppError::Configuration(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody {
                    code: "CONFIGURATION_ERROR",
                    message: msg,
                },
            ),
            AppError::Evaluation(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody {
                    code: "EVALUATION_FAILED",
                    message: msg,
                },
            ),
            AppError::Thumbnail(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody {
                    code: "THUMBNAIL_FAILED",
                    message: msg,
                },
            ),
            AppError::Internal(detail) => {
                tracing::error!("Internal error: {}", detail);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody {
                        code: "INTERNAL_ERROR",
                        message: "An unexpected error occurred".into(),
                    },
                )
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = self.status_and_body();
        (status, Json(body)).into_response()
    }
}

impl From<DbErr> for AppError {
    fn from(err: DbErr) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidUuid(raw) => {
                AppError::Validation(format!("Invalid image uuid: {raw}"))
            }
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<crate::eval::EvalError> for AppError {
    fn from(err: crate::eval::EvalError) -> Self {
        use crate::eval::EvalError;
        match err {
            EvalError::BlockNotFound(id) => AppError::NotFound(format!("Block {id} not found")),
            EvalError::Cycle(_)
            | EvalError::Configuration { .. }
            | EvalError::BlockTypeNotFound { .. } => AppError::Configuration(err.to_string()),
            EvalError::UnknownImage(_)
            | EvalError::MissingInput { .. }
            | EvalError::Execution { .. } => AppError::Evaluation(err.to_string()),
            EvalError::Db(db) => db.into(),
            EvalError::Store(store) => store.into(),
        }
    }
}

impl From<crate::invalidation::InvalidateError> for AppError {
    fn from(err: crate::invalidation::InvalidateError) -> Self {
        use crate::invalidation::InvalidateError;
        match err {
            InvalidateError::BlockNotFound(id) => {
                AppError::NotFound(format!("Block {id} not found"))
            }
            InvalidateError::Db(db) => db.into(),
            InvalidateError::Store(store) => store.into(),
        }
    }
}

impl From<crate::thumbs::ThumbError> for AppError {
    fn from(err: crate::thumbs::ThumbError) -> Self {
        use crate::thumbs::ThumbError;
        match err {
            ThumbError::InvalidWidth(w) => {
                AppError::Validation(format!("Invalid thumbnail width: {w}"))
            }
            ThumbError::SourceMissing(uuid) => AppError::NotFound(format!("No image {uuid}")),
            ThumbError::Store(store) => store.into(),
            ThumbError::Generation(detail) => AppError::Thumbnail(detail),
        }
    }
}
