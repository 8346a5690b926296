use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Failure taxonomy of the generation layer.
///
/// `Clone` so one single-flight outcome can be handed to every attached waiter.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GenerationError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Insufficient credits: need {required}, have {available}")]
    InsufficientCredits { required: u32, available: u32 },

    #[error("Generator error: {0}")]
    Generator(String),

    #[error("Unanswered questions: {}", missing_question_ids.join(", "))]
    Precondition { missing_question_ids: Vec<String> },

    #[error("Timed out after {waited_ms}ms waiting for in-flight generation")]
    LockTimeout { waited_ms: u64 },

    #[error("Generation cancelled")]
    Cancelled,

    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<sqlx::Error> for GenerationError {
    fn from(e: sqlx::Error) -> Self {
        GenerationError::Storage(e.to_string())
    }
}

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut details = serde_json::Value::Null;

        let (status, code, message) = match &self {
            AppError::Validation(msg)
            | AppError::Generation(GenerationError::Validation(msg)) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
            }
            AppError::NotFound(msg) | AppError::Generation(GenerationError::NotFound(msg)) => {
                (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone())
            }
            AppError::Generation(e @ GenerationError::InsufficientCredits { required, available }) => {
                details = json!({ "creditCost": required, "remaining": available });
                (StatusCode::PAYMENT_REQUIRED, "INSUFFICIENT_CREDITS", e.to_string())
            }
            AppError::Generation(GenerationError::Generator(msg)) => {
                tracing::error!("Generator error: {msg}");
                (
                    StatusCode::BAD_GATEWAY,
                    "GENERATOR_ERROR",
                    "The AI provider failed to produce a result. No credits were charged.".to_string(),
                )
            }
            AppError::Generation(
                e @ GenerationError::Precondition {
                    missing_question_ids,
                },
            ) => {
                details = json!({ "missingQuestionIds": missing_question_ids });
                (StatusCode::CONFLICT, "PRECONDITION_FAILED", e.to_string())
            }
            AppError::Generation(e @ GenerationError::LockTimeout { .. }) => {
                (StatusCode::SERVICE_UNAVAILABLE, "LOCK_TIMEOUT", e.to_string())
            }
            AppError::Generation(GenerationError::Cancelled) => (
                StatusCode::REQUEST_TIMEOUT,
                "CANCELLED",
                "The generation was cancelled before it completed".to_string(),
            ),
            AppError::Generation(GenerationError::Storage(msg)) => {
                tracing::error!("Storage error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "STORAGE_ERROR",
                    "A storage error occurred".to_string(),
                )
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "A database error occurred".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let mut error = json!({
            "code": code,
            "message": message
        });
        if !details.is_null() {
            error["details"] = details;
        }

        (status, Json(json!({ "error": error }))).into_response()
    }
}
