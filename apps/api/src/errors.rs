use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::drafts::StorageError;
use crate::export::ExportError;
use crate::generation::generator::{GenerationError, GenerationErrorKind};
use crate::generation::validation::FieldError;
use crate::session::pipeline::RegenerateError;
use crate::session::SessionError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Request has {} invalid field(s)", .0.len())]
    InvalidRequest(Vec<FieldError>),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<SessionError> for AppError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::NotFound(_) => AppError::NotFound(e.to_string()),
            SessionError::InFlight(_) => AppError::Conflict(e.to_string()),
        }
    }
}

impl From<RegenerateError> for AppError {
    fn from(e: RegenerateError) -> Self {
        match e {
            RegenerateError::Session(e) => e.into(),
            RegenerateError::Generation(e) => e.into(),
            RegenerateError::Superseded(kind) => AppError::Conflict(format!(
                "'{}' was edited while it was being regenerated; the new text was discarded",
                kind.title()
            )),
        }
    }
}

impl AppError {
    fn component(&self) -> &'static str {
        match self {
            AppError::InvalidRequest(_) => "validator",
            AppError::Generation(_) => "generator",
            AppError::Export(_) => "exporter",
            AppError::Storage(_) => "draft_store",
            AppError::NotFound(_) | AppError::Conflict(_) => "session",
            AppError::Validation(_) | AppError::Internal(_) => "api",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut details = Map::new();
        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::InvalidRequest(fields) => {
                details.insert("fields".to_string(), json!(fields));
                (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "INVALID_REQUEST",
                    "The request has invalid fields".to_string(),
                )
            }
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
            AppError::Generation(e) => {
                tracing::error!("Generation error: {e}");
                if let Some(section) = e.section {
                    details.insert("section".to_string(), json!(section));
                }
                details.insert("kind".to_string(), json!(e.kind));
                let status = match e.kind {
                    GenerationErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
                    _ => StatusCode::BAD_GATEWAY,
                };
                (status, "GENERATION_ERROR", e.to_string())
            }
            AppError::Export(e) => {
                tracing::error!("Export error: {e}");
                match e {
                    ExportError::RendererUnavailable { hint, .. } => {
                        details.insert("hint".to_string(), json!(hint));
                        (
                            StatusCode::SERVICE_UNAVAILABLE,
                            "RENDERER_UNAVAILABLE",
                            e.to_string(),
                        )
                    }
                    ExportError::Malformed { .. } | ExportError::Render { .. } => (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "EXPORT_ERROR",
                        e.to_string(),
                    ),
                }
            }
            AppError::Storage(StorageError::NotFound(msg)) => {
                (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone())
            }
            AppError::Storage(e) => {
                tracing::error!("Storage error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "STORAGE_ERROR",
                    "The draft could not be stored or read; the open proposal is unchanged"
                        .to_string(),
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

        let mut error = Map::new();
        error.insert("code".to_string(), json!(code));
        error.insert("message".to_string(), json!(message));
        error.insert("component".to_string(), json!(self.component()));
        error.extend(details);

        let body = Json(json!({ "error": Value::Object(error) }));
        (status, body).into_response()
    }
}
