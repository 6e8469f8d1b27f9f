//! # Error Handling
//!
//! HTTP-facing error type and its conversion to JSON responses.
//!
//! Domain errors live next to the code that raises them
//! (`NormalizeError`, `TranscriptionError`, `TranslationError`,
//! `PipelineError`). They are converted into [`AppError`] at the HTTP
//! boundary, which is the only place that knows about status codes.
//!
//! ## JSON Response Format:
//! ```json
//! {
//!   "detail": "Unsupported target_lang: Klingon",
//!   "error": {
//!     "type": "bad_request",
//!     "message": "Unsupported target_lang: Klingon",
//!     "timestamp": "2025-01-01T12:00:00Z"
//!   }
//! }
//! ```
//! `detail` mirrors `error.message` so clients that only look for a flat
//! message field keep working.

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

/// Custom error types for the application.
///
/// ## Error Categories:
/// - **BadRequest / ValidationError**: the client sent something we cannot use (400)
/// - **Forbidden**: missing or wrong API key (403)
/// - **NotFound**: requested page or resource doesn't exist (404)
/// - **Conversion / Inference / Translation**: a pipeline stage failed (500)
/// - **Internal**: anything else on the server side (500)
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Audio could not be normalized into the canonical WAV format
    #[error("Conversion error: {0}")]
    Conversion(String),

    /// Speech recognition failed
    #[error("Inference error: {0}")]
    Inference(String),

    /// Translation backend failed
    #[error("Translation error: {0}")]
    Translation(String),
}

impl AppError {
    /// Machine-readable error type plus the human-readable message.
    fn parts(&self) -> (&'static str, &str) {
        match self {
            AppError::Internal(msg) => ("internal_error", msg),
            AppError::BadRequest(msg) => ("bad_request", msg),
            AppError::Forbidden(msg) => ("forbidden", msg),
            AppError::NotFound(msg) => ("not_found", msg),
            AppError::ValidationError(msg) => ("validation_error", msg),
            AppError::Conversion(msg) => ("conversion_error", msg),
            AppError::Inference(msg) => ("inference_error", msg),
            AppError::Translation(msg) => ("translation_error", msg),
        }
    }
}

/// Converts errors into HTTP responses.
///
/// ## HTTP Status Code Mapping:
/// - BadRequest/ValidationError → 400
/// - Forbidden → 403
/// - NotFound → 404
/// - everything else → 500
impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) | AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Internal(_)
            | AppError::Conversion(_)
            | AppError::Inference(_)
            | AppError::Translation(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let (error_type, message) = self.parts();

        HttpResponse::build(self.status_code()).json(json!({
            "detail": message,
            "error": {
                "type": error_type,
                "message": message,
                "timestamp": chrono::Utc::now().to_rfc3339()
            }
        }))
    }
}

/// Malformed multipart bodies are a client problem.
impl From<actix_multipart::MultipartError> for AppError {
    fn from(err: actix_multipart::MultipartError) -> Self {
        AppError::BadRequest(format!("Invalid multipart form: {}", err))
    }
}

/// Shorthand for `Result<T, AppError>`.
pub type AppResult<T> = Result<T, AppError>;
