//! Error types for the attendance integrity engine.
//!
//! Validation rejections of mobile punches are NOT errors: they travel back to the caller
//! as structured results (`MobilePunchResponse`). Everything here is either retried,
//! surfaced as a fault event, or mapped to an HTTP status by the API layer.

use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use chrono::NaiveDate;
use serde_json::json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, IntegrityError>;

#[derive(Error, Debug)]
pub enum IntegrityError {
    /// Timeout, 5xx or throttling from the vendor punch API. Retried, then deferred.
    #[error("Punch source unavailable: {0}")]
    TransientSource(String),

    /// Impossible aggregate state. Always surfaced, never auto-corrected.
    #[error("Data integrity fault: {0}")]
    DataIntegrity(String),

    /// Day stays incomplete because no id bound could be inferred.
    #[error("Gap remnant on {0}: no id bound could be inferred")]
    GapRemnant(NaiveDate),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<reqwest::Error> for IntegrityError {
    fn from(e: reqwest::Error) -> Self {
        IntegrityError::TransientSource(e.to_string())
    }
}

impl ResponseError for IntegrityError {
    fn status_code(&self) -> StatusCode {
        match self {
            IntegrityError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            IntegrityError::NotFound(_) => StatusCode::NOT_FOUND,
            IntegrityError::GapRemnant(_) => StatusCode::UNPROCESSABLE_ENTITY,
            IntegrityError::TransientSource(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = match self {
            // don't leak SQL details to callers
            IntegrityError::Database(_)
            | IntegrityError::Migration(_)
            | IntegrityError::Serialization(_) => {
                "Internal Server Error".to_string()
            }
            other => other.to_string(),
        };
        HttpResponse::build(self.status_code()).json(json!({ "message": message }))
    }
}
