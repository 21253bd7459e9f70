/// Error types for the relay core.
/// Only authentication and persistence failures travel beyond the operation
/// that raised them; everything else is absorbed per connection.
use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("Persistence failure: {0}")]
    PersistenceFailure(#[from] StoreError),
}

/// Errors raised by the offline store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage task failed: {0}")]
    Task(String),
}

impl ResponseError for RelayError {
    fn status_code(&self) -> StatusCode {
        match self {
            RelayError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            RelayError::MalformedEnvelope(_) => StatusCode::BAD_REQUEST,
            RelayError::PersistenceFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        // Store details stay in the server log
        let message = match self {
            RelayError::PersistenceFailure(_) => "message could not be stored".to_string(),
            other => other.to_string(),
        };
        HttpResponse::build(self.status_code()).json(json!({ "error": message }))
    }
}
