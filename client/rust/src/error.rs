/// Error types for the chat client.
/// Covers transport, HTTP, crypto and connection-lifecycle failures.
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    #[error("HTTP error: {0}")]
    HttpError(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Crypto error: {0}")]
    CryptoError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("State error: {0}")]
    StateError(String),

    #[error("Failed to reconnect after {0} attempts")]
    ReconnectExhausted(u32),

    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        ClientError::HttpError(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ClientError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        ClientError::WebSocketError(err.to_string())
    }
}

impl From<url::ParseError> for ClientError {
    fn from(err: url::ParseError) -> Self {
        ClientError::ConfigError(format!("Invalid server URL: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ClientError::ReconnectExhausted(3);
        assert_eq!(err.to_string(), "Failed to reconnect after 3 attempts");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let client_err: ClientError = io_err.into();
        assert!(client_err.to_string().contains("IO error"));
    }

    #[test]
    fn test_error_from_url() {
        let client_err: ClientError = url::Url::parse("not a url").unwrap_err().into();
        assert!(matches!(client_err, ClientError::ConfigError(_)));
    }
}
