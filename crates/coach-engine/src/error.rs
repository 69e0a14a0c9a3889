//! Engine error types

use thiserror::Error;

/// Failure talking to an external collaborator (analysis service, engine
/// process, coach stream). Always recoverable by an explicit retry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Stockfish error: {0}")]
    Engine(String),

    #[error("Stream closed before completion")]
    StreamClosed,

    #[error("Coach API key is not configured")]
    MissingApiKey,
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            TransportError::MalformedPayload(e.to_string())
        } else {
            TransportError::Http(e.to_string())
        }
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(e: serde_json::Error) -> Self {
        TransportError::MalformedPayload(e.to_string())
    }
}

/// Misuse of the session surface. Nothing here changes session state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("A coach reply is already in flight")]
    TurnInFlight,

    #[error("No message with id {0}")]
    UnknownMessage(u64),

    #[error("Message {0} is not a failed user turn")]
    NotRetryable(u64),

    #[error("Message text is empty")]
    EmptyTurn,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
}
