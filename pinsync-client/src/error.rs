//! Client error types

use pinsync_cert::CertError;
use thiserror::Error;

/// Client error type
#[derive(Debug, Error)]
pub enum ClientError {
    /// Malformed UUID, key or signature input
    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    /// Server answered 401/403
    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    /// Call exceeded its latency bound
    #[error("Request timed out")]
    Timeout,

    /// Non-2xx response other than 401/403
    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    /// WebSocket connection dropped before a reply arrived
    #[error("Transport lost")]
    TransportLost,

    /// Operation needs a machine paired with a venue
    #[error("Machine is not paired")]
    NotPaired,

    /// Operation not allowed in the current state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid response format
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ClientError {
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, ClientError::AuthFailed(_))
    }
}

impl From<CertError> for ClientError {
    fn from(err: CertError) -> Self {
        ClientError::InvalidCredential(err.to_string())
    }
}

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;
