//! Error types for the voxbridge gateway

use thiserror::Error;

/// Result type alias for voxbridge operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the voxbridge gateway
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Telephony media-stream error
    #[error("telephony error: {0}")]
    Telephony(String),

    /// AI backend session error
    #[error("backend error: {0}")]
    Backend(String),

    /// The AI backend session expired; the call must end
    #[error("backend session expired")]
    SessionExpired,

    /// Speech synthesis error
    #[error("synthesis error: {0}")]
    Synthesis(String),

    /// CRM/REST collaborator error
    #[error("crm error: {0}")]
    Crm(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// WebSocket error
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}
