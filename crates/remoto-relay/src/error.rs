//! Error types for remoto-relay

use thiserror::Error;

use crate::registry::ConnectionId;

/// Relay error type
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Handshake rejected: {0}")]
    HandshakeRejected(String),

    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    #[error("Peer {0} is gone")]
    PeerGone(ConnectionId),

    #[error("Relay hub has shut down")]
    HubClosed,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for remoto-relay
pub type Result<T> = std::result::Result<T, RelayError>;
