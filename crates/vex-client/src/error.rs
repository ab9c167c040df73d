use thiserror::Error;

use vex_net::TransportError;
use vex_shared::protocol::ApiError;
use vex_shared::types::RequestId;
use vex_shared::{KeyError, ProtocolError};

/// Everything a caller of the client can see go wrong.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Request ID already pending: {0}")]
    DuplicateRequestId(RequestId),

    /// The transport went away while the request was outstanding.
    #[error("Connection lost before a reply arrived")]
    ConnectionLost,

    #[error("Not connected")]
    NotConnected,

    #[error("Client logged out")]
    LoggedOut,

    /// The server answered the request with `status: error`.
    #[error("Server error {0}")]
    Api(ApiError),

    /// The server failed to prove its identity. Never retried.
    #[error("Trust violation: {0}")]
    TrustViolation(String),

    #[error("Handshake failed: {0}")]
    HandshakeFailed(String),

    #[error("Timed out after {millis} ms waiting for {operation}")]
    Timeout { operation: &'static str, millis: u64 },

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Key error: {0}")]
    Key(#[from] KeyError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

impl From<serde_json::Error> for ClientError {
    fn from(e: serde_json::Error) -> Self {
        Self::Protocol(ProtocolError::Json(e))
    }
}

impl From<hex::FromHexError> for ClientError {
    fn from(e: hex::FromHexError) -> Self {
        Self::Protocol(ProtocolError::Hex(e))
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ClientError>;
