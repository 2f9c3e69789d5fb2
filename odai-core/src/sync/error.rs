//! Sync error types.

use thiserror::Error;

/// Errors that can occur on the relay connection.
///
/// None of these are fatal: the connection manager recovers from transport
/// failures by retrying, and the other kinds are logged and dropped.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Failed to connect to the relay
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// The socket failed after it was established
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    /// A send was attempted while the connection is not open
    #[error("Not connected to relay")]
    NotConnected,

    /// Control message could not be encoded or decoded
    #[error("Protocol error: {0}")]
    ProtocolError(#[from] serde_json::Error),
}
