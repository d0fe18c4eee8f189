//! Protocol error types.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while encoding or decoding protocol messages.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// The payload is not valid JSON or does not match the message shape.
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
}
