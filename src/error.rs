use thiserror::Error;

use crate::Failure;

/// Errors that can occur during RPC operations
#[derive(Error, Debug)]
pub enum RpcError {
    /// The remote handler failed; carries its serialized failure.
    #[error("{0}")]
    Remote(Failure),

    /// The owning transport was disposed while the call was pending
    #[error("transport closed")]
    TransportClosed,

    /// Caller-side timeout elapsed before a response arrived
    #[error("request timed out")]
    Timeout,

    /// JSON serialization or deserialization failed
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Underlying transport failure
    #[error("transport error: {0}")]
    Transport(String),

    /// A second server dispatcher tried to claim an already served channel
    #[error("channel already served on this transport: {0}")]
    DuplicateServer(String),

    /// Malformed envelope or bridge expression
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The evaluation host could not evaluate an expression
    #[error("evaluation failed: {0}")]
    Evaluation(String),
}

impl RpcError {
    /// Returns the remote failure if this error came from the other side.
    pub fn as_remote(&self) -> Option<&Failure> {
        // ---
        match self {
            RpcError::Remote(failure) => Some(failure),
            _ => None,
        }
    }
}

/// Result type alias for RPC operations
pub type Result<T> = std::result::Result<T, RpcError>;
