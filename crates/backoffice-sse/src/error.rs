//! Error types for streaming and fan-out.

use backoffice_core::BackofficeError;
use thiserror::Error;

use crate::registry::ConnectionId;

/// Result type for stream operations.
pub type SseResult<T> = Result<T, SseError>;

/// Errors raised by stream senders and the registry.
#[derive(Debug, Error)]
pub enum SseError {
    /// The receiving side is gone.
    #[error("stream closed")]
    StreamClosed,

    /// The client's channel is full.
    #[error("channel full, client is not keeping up")]
    ChannelFull,

    /// Event payload could not be encoded.
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A client with this id is already registered.
    #[error("stream client {0} is already registered")]
    DuplicateClient(ConnectionId),
}

impl From<SseError> for BackofficeError {
    fn from(err: SseError) -> Self {
        match err {
            SseError::DuplicateClient(_) => Self::conflict(err.to_string()),
            SseError::Serialization(e) => Self::from(e),
            SseError::StreamClosed | SseError::ChannelFull => Self::unknown(err.to_string()),
        }
    }
}
