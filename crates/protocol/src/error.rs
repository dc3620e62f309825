//! Error types for the wire layer.

use thiserror::Error;

/// Errors raised while encoding a message for the wire.
#[derive(Debug, Error)]
pub enum MarshalError {
    /// MessagePack encoding failed.
    #[error("failed to encode msgpack payload: {0}")]
    Msgpack(String),

    /// JSON encoding failed.
    #[error("failed to encode json payload")]
    Json(#[source] serde_json::Error),
}

impl MarshalError {
    pub(crate) fn msgpack(err: impl std::fmt::Display) -> Self {
        Self::Msgpack(err.to_string())
    }
}

/// Outcome delivered on a message's reply slot.
///
/// Fire-and-forget messages never carry a reply slot; the synchronous
/// variants (ping, HTTP posts with a waiting caller) arm one and receive
/// exactly one of these, or channel closure when the engine released the
/// envelope without an outcome.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The pending buffer could not accept the encoded message.
    #[error("buffer is full")]
    BufferFull,

    /// The marshaler rejected the payload.
    #[error("failed to marshal payload")]
    Marshal(#[from] MarshalError),

    /// Dial or TLS handshake failed.
    #[error("failed to connect to server: {0}")]
    Connect(String),

    /// The socket write failed.
    #[error("failed to write message to connection: {0}")]
    Write(String),

    /// The HTTP transport failed.
    #[error("failed to post http request: {0}")]
    Http(String),

    /// The HTTP server answered with a non-200 status.
    #[error("return code is not 200 (got {0})")]
    HttpStatus(u16),
}
