//! Client error taxonomy.

use std::io;

use fluentd_protocol::{DeliveryError, MarshalError};
use thiserror::Error;

/// Errors surfaced by the client API.
///
/// Fire-and-forget posts only ever observe the enqueue-side variants
/// (`QueueFull`, `Closed`, `Marshal`); everything downstream of the queue is
/// recovered internally and logged. The synchronous variants surface the
/// full taxonomy.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The incoming queue could not accept another message.
    #[error("queue is full")]
    QueueFull,

    /// The client has been shut down.
    #[error("client is closed")]
    Closed,

    /// The network string was neither `tcp` nor `unix`.
    #[error("invalid network type: {0}")]
    InvalidNetwork(String),

    /// Unix sockets were requested on a platform without them.
    #[error("unix sockets are not supported on this platform")]
    UnsupportedNetwork,

    /// Dial or TLS handshake failed.
    #[error("failed to connect to server: {address}")]
    Connect {
        address: String,
        #[source]
        source: io::Error,
    },

    /// Building the TLS connector failed.
    #[error("failed to build TLS connector")]
    Tls(#[source] native_tls::Error),

    /// A socket write failed.
    #[error("failed to write data to connection")]
    Write(#[source] io::Error),

    /// The connection attempt cap was exhausted.
    #[error("exceeded max connection attempts ({attempts})")]
    AttemptsExceeded { attempts: u64 },

    /// Encoding the payload failed.
    #[error(transparent)]
    Marshal(#[from] MarshalError),

    /// Outcome reported by the engine on a reply slot.
    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    /// The HTTP transport failed.
    #[error("failed to post http request")]
    Http(#[from] reqwest::Error),

    /// The HTTP server answered with a non-200 status.
    #[error("return code is not 200 (got {0})")]
    HttpStatus(u16),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::ErrorKind;

    #[test]
    fn test_error_display() {
        assert_eq!(ClientError::QueueFull.to_string(), "queue is full");
        assert_eq!(ClientError::Closed.to_string(), "client is closed");

        let err = ClientError::InvalidNetwork("udp".into());
        assert_eq!(err.to_string(), "invalid network type: udp");

        let err = ClientError::Connect {
            address: "127.0.0.1:24224".into(),
            source: io::Error::new(ErrorKind::ConnectionRefused, "refused"),
        };
        assert!(err.to_string().contains("127.0.0.1:24224"));

        let err = ClientError::AttemptsExceeded { attempts: 64 };
        assert!(err.to_string().contains("64"));

        let err = ClientError::HttpStatus(500);
        assert_eq!(err.to_string(), "return code is not 200 (got 500)");
    }

    #[test]
    fn test_delivery_error_is_transparent() {
        let err: ClientError = DeliveryError::BufferFull.into();
        assert_eq!(err.to_string(), "buffer is full");
    }
}
