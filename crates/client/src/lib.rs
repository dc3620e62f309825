//! Asynchronous client for the Fluentd family of log-aggregation servers.
//!
//! The default [`Client`] is a buffered producer/consumer pipeline: `post`
//! hands a tagged record to a background reader, which encodes it with the
//! Forward-protocol MessagePack framing and appends it to a bounded pending
//! buffer; a background writer flushes the buffer over a persistent TCP,
//! TLS or unix socket with reconnection and exponential backoff. Shutdown
//! drains the buffer before returning.
//!
//! # Quick start
//!
//! ```no_run
//! use fluentd_client::{Client, Config};
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), fluentd_client::ClientError> {
//! let client = Client::new(Config::new("127.0.0.1:24224")).await?;
//!
//! client.post("app.log", json!({"message": "hello"}))?;
//!
//! // Flush whatever is still buffered, then stop the engine.
//! client.shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! # Delivery modes
//!
//! - **Forward** (default): MessagePack `[tag, time, record]` frames over a
//!   persistent socket.
//! - **HTTP** ([`Method::Http`]): records are coalesced per tag and posted
//!   as JSON arrays to `{address}/{tag}`, optionally gzipped.
//!
//! # Variants
//!
//! - [`Client::ping`] - synchronous one-shot delivery check.
//! - [`Unbuffered`] - no pipeline at all; `post` writes inline over a
//!   cached connection and surfaces delivery errors to the caller.
//!
//! # Delivery guarantees
//!
//! Posting is fire-and-forget: a full incoming queue fails fast with
//! [`ClientError::QueueFull`] rather than blocking, and records that cannot
//! be buffered (the pending buffer is at its limit) or delivered before the
//! retry caps are exhausted are dropped with a log line. The wire protocol
//! itself carries no acknowledgements.

mod buffer;
mod client;
mod config;
mod error;
mod http;
mod metrics;
mod pipeline;
mod transport;
mod unbuffered;

pub use client::Client;
pub use config::{
    Config, Method, Network, TlsOptions, DEFAULT_ADDRESS, DEFAULT_BUFFER_LIMIT,
    DEFAULT_DIAL_TIMEOUT, DEFAULT_HTTP_RETRIES, DEFAULT_MAX_CONN_ATTEMPTS,
    DEFAULT_MAX_HTTP_PACKAGE_SIZE, DEFAULT_WRITE_QUEUE_SIZE, DEFAULT_WRITE_THRESHOLD,
    DEFAULT_WRITE_TIMEOUT,
};
pub use error::ClientError;
pub use metrics::{MetricsSnapshot, PipelineMetrics};
pub use unbuffered::Unbuffered;

// Re-export the wire layer so callers can inject marshalers without
// depending on the protocol crate directly.
pub use fluentd_protocol::{
    DeliveryError, EventTime, JsonMarshaler, MarshalError, Marshaler, Message, MsgpackMarshaler,
};
