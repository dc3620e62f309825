//! Client configuration.
//!
//! [`Config`] carries every recognized option with the defaults of a stock
//! fluentd deployment; the `with_*` builders override them piecemeal.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use fluentd_protocol::Marshaler;

use crate::error::ClientError;

/// Default server address.
pub const DEFAULT_ADDRESS: &str = "127.0.0.1:24224";

/// Default per-connect timeout.
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(3);

/// Default per-flush deadline.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(3);

/// Default cap on buffered bytes.
pub const DEFAULT_BUFFER_LIMIT: usize = 8 * 1024 * 1024;

/// Default byte count that wakes the writer.
pub const DEFAULT_WRITE_THRESHOLD: usize = 8 * 1024;

/// Default incoming channel capacity.
pub const DEFAULT_WRITE_QUEUE_SIZE: usize = 6;

/// Default cap on consecutive dial failures while draining.
pub const DEFAULT_MAX_CONN_ATTEMPTS: u64 = 64;

/// Default record count per bundled HTTP post.
pub const DEFAULT_MAX_HTTP_PACKAGE_SIZE: usize = 10;

/// Default per-message HTTP retry cap.
pub const DEFAULT_HTTP_RETRIES: u32 = 5;

/// Transport family for the socket methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Tcp,
    Unix,
}

impl FromStr for Network {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tcp" => Ok(Self::Tcp),
            "unix" => Ok(Self::Unix),
            other => Err(ClientError::InvalidNetwork(other.to_string())),
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp => f.write_str("tcp"),
            Self::Unix => f.write_str("unix"),
        }
    }
}

/// Delivery method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Forward protocol over a persistent socket.
    Forward,
    /// Per-tag JSON posts over HTTP.
    Http,
}

/// TLS settings for the socket transports.
#[derive(Debug, Clone, Default)]
pub struct TlsOptions {
    /// Domain presented during the handshake; defaults to the host part of
    /// the address.
    pub domain: Option<String>,

    /// Skip certificate validation (intended for tests).
    pub insecure_skip_verify: bool,
}

impl TlsOptions {
    pub(crate) fn connector(&self) -> Result<native_tls::TlsConnector, native_tls::Error> {
        let mut builder = native_tls::TlsConnector::builder();
        if self.insecure_skip_verify {
            builder.danger_accept_invalid_certs(true);
            builder.danger_accept_invalid_hostnames(true);
        }
        builder.build()
    }
}

/// Client configuration.
#[derive(Clone)]
pub struct Config {
    /// Target `host:port`, a socket path for unix networks, or the URL
    /// prefix in HTTP mode.
    pub address: String,

    /// Socket transport family.
    pub network: Network,

    /// Per-connect timeout.
    pub dial_timeout: Duration,

    /// Per-flush deadline; not applied while draining.
    pub write_timeout: Duration,

    /// Max bytes held in the pending buffer.
    pub buffer_limit: usize,

    /// Bytes that must accumulate before the writer wakes.
    pub write_threshold: usize,

    /// Incoming channel capacity.
    pub write_queue_size: usize,

    /// Cap on consecutive dial failures during drain (0 = unbounded).
    pub max_conn_attempts: u64,

    /// Framing override; the method default is used when unset.
    pub marshaler: Option<Arc<dyn Marshaler>>,

    /// Prefix prepended to every tag with a `.` separator.
    pub tag_prefix: Option<String>,

    /// Serialize nanosecond timestamps.
    pub subsecond: bool,

    /// TLS settings; plain sockets when unset.
    pub tls: Option<TlsOptions>,

    /// Delivery method.
    pub method: Method,

    /// HTTP channel admission count.
    pub max_http_buffered: usize,

    /// Records per bundled HTTP post.
    pub max_http_package_size: usize,

    /// Gzip HTTP bodies.
    pub http_package_gzip: bool,

    /// Per-message HTTP retry cap.
    pub http_retries: u32,

    /// Eagerly dial once during construction.
    pub connect_on_start: bool,
}

impl Config {
    /// Create a configuration targeting `address` with stock defaults.
    pub fn new(address: impl Into<String>) -> Self {
        let buffer_limit = DEFAULT_BUFFER_LIMIT;
        Self {
            address: address.into(),
            network: Network::Tcp,
            dial_timeout: DEFAULT_DIAL_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            buffer_limit,
            write_threshold: DEFAULT_WRITE_THRESHOLD,
            write_queue_size: DEFAULT_WRITE_QUEUE_SIZE,
            max_conn_attempts: DEFAULT_MAX_CONN_ATTEMPTS,
            marshaler: None,
            tag_prefix: None,
            subsecond: false,
            tls: None,
            method: Method::Forward,
            max_http_buffered: buffer_limit / 1024,
            max_http_package_size: DEFAULT_MAX_HTTP_PACKAGE_SIZE,
            http_package_gzip: false,
            http_retries: DEFAULT_HTTP_RETRIES,
            connect_on_start: false,
        }
    }

    /// Set the socket transport family.
    #[must_use]
    pub fn with_network(mut self, network: Network) -> Self {
        self.network = network;
        self
    }

    /// Set the per-connect timeout.
    #[must_use]
    pub fn with_dial_timeout(mut self, timeout: Duration) -> Self {
        self.dial_timeout = timeout;
        self
    }

    /// Set the per-flush deadline.
    #[must_use]
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Set the pending buffer cap.
    #[must_use]
    pub fn with_buffer_limit(mut self, limit: usize) -> Self {
        self.buffer_limit = limit;
        self
    }

    /// Set the writer wake threshold.
    #[must_use]
    pub fn with_write_threshold(mut self, threshold: usize) -> Self {
        self.write_threshold = threshold;
        self
    }

    /// Set the incoming channel capacity.
    #[must_use]
    pub fn with_write_queue_size(mut self, size: usize) -> Self {
        self.write_queue_size = size.max(1);
        self
    }

    /// Set the drain-mode connection attempt cap.
    #[must_use]
    pub fn with_max_conn_attempts(mut self, attempts: u64) -> Self {
        self.max_conn_attempts = attempts;
        self
    }

    /// Inject a custom framing.
    #[must_use]
    pub fn with_marshaler(mut self, marshaler: Arc<dyn Marshaler>) -> Self {
        self.marshaler = Some(marshaler);
        self
    }

    /// Set the tag prefix.
    #[must_use]
    pub fn with_tag_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.tag_prefix = Some(prefix.into());
        self
    }

    /// Enable nanosecond timestamps.
    #[must_use]
    pub fn with_subsecond(mut self, subsecond: bool) -> Self {
        self.subsecond = subsecond;
        self
    }

    /// Enable TLS.
    #[must_use]
    pub fn with_tls(mut self, tls: TlsOptions) -> Self {
        self.tls = Some(tls);
        self
    }

    /// Set the delivery method.
    #[must_use]
    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Set the HTTP channel admission count.
    #[must_use]
    pub fn with_max_http_buffered(mut self, count: usize) -> Self {
        self.max_http_buffered = count.max(1);
        self
    }

    /// Set the records-per-post bundling cap.
    #[must_use]
    pub fn with_max_http_package_size(mut self, size: usize) -> Self {
        self.max_http_package_size = size.max(1);
        self
    }

    /// Gzip HTTP bodies.
    #[must_use]
    pub fn with_http_package_gzip(mut self, gzip: bool) -> Self {
        self.http_package_gzip = gzip;
        self
    }

    /// Set the per-message HTTP retry cap.
    #[must_use]
    pub fn with_http_retries(mut self, retries: u32) -> Self {
        self.http_retries = retries;
        self
    }

    /// Dial once during construction, failing fast on an unreachable server.
    #[must_use]
    pub fn with_connect_on_start(mut self, connect: bool) -> Self {
        self.connect_on_start = connect;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(DEFAULT_ADDRESS)
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;
