//! Synchronous, pipeline-less client.
//!
//! [`Unbuffered`] skips the background engine entirely: `post` serializes
//! inline and writes the whole frame before returning, caching one
//! connection across calls. Useful when the caller wants delivery errors
//! on the calling path instead of fire-and-forget.

use std::io;
use std::time::{Duration, SystemTime};

use fluentd_protocol::{MarshalError, Marshaler, Message, MessagePool};
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::client::{marshaler_for, write_tag};
use crate::config::{Config, Method, Network, TlsOptions};
use crate::error::ClientError;
use crate::transport::{self, Connection};

const HTTP_TIMEOUT: Duration = Duration::from_secs(5);

enum Mode {
    Forward,
    Http(reqwest::Client),
}

/// Client that posts synchronously over one cached connection.
impl std::fmt::Debug for Unbuffered {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Unbuffered")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

pub struct Unbuffered {
    address: String,
    network: Network,
    dial_timeout: Duration,
    write_timeout: Duration,
    max_conn_attempts: u64,
    marshaler: Arc<dyn Marshaler>,
    tag_prefix: Option<String>,
    subsecond: bool,
    tls: Option<TlsOptions>,
    mode: Mode,
    pool: Arc<MessagePool>,
    conn: Mutex<Option<Connection>>,
}

impl Unbuffered {
    /// Build an unbuffered client.
    ///
    /// With `connect_on_start` set, the connection is dialed here and
    /// cached; an unreachable server fails construction.
    pub async fn new(config: Config) -> Result<Self, ClientError> {
        let marshaler = marshaler_for(&config);
        let mode = match config.method {
            Method::Forward => Mode::Forward,
            Method::Http => {
                Mode::Http(reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?)
            }
        };

        let client = Self {
            address: config.address,
            network: config.network,
            dial_timeout: config.dial_timeout,
            write_timeout: config.write_timeout,
            max_conn_attempts: config.max_conn_attempts,
            marshaler,
            tag_prefix: config.tag_prefix,
            subsecond: config.subsecond,
            tls: config.tls,
            mode,
            pool: Arc::new(MessagePool::default()),
            conn: Mutex::new(None),
        };

        if config.connect_on_start {
            if let Mode::Forward = client.mode {
                let conn = transport::dial(
                    client.network,
                    &client.address,
                    client.dial_timeout,
                    client.tls.as_ref(),
                )
                .await?;
                *client.conn.lock().await = Some(conn);
            }
        }

        Ok(client)
    }

    /// Serialize and deliver one record, blocking until it is written.
    pub async fn post<T: Serialize>(&self, tag: &str, record: T) -> Result<(), ClientError> {
        self.post_at(tag, record, SystemTime::now()).await
    }

    /// Like [`post`](Self::post) with an explicit timestamp.
    pub async fn post_at<T: Serialize>(
        &self,
        tag: &str,
        record: T,
        timestamp: SystemTime,
    ) -> Result<(), ClientError> {
        let value = serde_json::to_value(record)
            .map_err(|e| ClientError::Marshal(MarshalError::Json(e)))?;

        let mut msg = self.pool.acquire();
        write_tag(&mut msg.tag, self.tag_prefix.as_deref(), tag);
        msg.record = value;
        msg.timestamp = timestamp;
        msg.subsecond = self.subsecond;

        let result = match &self.mode {
            Mode::Forward => self.write_message(&msg).await,
            Mode::Http(http) => self.http_post(http, &msg).await,
        };
        self.pool.release(msg);
        result
    }

    /// Delivery check; for an unbuffered client this is the same as a post.
    pub async fn ping<T: Serialize>(&self, tag: &str, record: T) -> Result<(), ClientError> {
        self.post(tag, record).await
    }

    /// Close the cached connection, if any.
    pub async fn close(&self) {
        self.conn.lock().await.take();
    }

    /// There is never a pending buffer to drain; closing is all shutdown
    /// has to do.
    pub async fn shutdown(&self) {
        self.close().await;
    }

    /// Write the serialized frame over the cached connection, reconnecting
    /// on EOF-like failures.
    ///
    /// The attempt cap counts every pass through the connect/write
    /// sequence, the first one included.
    async fn write_message(&self, msg: &Message) -> Result<(), ClientError> {
        let payload = self.marshaler.marshal(msg)?;

        let mut attempt: u64 = 0;
        let mut force = false;
        loop {
            attempt += 1;
            if self.max_conn_attempts > 0 && attempt > self.max_conn_attempts {
                return Err(ClientError::AttemptsExceeded {
                    attempts: self.max_conn_attempts,
                });
            }

            let mut guard = self.conn.lock().await;
            let needs_dial = match guard.as_ref() {
                Some(conn) => force || conn.is_invalidated(),
                None => true,
            };
            if needs_dial {
                guard.take();
                match transport::dial(
                    self.network,
                    &self.address,
                    self.dial_timeout,
                    self.tls.as_ref(),
                )
                .await
                {
                    Ok(conn) => *guard = Some(conn),
                    Err(e) => {
                        warn!(address = %self.address, error = %e, "failed to connect, retrying");
                        force = true;
                        continue;
                    }
                }
            }
            let Some(conn) = guard.as_mut() else {
                continue;
            };

            match conn.write_all(&payload, Some(self.write_timeout)).await {
                Ok(()) => return Ok(()),
                Err(e) if is_retryable(&e) => {
                    debug!(error = %e, "connection went away mid-write, retrying");
                    guard.take();
                    force = true;
                }
                Err(e) => {
                    guard.take();
                    return Err(ClientError::Write(e));
                }
            }
        }
    }

    async fn http_post(
        &self,
        http: &reqwest::Client,
        msg: &Message,
    ) -> Result<(), ClientError> {
        let body = self.marshaler.marshal(msg)?;
        let url = format!("{}/{}", self.address, msg.tag);

        let response = http
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;
        if response.status() != StatusCode::OK {
            return Err(ClientError::HttpStatus(response.status().as_u16()));
        }
        Ok(())
    }
}

fn is_retryable(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::UnexpectedEof
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
    )
}
