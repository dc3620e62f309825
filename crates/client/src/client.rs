//! The buffered client: producer API over the background engine.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use fluentd_protocol::{
    JsonMarshaler, MarshalError, Marshaler, Message, MessagePool, MsgpackMarshaler,
};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::config::{Config, Method};
use crate::error::ClientError;
use crate::http::HttpDispatcher;
use crate::metrics::{MetricsSnapshot, PipelineMetrics};
use crate::pipeline::Pipeline;
use crate::transport;

enum Engine {
    Forward {
        incoming: mpsc::Sender<Message>,
        pings: mpsc::Sender<Message>,
    },
    Http {
        messages: mpsc::Sender<Message>,
    },
}

/// Asynchronous forwarding client.
///
/// `post` hands the record to a background engine and returns immediately;
/// delivery is not acknowledged. [`shutdown`](Self::shutdown) drains
/// whatever is still buffered before returning.
impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("tag_prefix", &self.tag_prefix)
            .finish_non_exhaustive()
    }
}

pub struct Client {
    engine: Engine,
    pool: Arc<MessagePool>,
    metrics: Arc<PipelineMetrics>,
    cancel: CancellationToken,
    done: CancellationToken,
    tag_prefix: Option<String>,
    subsecond: bool,
}

impl Client {
    /// Validate the configuration and spawn the engine.
    ///
    /// With `connect_on_start` set, the server is dialed once here and an
    /// unreachable server fails construction; the engine still dials its
    /// own connection on first use.
    pub async fn new(config: Config) -> Result<Self, ClientError> {
        let pool = Arc::new(MessagePool::default());
        let metrics = Arc::new(PipelineMetrics::new());
        let cancel = CancellationToken::new();
        let done = CancellationToken::new();
        let marshaler = marshaler_for(&config);

        if config.connect_on_start && config.method == Method::Forward {
            transport::dial(
                config.network,
                &config.address,
                config.dial_timeout,
                config.tls.as_ref(),
            )
            .await?;
        }

        let engine = match config.method {
            Method::Forward => {
                let (incoming, pings) = Pipeline::spawn(
                    &config,
                    marshaler,
                    Arc::clone(&pool),
                    Arc::clone(&metrics),
                    cancel.clone(),
                    done.clone(),
                );
                Engine::Forward { incoming, pings }
            }
            Method::Http => {
                let messages = HttpDispatcher::spawn(
                    &config,
                    marshaler,
                    Arc::clone(&pool),
                    Arc::clone(&metrics),
                    cancel.clone(),
                    done.clone(),
                )?;
                Engine::Http { messages }
            }
        };

        Ok(Self {
            engine,
            pool,
            metrics,
            cancel,
            done,
            tag_prefix: config.tag_prefix,
            subsecond: config.subsecond,
        })
    }

    /// Enqueue one record for delivery, stamped with the current time.
    ///
    /// Fails fast: a full queue returns [`ClientError::QueueFull`] and a
    /// shut-down client [`ClientError::Closed`]; the call never blocks
    /// beyond the one send attempt.
    pub fn post<T: Serialize>(&self, tag: &str, record: T) -> Result<(), ClientError> {
        self.enqueue(tag, record, None)
    }

    /// Like [`post`](Self::post) with an explicit timestamp.
    pub fn post_at<T: Serialize>(
        &self,
        tag: &str,
        record: T,
        timestamp: SystemTime,
    ) -> Result<(), ClientError> {
        self.enqueue(tag, record, Some(timestamp))
    }

    fn enqueue<T: Serialize>(
        &self,
        tag: &str,
        record: T,
        timestamp: Option<SystemTime>,
    ) -> Result<(), ClientError> {
        if self.cancel.is_cancelled() {
            return Err(ClientError::Closed);
        }

        let value = serde_json::to_value(record)
            .map_err(|e| ClientError::Marshal(MarshalError::Json(e)))?;

        let mut msg = self.pool.acquire();
        write_tag(&mut msg.tag, self.tag_prefix.as_deref(), tag);
        msg.record = value;
        msg.timestamp = timestamp.unwrap_or_else(SystemTime::now);
        msg.subsecond = self.subsecond;

        let sender = match &self.engine {
            Engine::Forward { incoming, .. } => incoming,
            Engine::Http { messages } => messages,
        };
        match sender.try_send(msg) {
            Ok(()) => {
                self.metrics.record_posted();
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(msg)) => {
                self.pool.release(msg);
                Err(ClientError::QueueFull)
            }
            Err(mpsc::error::TrySendError::Closed(msg)) => {
                self.pool.release(msg);
                Err(ClientError::Closed)
            }
        }
    }

    /// Deliver one record synchronously and report the outcome.
    ///
    /// In forward mode this dials a fresh connection, writes the single
    /// frame and closes it; in HTTP mode the record takes the normal posting
    /// path with a waiting reply slot.
    pub async fn ping<T: Serialize>(&self, tag: &str, record: T) -> Result<(), ClientError> {
        if self.cancel.is_cancelled() {
            return Err(ClientError::Closed);
        }

        let value = serde_json::to_value(record)
            .map_err(|e| ClientError::Marshal(MarshalError::Json(e)))?;

        let (reply_tx, reply_rx) = oneshot::channel();
        let mut msg = self.pool.acquire();
        write_tag(&mut msg.tag, self.tag_prefix.as_deref(), tag);
        msg.record = value;
        msg.timestamp = SystemTime::now();
        msg.subsecond = self.subsecond;
        msg.reply = Some(reply_tx);

        let sender = match &self.engine {
            Engine::Forward { pings, .. } => pings,
            Engine::Http { messages } => messages,
        };
        if let Err(e) = sender.send(msg).await {
            self.pool.release(e.0);
            return Err(ClientError::Closed);
        }

        match reply_rx.await {
            Ok(result) => result.map_err(ClientError::from),
            // Released without an outcome: the engine shut down under us.
            Err(_) => Err(ClientError::Closed),
        }
    }

    /// Drain and stop the engine.
    ///
    /// Idempotent; a second call returns immediately. Returns once the
    /// engine task has terminated; buffered bytes are flushed first,
    /// bounded by the connection attempt cap.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.done.cancelled().await;
    }

    /// [`shutdown`](Self::shutdown) bounded by `timeout`; `false` when the
    /// drain did not finish in time (it keeps running in the background).
    pub async fn shutdown_timeout(&self, timeout: Duration) -> bool {
        self.cancel.cancel();
        tokio::time::timeout(timeout, self.done.cancelled())
            .await
            .is_ok()
    }

    /// Point-in-time engine counters.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        // A client dropped without an explicit shutdown still stops its
        // engine; the detached tasks run the usual drain on their own.
        self.cancel.cancel();
    }
}

/// Resolve the framing for a configuration.
///
/// HTTP mode carries the tag in the URL and always sends raw-JSON bodies,
/// overriding any injected marshaler.
pub(crate) fn marshaler_for(config: &Config) -> Arc<dyn Marshaler> {
    match config.method {
        Method::Http => Arc::new(JsonMarshaler),
        Method::Forward => config
            .marshaler
            .clone()
            .unwrap_or_else(|| Arc::new(MsgpackMarshaler)),
    }
}

/// Write the optionally-prefixed tag into a recycled buffer.
pub(crate) fn write_tag(dst: &mut String, prefix: Option<&str>, tag: &str) {
    if let Some(prefix) = prefix {
        dst.push_str(prefix);
        dst.push('.');
    }
    dst.push_str(tag);
}
