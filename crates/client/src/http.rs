//! HTTP delivery: the coalescing dispatcher.
//!
//! In HTTP mode the engine runs a single dispatcher task instead of the
//! reader/writer pair. Messages enter a bounded channel; the dispatcher
//! pulls one, then opportunistically drains whatever else is already queued
//! into tag-keyed bundles so rapid posters are coalesced into one request
//! per tag. A bundle that reaches the package-size cap is posted on the
//! spot and restarted with the incoming message.
//!
//! Each bundle is folded into a single message whose record is the
//! concatenation of the member records (members that are themselves
//! combined arrays flatten element-wise), then posted as JSON, optionally
//! gzipped, to `{address}/{tag}`. Only HTTP 200 counts as success; failed
//! messages re-enter the channel with a bumped retry counter and are
//! dropped past the cap or when the channel is full.

use std::collections::HashMap;
use std::io::Write as _;
use std::sync::Arc;
use std::time::Duration;

use flate2::write::GzEncoder;
use flate2::Compression;
use fluentd_protocol::{DeliveryError, Marshaler, Message, MessagePool};
use reqwest::header::{CONTENT_ENCODING, CONTENT_TYPE};
use reqwest::StatusCode;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::config::Config;
use crate::error::ClientError;
use crate::metrics::PipelineMetrics;

const HTTP_TIMEOUT: Duration = Duration::from_secs(5);

/// Same-tag messages awaiting a shared post: the head plus spliced
/// siblings, with a running record count.
pub(crate) struct Bundle {
    head: Message,
    rest: Vec<Message>,
    count: usize,
}

impl Bundle {
    fn single(msg: Message) -> Self {
        Self {
            count: msg.count,
            head: msg,
            rest: Vec::new(),
        }
    }

    fn push(&mut self, msg: Message) {
        self.count += msg.count;
        self.rest.push(msg);
    }
}

/// Fold a bundle into one message whose record is the concatenated
/// sequence of the member records. Already-combined members flatten
/// element-wise rather than nesting. Spliced envelopes are released.
pub(crate) fn combine(pool: &MessagePool, bundle: Bundle) -> Message {
    let Bundle {
        mut head,
        rest,
        count,
    } = bundle;
    if rest.is_empty() {
        return head;
    }

    let mut records: Vec<Value> = Vec::with_capacity(count);
    push_records(&mut records, &mut head);
    for mut msg in rest {
        push_records(&mut records, &mut msg);
        pool.release(msg);
    }

    head.count = records.len();
    head.record = Value::Array(records);
    head.combined = true;
    head
}

fn push_records(records: &mut Vec<Value>, msg: &mut Message) {
    let record = std::mem::replace(&mut msg.record, Value::Null);
    match record {
        Value::Array(items) if msg.combined => records.extend(items),
        other => records.push(other),
    }
}

pub(crate) struct HttpDispatcher {
    address: String,
    marshaler: Arc<dyn Marshaler>,
    http: reqwest::Client,
    rx: mpsc::Receiver<Message>,
    tx: mpsc::Sender<Message>,
    pool: Arc<MessagePool>,
    metrics: Arc<PipelineMetrics>,
    cancel: CancellationToken,
    done: CancellationToken,
    max_package_size: usize,
    gzip: bool,
    retry_cap: u32,
}

impl HttpDispatcher {
    /// Spawn the dispatcher task; returns the message channel sender.
    pub(crate) fn spawn(
        config: &Config,
        marshaler: Arc<dyn Marshaler>,
        pool: Arc<MessagePool>,
        metrics: Arc<PipelineMetrics>,
        cancel: CancellationToken,
        done: CancellationToken,
    ) -> Result<mpsc::Sender<Message>, ClientError> {
        let (tx, rx) = mpsc::channel(config.max_http_buffered);
        let http = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;

        let dispatcher = Self {
            address: config.address.clone(),
            marshaler,
            http,
            rx,
            tx: tx.clone(),
            pool,
            metrics,
            cancel,
            done,
            max_package_size: config.max_http_package_size,
            gzip: config.http_package_gzip,
            retry_cap: config.http_retries,
        };
        tokio::spawn(dispatcher.run());

        Ok(tx)
    }

    async fn run(mut self) {
        debug!("http dispatcher started");

        loop {
            let msg = tokio::select! {
                _ = self.cancel.cancelled() => break,
                msg = self.rx.recv() => match msg {
                    Some(msg) => msg,
                    None => break,
                },
            };
            self.dispatch(msg).await;
        }

        // Final pass over whatever is still queued; requeued failures
        // re-enter the channel and stop once past the retry cap.
        while let Ok(msg) = self.rx.try_recv() {
            self.dispatch(msg).await;
        }

        self.done.cancel();
        debug!("http dispatcher exiting");
    }

    /// Coalesce the received message with everything already queued, then
    /// post the bundles.
    async fn dispatch(&mut self, msg: Message) {
        if msg.count >= self.max_package_size {
            self.post_message(msg).await;
            return;
        }

        let mut bundles: HashMap<String, Bundle> = HashMap::new();
        bundles.insert(msg.tag.clone(), Bundle::single(msg));

        while let Ok(next) = self.rx.try_recv() {
            if let Some(bundle) = bundles.get_mut(&next.tag) {
                if bundle.count + next.count > self.max_package_size {
                    // Bundle is full: post it now and restart with the
                    // incoming message.
                    let full = std::mem::replace(bundle, Bundle::single(next));
                    let combined = combine(&self.pool, full);
                    self.post_message(combined).await;
                } else {
                    bundle.push(next);
                }
            } else {
                bundles.insert(next.tag.clone(), Bundle::single(next));
            }
        }

        for (_, bundle) in bundles {
            let combined = combine(&self.pool, bundle);
            self.post_message(combined).await;
        }
    }

    /// Post one (possibly combined) message, requeueing on failure.
    async fn post_message(&self, mut msg: Message) {
        match self.try_post(&msg).await {
            Ok(bytes) => {
                trace!(tag = %msg.tag, records = msg.count, bytes, "posted http message");
                self.metrics.record_flushed(bytes as u64);
                if let Some(reply) = msg.reply.take() {
                    let _ = reply.send(Ok(()));
                }
                self.pool.release(msg);
            }
            Err(e) => {
                warn!(tag = %msg.tag, retries = msg.retries, error = %e, "failed to post http message");
                self.metrics.record_write_error();
                if let Some(reply) = msg.reply.take() {
                    let _ = reply.send(Err(e));
                }

                if msg.retries > self.retry_cap {
                    debug!(tag = %msg.tag, "message retried too many times, dropping");
                    self.metrics.record_dropped();
                    self.pool.release(msg);
                    return;
                }

                msg.retries += 1;
                if let Err(send_err) = self.tx.try_send(msg) {
                    debug!("http queue is full, dropping message");
                    self.metrics.record_dropped();
                    let msg = match send_err {
                        mpsc::error::TrySendError::Full(msg)
                        | mpsc::error::TrySendError::Closed(msg) => msg,
                    };
                    self.pool.release(msg);
                }
            }
        }
    }

    async fn try_post(&self, msg: &Message) -> Result<usize, DeliveryError> {
        let body = self.marshaler.marshal(msg)?;
        let len = body.len();
        let url = format!("{}/{}", self.address, msg.tag);

        let request = if self.gzip {
            let compressed =
                gzip_body(&body).map_err(|e| DeliveryError::Http(e.to_string()))?;
            self.http
                .post(&url)
                .header(CONTENT_TYPE, "application/json")
                .header(CONTENT_ENCODING, "gzip")
                .body(compressed)
        } else {
            self.http
                .post(&url)
                .header(CONTENT_TYPE, "application/json")
                .body(body)
        };

        let response = request
            .send()
            .await
            .map_err(|e| DeliveryError::Http(e.to_string()))?;
        if response.status() != StatusCode::OK {
            return Err(DeliveryError::HttpStatus(response.status().as_u16()));
        }

        Ok(len)
    }
}

fn gzip_body(body: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(body)?;
    encoder.finish()
}

#[cfg(test)]
#[path = "http_test.rs"]
mod http_test;
