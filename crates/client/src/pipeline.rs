//! The buffered forwarding engine.
//!
//! Two long-running tasks share the pending buffer:
//!
//! - The **reader** accepts messages from the incoming channel as fast as
//!   possible so producers never wait on I/O, encodes them, and appends the
//!   frames to the pending buffer. Every append attempt wakes the
//!   writer, the buffer-full path included. Pings are handled inline, out of
//!   band of the buffer.
//! - The **writer** sleeps until the unflushed length crosses the write
//!   threshold, keeps one connection alive (re-dialing with exponential
//!   backoff when the monitor invalidates it), and writes the whole pending
//!   slice per flush.
//!
//! Cancelling the root token starts the drain: the reader empties its
//! channels into the buffer and signals `reader_done`; the writer then
//! ignores cancellation for connecting and writing, bounded only by the
//! connection attempt cap, and exits once the buffer is empty, signalling
//! `done`.
//!
//! The wake-up is a `Notify` rather than a channel so the reader never
//! blocks signalling the writer. The writer re-creates the `notified()`
//! future before re-checking the pending length, so a wake between the
//! check and the await is never lost.

use std::sync::Arc;
use std::time::Duration;

use fluentd_protocol::{DeliveryError, Marshaler, Message, MessagePool};
use tokio::sync::{mpsc, Mutex, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use crate::buffer::PendingBuffer;
use crate::config::{Config, Network, TlsOptions};
use crate::metrics::PipelineMetrics;
use crate::transport::{self, Connection};

const BACKOFF_BASE: Duration = Duration::from_millis(100);
const BACKOFF_CAP: Duration = Duration::from_secs(3);

pub(crate) struct Pipeline {
    address: String,
    network: Network,
    dial_timeout: Duration,
    write_timeout: Duration,
    write_threshold: usize,
    max_conn_attempts: u64,
    tls: Option<TlsOptions>,
    marshaler: Arc<dyn Marshaler>,
    pool: Arc<MessagePool>,
    metrics: Arc<PipelineMetrics>,
    pending: Mutex<PendingBuffer>,
    wake: Notify,
    cancel: CancellationToken,
    reader_done: CancellationToken,
    done: CancellationToken,
}

impl Pipeline {
    /// Spawn the reader and writer tasks; returns the incoming and ping
    /// channel senders.
    pub(crate) fn spawn(
        config: &Config,
        marshaler: Arc<dyn Marshaler>,
        pool: Arc<MessagePool>,
        metrics: Arc<PipelineMetrics>,
        cancel: CancellationToken,
        done: CancellationToken,
    ) -> (mpsc::Sender<Message>, mpsc::Sender<Message>) {
        let (incoming_tx, incoming_rx) = mpsc::channel(config.write_queue_size);
        let (ping_tx, ping_rx) = mpsc::channel(1);

        let pipeline = Arc::new(Self {
            address: config.address.clone(),
            network: config.network,
            dial_timeout: config.dial_timeout,
            write_timeout: config.write_timeout,
            write_threshold: config.write_threshold,
            max_conn_attempts: config.max_conn_attempts,
            tls: config.tls.clone(),
            marshaler,
            pool,
            metrics,
            pending: Mutex::new(PendingBuffer::with_limit(config.buffer_limit)),
            wake: Notify::new(),
            cancel,
            reader_done: CancellationToken::new(),
            done,
        });

        tokio::spawn(Arc::clone(&pipeline).run_reader(incoming_rx, ping_rx));
        tokio::spawn(pipeline.run_writer());

        (incoming_tx, ping_tx)
    }

    fn draining(&self) -> bool {
        self.reader_done.is_cancelled()
    }

    async fn pending_len(&self) -> usize {
        self.pending.lock().await.len()
    }

    // =========================================================================
    // Reader
    // =========================================================================

    async fn run_reader(
        self: Arc<Self>,
        mut incoming: mpsc::Receiver<Message>,
        mut pings: mpsc::Receiver<Message>,
    ) {
        debug!("background reader started");

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                msg = incoming.recv() => match msg {
                    Some(msg) => self.append_message(msg).await,
                    None => break,
                },
                msg = pings.recv() => match msg {
                    Some(msg) => self.ping(msg).await,
                    None => break,
                },
            }
        }

        // Empty both channels into the buffer before handing it to the
        // writer for the final drain.
        while let Ok(msg) = pings.try_recv() {
            self.ping(msg).await;
        }
        while let Ok(msg) = incoming.try_recv() {
            self.append_message(msg).await;
        }

        self.reader_done.cancel();
        self.wake.notify_one();
        debug!("background reader exiting");
    }

    async fn append_message(&self, mut msg: Message) {
        let encoded = match self.marshaler.marshal(&msg) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(tag = %msg.tag, error = %e, "failed to marshal message, dropping");
                self.metrics.record_dropped();
                if let Some(reply) = msg.reply.take() {
                    let _ = reply.send(Err(e.into()));
                }
                self.pool.release(msg);
                return;
            }
        };

        let appended = {
            let mut pending = self.pending.lock().await;
            pending.append(&encoded)
        };

        if !appended {
            debug!(bytes = encoded.len(), "pending buffer is full, dropping message");
            self.metrics.record_buffer_full();
            if let Some(reply) = msg.reply.take() {
                let _ = reply.send(Err(DeliveryError::BufferFull));
            }
        }

        self.pool.release(msg);
        // Wake the writer even on the buffer-full path so it re-evaluates
        // during a drain.
        self.wake.notify_one();
    }

    // =========================================================================
    // Ping
    // =========================================================================

    /// One-shot delivery check: fresh connection, one frame, no reuse.
    async fn ping(&self, mut msg: Message) {
        let reply = msg.reply.take();
        let result = self.ping_once(&msg).await;
        if let Err(ref e) = result {
            warn!(tag = %msg.tag, error = %e, "ping failed");
        }
        if let Some(reply) = reply {
            let _ = reply.send(result);
        }
        self.pool.release(msg);
    }

    async fn ping_once(&self, msg: &Message) -> Result<(), DeliveryError> {
        let mut conn = transport::dial(
            self.network,
            &self.address,
            self.dial_timeout,
            self.tls.as_ref(),
        )
        .await
        .map_err(|e| DeliveryError::Connect(e.to_string()))?;

        let buf = self.marshaler.marshal(msg)?;
        conn.write_all(&buf, Some(self.write_timeout))
            .await
            .map_err(|e| DeliveryError::Write(e.to_string()))?;
        Ok(())
    }

    // =========================================================================
    // Writer
    // =========================================================================

    async fn run_writer(self: Arc<Self>) {
        debug!("background writer started");
        let mut conn: Option<Connection> = None;

        loop {
            self.wait_pending().await;

            if self.draining() && self.pending_len().await == 0 {
                break;
            }

            if conn.as_ref().is_some_and(|c| c.is_invalidated()) {
                debug!("connection invalidated by monitor, reconnecting");
                conn = None;
            }

            if conn.is_none() {
                conn = self.establish().await;
            }
            let Some(active) = conn.as_mut() else {
                // Drain-mode attempt cap exhausted.
                break;
            };

            if let Err(e) = self.flush(active).await {
                warn!(error = %e, "failed to write pending buffer, closing connection");
                self.metrics.record_write_error();
                conn = None;
            }

            if self.draining() && self.pending_len().await == 0 {
                break;
            }
        }

        drop(conn);
        self.done.cancel();
        debug!("background writer exiting");
    }

    /// Sleep until the unflushed length crosses the threshold or the drain
    /// begins.
    async fn wait_pending(&self) {
        loop {
            // Created before the re-check so a concurrent wake is kept.
            let notified = self.wake.notified();

            if self.pending_len().await > self.write_threshold {
                return;
            }
            if self.draining() {
                return;
            }
            if self.cancel.is_cancelled() {
                // Cancelled but the reader is still emptying its channels;
                // wait for its final wake instead of spinning.
                tokio::select! {
                    _ = notified => {}
                    _ = self.reader_done.cancelled() => {}
                }
                continue;
            }

            tokio::select! {
                _ = notified => {}
                _ = self.cancel.cancelled() => {}
            }
        }
    }

    /// Dial until connected.
    ///
    /// Normal operation retries forever; the buffer keeps absorbing posts
    /// meanwhile. Once the reader is done we are committed to the final
    /// flush: dials are no longer cancellable, but consecutive failures are
    /// capped, and exceeding the cap abandons the buffer (`None`).
    async fn establish(&self) -> Option<Connection> {
        let mut attempts: u64 = 0;
        let mut delay = BACKOFF_BASE;

        loop {
            match transport::dial(
                self.network,
                &self.address,
                self.dial_timeout,
                self.tls.as_ref(),
            )
            .await
            {
                Ok(conn) => {
                    debug!(address = %self.address, "connected to server");
                    self.metrics.record_connect();
                    return Some(conn);
                }
                Err(e) => {
                    if self.draining() {
                        attempts += 1;
                        if self.max_conn_attempts > 0 && attempts >= self.max_conn_attempts {
                            let lost = self.pending_len().await;
                            error!(
                                attempts,
                                lost_bytes = lost,
                                "could not connect while draining, abandoning buffer"
                            );
                            return None;
                        }
                    }

                    warn!(address = %self.address, error = %e, "failed to connect to server, backing off");
                    if self.draining() {
                        tokio::time::sleep(delay).await;
                    } else {
                        // Cut the sleep short when the drain begins so the
                        // attempt accounting starts promptly.
                        tokio::select! {
                            _ = tokio::time::sleep(delay) => {}
                            _ = self.reader_done.cancelled() => {}
                        }
                    }
                    delay = (delay * 2).min(BACKOFF_CAP);
                }
            }
        }
    }

    /// Write the whole pending slice, repeatedly, until the buffer is empty.
    ///
    /// The buffer lock is held across the write: producers stall on append
    /// for the duration of one socket write, never longer. No deadline
    /// applies while draining.
    async fn flush(&self, conn: &mut Connection) -> std::io::Result<()> {
        let deadline = if self.draining() {
            None
        } else {
            Some(self.write_timeout)
        };

        loop {
            let mut pending = self.pending.lock().await;
            let len = pending.len();
            if len == 0 {
                return Ok(());
            }

            conn.write_all(pending.unflushed(), deadline).await?;
            pending.consume(len);
            self.metrics.record_flushed(len as u64);
            trace!(bytes = len, "flushed pending buffer");
        }
    }
}
