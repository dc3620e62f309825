//! Message envelope and recycling pool.
//!
//! Every post produces a [`Message`]; the engine releases it back to the
//! [`MessagePool`] once the record has been buffered, delivered, or dropped.
//! Recycling keeps the tag `String` capacity alive across posts so the hot
//! path does not allocate per record.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use crossbeam::queue::ArrayQueue;
use serde_json::Value;
use tokio::sync::oneshot;

use crate::error::DeliveryError;

/// Reply slot armed on messages whose producer waits for the outcome.
///
/// Exactly one value is sent on an armed slot; dropping the sender without
/// sending signals that the engine released the envelope without an outcome.
pub type ReplySlot = oneshot::Sender<Result<(), DeliveryError>>;

/// Record envelope flowing through the forwarding engine.
#[derive(Debug)]
pub struct Message {
    /// Non-empty routing tag; carries the configured prefix by the time the
    /// marshaler sees it.
    pub tag: String,

    /// Opaque user payload.
    pub record: Value,

    /// Wall-clock timestamp of the record.
    pub timestamp: SystemTime,

    /// Serialize the nanosecond portion as an `EventTime` extension.
    pub subsecond: bool,

    /// Single-shot reply slot for the synchronous variants.
    pub reply: Option<ReplySlot>,

    /// Number of coalesced records (>= 1).
    pub count: usize,

    /// Whether `record` has been fused into an array of sibling records.
    pub combined: bool,

    /// HTTP retry counter.
    pub retries: u32,
}

impl Message {
    fn empty() -> Self {
        Self {
            tag: String::new(),
            record: Value::Null,
            timestamp: SystemTime::UNIX_EPOCH,
            subsecond: false,
            reply: None,
            count: 1,
            combined: false,
            retries: 0,
        }
    }

    /// Reset every field to its post-construction state.
    ///
    /// Dropping an armed reply slot closes the channel, which is how a
    /// waiting receiver observes a release without an outcome.
    fn clear(&mut self) {
        self.tag.clear();
        self.record = Value::Null;
        self.timestamp = SystemTime::UNIX_EPOCH;
        self.subsecond = false;
        self.reply = None;
        self.count = 1;
        self.combined = false;
        self.retries = 0;
    }
}

/// Default number of envelopes the pool retains.
pub const DEFAULT_POOL_CAPACITY: usize = 256;

/// Lock-free pool of reusable [`Message`] envelopes.
pub struct MessagePool {
    queue: ArrayQueue<Message>,
    metrics: PoolMetrics,
}

/// Counters for pool monitoring.
#[derive(Debug, Default)]
pub struct PoolMetrics {
    /// Envelopes served from the pool.
    pub hits: AtomicU64,

    /// Envelopes allocated because the pool was empty.
    pub misses: AtomicU64,

    /// Envelopes returned to the pool.
    pub returns: AtomicU64,

    /// Envelopes dropped because the pool was full.
    pub drops: AtomicU64,
}

impl PoolMetrics {
    const fn new() -> Self {
        Self {
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            returns: AtomicU64::new(0),
            drops: AtomicU64::new(0),
        }
    }

    /// Copy the counters.
    pub fn snapshot(&self) -> PoolSnapshot {
        PoolSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            returns: self.returns.load(Ordering::Relaxed),
            drops: self.drops.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`PoolMetrics`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PoolSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub returns: u64,
    pub drops: u64,
}

impl MessagePool {
    /// Create a pool retaining at most `capacity` envelopes.
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: ArrayQueue::new(capacity.max(1)),
            metrics: PoolMetrics::new(),
        }
    }

    /// Take a cleared envelope, recycling one when available.
    #[inline]
    pub fn acquire(&self) -> Message {
        match self.queue.pop() {
            Some(msg) => {
                self.metrics.hits.fetch_add(1, Ordering::Relaxed);
                msg
            }
            None => {
                self.metrics.misses.fetch_add(1, Ordering::Relaxed);
                Message::empty()
            }
        }
    }

    /// Return an envelope to the pool.
    ///
    /// The envelope is cleared first; a still-armed reply slot is dropped,
    /// closing the channel. A full pool drops the envelope.
    #[inline]
    pub fn release(&self, mut msg: Message) {
        msg.clear();
        match self.queue.push(msg) {
            Ok(()) => {
                self.metrics.returns.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                self.metrics.drops.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Envelopes currently available for reuse.
    #[inline]
    pub fn available(&self) -> usize {
        self.queue.len()
    }

    /// Counter block for this pool.
    #[inline]
    pub fn metrics(&self) -> &PoolMetrics {
        &self.metrics
    }
}

impl Default for MessagePool {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_CAPACITY)
    }
}

#[cfg(test)]
#[path = "message_test.rs"]
mod message_test;
