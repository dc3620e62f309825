//! Engine counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters maintained by the forwarding engine.
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    /// Messages accepted into the engine.
    pub posted: AtomicU64,

    /// Messages dropped (marshal failures, retry exhaustion, full queues).
    pub dropped: AtomicU64,

    /// Messages rejected because the pending buffer was full.
    pub buffer_full: AtomicU64,

    /// Bytes written to the server.
    pub bytes_flushed: AtomicU64,

    /// Connections established.
    pub connects: AtomicU64,

    /// Flushes that failed and forced a reconnect.
    pub write_errors: AtomicU64,
}

impl PipelineMetrics {
    pub const fn new() -> Self {
        Self {
            posted: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            buffer_full: AtomicU64::new(0),
            bytes_flushed: AtomicU64::new(0),
            connects: AtomicU64::new(0),
            write_errors: AtomicU64::new(0),
        }
    }

    #[inline]
    pub(crate) fn record_posted(&self) {
        self.posted.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_buffer_full(&self) {
        self.buffer_full.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_flushed(&self, bytes: u64) {
        self.bytes_flushed.fetch_add(bytes, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_connect(&self) {
        self.connects.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_write_error(&self) {
        self.write_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy the counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            posted: self.posted.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            buffer_full: self.buffer_full.load(Ordering::Relaxed),
            bytes_flushed: self.bytes_flushed.load(Ordering::Relaxed),
            connects: self.connects.load(Ordering::Relaxed),
            write_errors: self.write_errors.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`PipelineMetrics`].
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsSnapshot {
    pub posted: u64,
    pub dropped: u64,
    pub buffer_full: u64,
    pub bytes_flushed: u64,
    pub connects: u64,
    pub write_errors: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let metrics = PipelineMetrics::new();

        metrics.record_posted();
        metrics.record_posted();
        metrics.record_dropped();
        metrics.record_buffer_full();
        metrics.record_flushed(1024);
        metrics.record_flushed(512);
        metrics.record_connect();
        metrics.record_write_error();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.posted, 2);
        assert_eq!(snapshot.dropped, 1);
        assert_eq!(snapshot.buffer_full, 1);
        assert_eq!(snapshot.bytes_flushed, 1536);
        assert_eq!(snapshot.connects, 1);
        assert_eq!(snapshot.write_errors, 1);
    }

    #[test]
    fn test_snapshot_default_is_zero() {
        let snapshot = MetricsSnapshot::default();
        assert_eq!(snapshot.posted, 0);
        assert_eq!(snapshot.bytes_flushed, 0);
    }
}
