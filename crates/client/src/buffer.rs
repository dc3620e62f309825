//! Bounded pending buffer shared by the reader and writer tasks.

/// Contiguous accumulator of serialized frames awaiting transmission.
///
/// The backing allocation is made once at the configured limit and never
/// grows: appends that would push the unflushed length past the limit are
/// rejected, flushed bytes are consumed by advancing a head index, and a
/// full drain truncates back to the start of the allocation. When appending
/// would run past the end of the allocation while stale head room exists,
/// the unflushed tail is compacted to the front instead of reallocating.
pub(crate) struct PendingBuffer {
    buf: Vec<u8>,
    head: usize,
    limit: usize,
}

impl PendingBuffer {
    pub(crate) fn with_limit(limit: usize) -> Self {
        Self {
            buf: Vec::with_capacity(limit),
            head: 0,
            limit,
        }
    }

    /// Unflushed byte count.
    pub(crate) fn len(&self) -> usize {
        self.buf.len() - self.head
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The unflushed bytes, in append order.
    pub(crate) fn unflushed(&self) -> &[u8] {
        &self.buf[self.head..]
    }

    /// Append a frame; `false` when it would exceed the limit.
    pub(crate) fn append(&mut self, bytes: &[u8]) -> bool {
        if self.len() + bytes.len() > self.limit {
            return false;
        }

        if self.head > 0 && self.buf.len() + bytes.len() > self.limit {
            // Reclaim the consumed head room in place.
            self.buf.drain(..self.head);
            self.head = 0;
        }

        self.buf.extend_from_slice(bytes);
        true
    }

    /// Mark `n` unflushed bytes as written; a full drain resets to the
    /// start of the allocation, preserving capacity.
    pub(crate) fn consume(&mut self, n: usize) {
        self.head += n;
        if self.head >= self.buf.len() {
            self.buf.clear();
            self.head = 0;
        }
    }

    #[cfg(test)]
    pub(crate) fn capacity(&self) -> usize {
        self.buf.capacity()
    }
}

#[cfg(test)]
#[path = "buffer_test.rs"]
mod buffer_test;
