use super::*;

#[test]
fn test_append_and_consume() {
    let mut pending = PendingBuffer::with_limit(64);
    assert!(pending.is_empty());

    assert!(pending.append(b"hello"));
    assert!(pending.append(b"world"));
    assert_eq!(pending.len(), 10);
    assert_eq!(pending.unflushed(), b"helloworld");

    pending.consume(5);
    assert_eq!(pending.len(), 5);
    assert_eq!(pending.unflushed(), b"world");

    pending.consume(5);
    assert!(pending.is_empty());
}

#[test]
fn test_append_rejects_past_limit() {
    let mut pending = PendingBuffer::with_limit(8);

    assert!(pending.append(b"12345678"));
    assert!(!pending.append(b"9"));
    assert_eq!(pending.len(), 8);

    // Consuming frees room again.
    pending.consume(8);
    assert!(pending.append(b"9"));
}

#[test]
fn test_limit_counts_unflushed_bytes_only() {
    let mut pending = PendingBuffer::with_limit(8);

    assert!(pending.append(b"aaaa"));
    pending.consume(2);

    // 2 unflushed + 6 incoming = 8 <= limit, despite the stale head room.
    assert!(pending.append(b"bbbbbb"));
    assert_eq!(pending.unflushed(), b"aabbbbbb");
}

#[test]
fn test_full_drain_preserves_capacity() {
    let mut pending = PendingBuffer::with_limit(1024);
    let capacity = pending.capacity();

    for _ in 0..100 {
        assert!(pending.append(&[0u8; 512]));
        pending.consume(512);
    }

    assert_eq!(pending.capacity(), capacity);
    assert!(pending.is_empty());
}

#[test]
fn test_compaction_never_reallocates() {
    let mut pending = PendingBuffer::with_limit(16);
    let capacity = pending.capacity();

    // Keep a stale head alive so every large append must compact.
    for round in 0..50u8 {
        assert!(pending.append(&[round; 8]));
        pending.consume(4);
        assert!(pending.append(&[round; 12]));
        assert_eq!(pending.len(), 16);
        pending.consume(16);
    }

    assert_eq!(pending.capacity(), capacity);
}

#[test]
fn test_partial_consume_keeps_order() {
    let mut pending = PendingBuffer::with_limit(16);

    assert!(pending.append(b"abcd"));
    pending.consume(2);
    assert!(pending.append(b"efgh"));

    assert_eq!(pending.unflushed(), b"cdefgh");
}
