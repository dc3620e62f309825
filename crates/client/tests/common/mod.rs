//! Shared helpers for the integration tests.

#![allow(dead_code)]

pub mod mock_server;

use serde_json::Value;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};

/// Bind a listener on an ephemeral port.
pub async fn bind() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let address = listener.local_addr().expect("local addr").to_string();
    (listener, address)
}

/// Bind and immediately drop, yielding an address with no listener.
pub async fn unreachable_address() -> String {
    let (listener, address) = bind().await;
    drop(listener);
    address
}

/// Read everything the peer sends until it closes the connection.
pub async fn read_until_eof(mut stream: TcpStream) -> Vec<u8> {
    let mut bytes = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        match stream.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => bytes.extend_from_slice(&buf[..n]),
        }
    }
    bytes
}

/// Read one chunk off the stream (enough for a single flushed frame).
pub async fn read_chunk(stream: &mut TcpStream) -> Vec<u8> {
    let mut buf = vec![0u8; 4096];
    let n = stream.read(&mut buf).await.expect("read chunk");
    buf.truncate(n);
    buf
}

/// Decode back-to-back `[tag, time, record]` MessagePack frames.
pub fn decode_frames(bytes: &[u8]) -> Vec<(String, u64, Value)> {
    let mut frames = Vec::new();
    let mut de = rmp_serde::Deserializer::new(std::io::Cursor::new(bytes));
    while let Ok(frame) = serde::Deserialize::deserialize(&mut de) {
        frames.push(frame);
    }
    frames
}
