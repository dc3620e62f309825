use super::*;

use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;

async fn listen() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let address = listener.local_addr().expect("local addr").to_string();
    (listener, address)
}

#[test]
fn test_host_of() {
    assert_eq!(host_of("logs.example.com:24224"), "logs.example.com");
    assert_eq!(host_of("127.0.0.1:0"), "127.0.0.1");
    assert_eq!(host_of("no-port"), "no-port");
}

#[tokio::test]
async fn test_dial_connects() {
    let (listener, address) = listen().await;

    let conn = dial(Network::Tcp, &address, Duration::from_secs(1), None)
        .await
        .expect("dial");
    let (_server, _) = listener.accept().await.expect("accept");

    assert!(!conn.is_invalidated());
}

#[tokio::test]
async fn test_dial_refused() {
    // Bind then drop to get a port with no listener.
    let (listener, address) = listen().await;
    drop(listener);

    let err = dial(Network::Tcp, &address, Duration::from_secs(1), None)
        .await
        .expect_err("dial should fail");

    match err {
        ClientError::Connect { address: a, .. } => assert_eq!(a, address),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_write_reaches_server() {
    let (listener, address) = listen().await;

    let mut conn = dial(Network::Tcp, &address, Duration::from_secs(1), None)
        .await
        .expect("dial");
    let (mut server, _) = listener.accept().await.expect("accept");

    conn.write_all(b"hello", Some(Duration::from_secs(1)))
        .await
        .expect("write");

    let mut buf = [0u8; 5];
    server.read_exact(&mut buf).await.expect("read");
    assert_eq!(&buf, b"hello");
}

#[tokio::test]
async fn test_monitor_invalidates_on_peer_close() {
    let (listener, address) = listen().await;

    let conn = dial(Network::Tcp, &address, Duration::from_secs(1), None)
        .await
        .expect("dial");
    let (server, _) = listener.accept().await.expect("accept");

    drop(server);

    // The monitor observes EOF and cancels the token.
    tokio::time::timeout(Duration::from_secs(2), async {
        while !conn.is_invalidated() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("monitor should invalidate the connection");
}

#[tokio::test]
async fn test_write_fails_after_invalidation() {
    let (listener, address) = listen().await;

    let mut conn = dial(Network::Tcp, &address, Duration::from_secs(1), None)
        .await
        .expect("dial");
    let (server, _) = listener.accept().await.expect("accept");
    drop(server);

    tokio::time::timeout(Duration::from_secs(2), async {
        while !conn.is_invalidated() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("monitor should invalidate the connection");

    let err = conn
        .write_all(b"late", Some(Duration::from_secs(1)))
        .await
        .expect_err("write should fail on an invalidated connection");
    assert_eq!(err.kind(), std::io::ErrorKind::BrokenPipe);
}

#[cfg(unix)]
#[tokio::test]
async fn test_dial_unix() {
    let dir = std::env::temp_dir().join(format!("fluentd-client-test-{}", std::process::id()));
    std::fs::create_dir_all(&dir).expect("create dir");
    let path = dir.join("sock");
    let _ = std::fs::remove_file(&path);

    let listener = tokio::net::UnixListener::bind(&path).expect("bind unix");
    let path_str = path.to_str().expect("utf-8 path").to_string();

    let mut conn = dial(Network::Unix, &path_str, Duration::from_secs(1), None)
        .await
        .expect("dial unix");
    let (mut server, _) = listener.accept().await.expect("accept");

    conn.write_all(b"ping", None).await.expect("write");
    let mut buf = [0u8; 4];
    server.read_exact(&mut buf).await.expect("read");
    assert_eq!(&buf, b"ping");

    let _ = std::fs::remove_file(&path);
}
