//! Socket transport: dial, TLS, and the connection monitor.
//!
//! A [`Connection`] owns the write half of a dialed socket plus a
//! connection-scoped cancellation token. Dialing spawns the monitor task,
//! which parks on a one-byte read of the read half; the server never sends
//! application data, so any read completion means the peer half-closed (or
//! the socket died) and the token is cancelled. The writer treats a
//! cancelled token as a dead connection and re-dials, which catches
//! half-closed peers during idle periods instead of waiting out a TCP
//! keep-alive cycle. The monitor only reads and cancels; it never writes.

use std::io;
use std::time::Duration;

use socket2::{SockRef, TcpKeepalive};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

use crate::config::{Network, TlsOptions};
use crate::error::ClientError;

const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Object-safe alias for the streams the transports produce.
pub(crate) trait RawStream: AsyncRead + AsyncWrite + Send + Unpin {}
impl<T: AsyncRead + AsyncWrite + Send + Unpin> RawStream for T {}

/// A dialed connection: the write half and its invalidation token.
impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").finish_non_exhaustive()
    }
}

pub(crate) struct Connection {
    writer: WriteHalf<Box<dyn RawStream>>,
    invalidated: CancellationToken,
}

impl Connection {
    fn start(stream: Box<dyn RawStream>) -> Self {
        let (read_half, writer) = tokio::io::split(stream);
        let invalidated = CancellationToken::new();
        tokio::spawn(monitor(read_half, invalidated.clone()));
        Self {
            writer,
            invalidated,
        }
    }

    /// Whether the monitor has declared this connection dead.
    pub(crate) fn is_invalidated(&self) -> bool {
        self.invalidated.is_cancelled()
    }

    /// Write the whole buffer, racing the invalidation token and the
    /// optional deadline.
    pub(crate) async fn write_all(
        &mut self,
        buf: &[u8],
        deadline: Option<Duration>,
    ) -> io::Result<()> {
        if self.invalidated.is_cancelled() {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "connection closed by peer",
            ));
        }

        let invalidated = self.invalidated.clone();
        let write = async {
            self.writer.write_all(buf).await?;
            self.writer.flush().await
        };

        tokio::select! {
            _ = invalidated.cancelled() => Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "connection closed by peer",
            )),
            res = bounded(write, deadline) => res,
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        // Stops the monitor task.
        self.invalidated.cancel();
    }
}

async fn bounded<F>(fut: F, deadline: Option<Duration>) -> io::Result<()>
where
    F: std::future::Future<Output = io::Result<()>>,
{
    match deadline {
        Some(d) => tokio::time::timeout(d, fut)
            .await
            .unwrap_or_else(|_| Err(io::Error::new(io::ErrorKind::TimedOut, "write timed out"))),
        None => fut.await,
    }
}

async fn monitor(mut read_half: ReadHalf<Box<dyn RawStream>>, token: CancellationToken) {
    let mut one = [0u8; 1];
    loop {
        tokio::select! {
            _ = token.cancelled() => return,
            read = read_half.read(&mut one) => match read {
                // EOF or a broken socket: invalidate so the writer re-dials.
                Ok(0) | Err(_) => {
                    tracing::debug!("connection closed by peer");
                    token.cancel();
                    return;
                }
                // The server is not supposed to talk; discard.
                Ok(_) => {}
            },
        }
    }
}

/// Dial the configured endpoint, returning a monitored connection.
///
/// TCP connects are bounded by `timeout`, get `TCP_NODELAY` and a 30-second
/// keep-alive, and optionally run the TLS handshake on top. Failures are
/// wrapped with the target address.
pub(crate) async fn dial(
    network: Network,
    address: &str,
    timeout: Duration,
    tls: Option<&TlsOptions>,
) -> Result<Connection, ClientError> {
    let stream: Box<dyn RawStream> = match network {
        Network::Tcp => {
            let stream = connect_tcp(address, timeout).await?;
            match tls {
                Some(opts) => Box::new(handshake(stream, address, timeout, opts).await?),
                None => Box::new(stream),
            }
        }
        Network::Unix => connect_unix(address, timeout).await?,
    };

    Ok(Connection::start(stream))
}

async fn connect_tcp(address: &str, timeout: Duration) -> Result<TcpStream, ClientError> {
    let stream = tokio::time::timeout(timeout, TcpStream::connect(address))
        .await
        .map_err(|_| connect_error(address, io::ErrorKind::TimedOut, "connect timed out"))?
        .map_err(|e| ClientError::Connect {
            address: address.to_string(),
            source: e,
        })?;

    if let Err(e) = stream.set_nodelay(true) {
        tracing::debug!(error = %e, "failed to set TCP_NODELAY");
    }

    let sock_ref = SockRef::from(&stream);
    let keepalive = TcpKeepalive::new().with_time(KEEPALIVE_INTERVAL);
    if let Err(e) = sock_ref.set_tcp_keepalive(&keepalive) {
        tracing::debug!(error = %e, "failed to set TCP keep-alive");
    }

    Ok(stream)
}

async fn handshake(
    stream: TcpStream,
    address: &str,
    timeout: Duration,
    opts: &TlsOptions,
) -> Result<tokio_native_tls::TlsStream<TcpStream>, ClientError> {
    let connector = tokio_native_tls::TlsConnector::from(
        opts.connector().map_err(ClientError::Tls)?,
    );
    let domain = opts
        .domain
        .clone()
        .unwrap_or_else(|| host_of(address).to_string());

    tokio::time::timeout(timeout, connector.connect(&domain, stream))
        .await
        .map_err(|_| connect_error(address, io::ErrorKind::TimedOut, "TLS handshake timed out"))?
        .map_err(|e| ClientError::Connect {
            address: address.to_string(),
            source: io::Error::other(e),
        })
}

#[cfg(unix)]
async fn connect_unix(address: &str, timeout: Duration) -> Result<Box<dyn RawStream>, ClientError> {
    let stream = tokio::time::timeout(timeout, tokio::net::UnixStream::connect(address))
        .await
        .map_err(|_| connect_error(address, io::ErrorKind::TimedOut, "connect timed out"))?
        .map_err(|e| ClientError::Connect {
            address: address.to_string(),
            source: e,
        })?;
    Ok(Box::new(stream))
}

#[cfg(not(unix))]
async fn connect_unix(
    _address: &str,
    _timeout: Duration,
) -> Result<Box<dyn RawStream>, ClientError> {
    Err(ClientError::UnsupportedNetwork)
}

fn connect_error(address: &str, kind: io::ErrorKind, msg: &str) -> ClientError {
    ClientError::Connect {
        address: address.to_string(),
        source: io::Error::new(kind, msg.to_string()),
    }
}

/// Host part of a `host:port` address, for the default TLS domain.
fn host_of(address: &str) -> &str {
    address.rsplit_once(':').map_or(address, |(host, _)| host)
}

#[cfg(test)]
#[path = "transport_test.rs"]
mod transport_test;
