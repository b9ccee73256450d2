//! Transport-agnostic connection handed to collaborator hooks.
//!
//! Wraps either a Unix or a TCP stream behind one type so hook
//! implementations never depend on which endpoint flavour is configured.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpStream, UnixStream};

use crate::endpoint::Endpoint;

/// One accepted or dialed coordination connection.
///
/// Implements [`AsyncRead`] and [`AsyncWrite`], so hooks can use any
/// `tokio::io` utility on it (single read, line-based read, or stream until
/// EOF). Shutting down the write side half-closes the connection; the read
/// side stays usable.
#[derive(Debug)]
pub enum Connection {
    /// Connection over a Unix domain socket.
    Unix(UnixStream),
    /// Connection over a TCP socket.
    Tcp(TcpStream),
}

impl Connection {
    /// Dial the given endpoint.
    pub async fn connect(endpoint: &Endpoint) -> io::Result<Self> {
        match endpoint {
            Endpoint::Unix(path) => UnixStream::connect(path).await.map(Self::Unix),
            Endpoint::Tcp { host, port } => TcpStream::connect((host.as_str(), *port))
                .await
                .map(Self::Tcp),
        }
    }
}

impl AsyncRead for Connection {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Unix(stream) => Pin::new(stream).poll_read(cx, buf),
            Self::Tcp(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Connection {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Unix(stream) => Pin::new(stream).poll_write(cx, buf),
            Self::Tcp(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Unix(stream) => Pin::new(stream).poll_flush(cx),
            Self::Tcp(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Unix(stream) => Pin::new(stream).poll_shutdown(cx),
            Self::Tcp(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::UnixListener;

    #[tokio::test]
    async fn test_connect_unix_round_trip() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("conn.sock");
        let listener = UnixListener::bind(&path).unwrap();

        let endpoint = Endpoint::unix(&path);
        let (mut client, accepted) =
            tokio::join!(async { Connection::connect(&endpoint).await.unwrap() }, async {
                listener.accept().await.unwrap().0
            });
        let mut server_side = Connection::Unix(accepted);

        client.write_all(b"ping").await.unwrap();
        client.shutdown().await.unwrap();

        let mut received = String::new();
        server_side.read_to_string(&mut received).await.unwrap();
        assert_eq!(received, "ping");
    }

    #[tokio::test]
    async fn test_connect_refused_when_nothing_listens() {
        let tmp = tempfile::TempDir::new().unwrap();
        let endpoint = Endpoint::unix(tmp.path().join("absent.sock"));
        assert!(Connection::connect(&endpoint).await.is_err());
    }
}
