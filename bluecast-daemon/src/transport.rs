//! Stream listeners the supervisor accepts peers from
//!
//! RFCOMM is the production transport. TCP carries the same byte stream for
//! hosts without an adapter and for local testing.

use std::io;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tracing::info;

use crate::config::{TransportConfig, TransportKind};

/// A connected peer stream.
pub trait Connection: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Connection for T {}

pub type BoxedConnection = Box<dyn Connection>;

/// Source of inbound connections.
#[async_trait]
pub trait Listener: Send {
    /// Wait for the next peer. Returns the stream and the remote identifier.
    async fn accept(&mut self) -> io::Result<(BoxedConnection, String)>;

    fn local_endpoint(&self) -> String;
}

#[async_trait]
impl<L: Listener + ?Sized> Listener for Box<L> {
    async fn accept(&mut self) -> io::Result<(BoxedConnection, String)> {
        (**self).accept().await
    }

    fn local_endpoint(&self) -> String {
        (**self).local_endpoint()
    }
}

pub struct TcpTransport {
    listener: TcpListener,
}

impl TcpTransport {
    pub async fn bind(addr: &str) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener })
    }
}

#[async_trait]
impl Listener for TcpTransport {
    async fn accept(&mut self) -> io::Result<(BoxedConnection, String)> {
        let (stream, peer) = self.listener.accept().await?;
        Ok((Box::new(stream), peer.to_string()))
    }

    fn local_endpoint(&self) -> String {
        self.listener
            .local_addr()
            .map(|addr| format!("tcp://{}", addr))
            .unwrap_or_else(|_| "tcp://?".to_string())
    }
}

#[cfg(target_os = "linux")]
pub struct RfcommTransport {
    listener: bluer::rfcomm::Listener,
    channel: u8,
}

#[cfg(target_os = "linux")]
impl RfcommTransport {
    /// Bind on any local adapter at `channel`.
    pub async fn bind(channel: u8) -> io::Result<Self> {
        let addr = bluer::rfcomm::SocketAddr::new(bluer::Address::any(), channel);
        let listener = bluer::rfcomm::Listener::bind(addr).await?;
        Ok(Self { listener, channel })
    }
}

#[cfg(target_os = "linux")]
#[async_trait]
impl Listener for RfcommTransport {
    async fn accept(&mut self) -> io::Result<(BoxedConnection, String)> {
        let (stream, peer) = self.listener.accept().await?;
        Ok((Box::new(stream), peer.addr.to_string()))
    }

    fn local_endpoint(&self) -> String {
        format!("rfcomm channel {}", self.channel)
    }
}

/// Bind the listener selected by configuration.
pub async fn bind(config: &TransportConfig) -> io::Result<Box<dyn Listener>> {
    let listener: Box<dyn Listener> = match config.kind {
        TransportKind::Tcp => Box::new(TcpTransport::bind(&config.tcp_bind).await?),
        #[cfg(target_os = "linux")]
        TransportKind::Rfcomm => Box::new(RfcommTransport::bind(config.rfcomm_channel).await?),
        #[cfg(not(target_os = "linux"))]
        TransportKind::Rfcomm => {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "RFCOMM requires BlueZ on Linux; set transport.kind = \"tcp\"",
            ))
        }
    };

    info!("Listening on {}", listener.local_endpoint());
    Ok(listener)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    #[tokio::test]
    async fn test_tcp_accepts_and_reports_peer() {
        let config = TransportConfig {
            kind: TransportKind::Tcp,
            tcp_bind: "127.0.0.1:0".to_string(),
            ..TransportConfig::default()
        };
        let mut listener = bind(&config).await.unwrap();
        let endpoint = listener.local_endpoint();
        let addr = endpoint.trim_start_matches("tcp://").to_string();

        let client = tokio::spawn(async move {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            stream.write_all(b"ping").await.unwrap();
            let local = stream.local_addr().unwrap().to_string();
            (stream, local)
        });

        let (mut conn, remote) = listener.accept().await.unwrap();
        let mut buf = [0u8; 16];
        let n = conn.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"ping");

        let (_stream, local) = client.await.unwrap();
        assert_eq!(remote, local);
    }
}
