use std::io;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

use shunt_common::Destination;

/// Byte stream a connection is relayed over.
pub trait RelayStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> RelayStream for T {}

pub type BoxedStream = Box<dyn RelayStream>;

/// Capability for opening backend connections.
///
/// The dispatcher never touches sockets directly; it goes through this
/// seam. Production supplies [`TcpConnector`], tests supply fakes backed by
/// in-memory duplex streams.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Opens a connection to `dest`, bounded by `timeout`.
    async fn connect(&self, dest: &Destination, timeout: Duration) -> io::Result<BoxedStream>;
}

/// Opens backend connections over TCP.
///
/// The connect is non-blocking under the hood (the runtime polls the socket
/// for writability); the timeout covers the whole attempt including name
/// resolution.
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, dest: &Destination, timeout: Duration) -> io::Result<BoxedStream> {
        let addr = format!("{}:{}", dest.host, dest.port);
        let stream = tokio::time::timeout(timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| {
                io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("connect to {} timed out", addr),
                )
            })??;
        stream.set_nodelay(true)?;
        Ok(Box::new(stream))
    }
}
