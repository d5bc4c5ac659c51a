//! The socket seam.
//!
//! Adapters never open sockets themselves; they hold a [`Dialer`] and ask it
//! for a fresh byte stream whenever a connection is needed. Production links
//! use [`TcpDialer`]; tests hand the adapter in-memory duplex pipes through
//! the same trait.

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::debug;

use crate::error::{LinkError, Result};

/// Marker for bidirectional byte streams usable by an adapter.
pub trait Io: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> Io for T {}

/// Boxed bidirectional byte stream produced by a [`Dialer`].
pub type IoStream = Box<dyn Io>;

/// Produces connections to one endpoint, one at a time.
#[async_trait]
pub trait Dialer: Send + Sync + 'static {
    /// Establish one connection to the endpoint.
    async fn dial(&self) -> Result<IoStream>;

    /// Endpoint description for log lines.
    fn endpoint(&self) -> String;
}

/// Dials a TCP endpoint.
pub struct TcpDialer {
    addr: String,
}

impl TcpDialer {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }
}

#[async_trait]
impl Dialer for TcpDialer {
    async fn dial(&self) -> Result<IoStream> {
        let stream = TcpStream::connect(&self.addr).await.map_err(|e| {
            LinkError::transport_with_source(
                format!("failed to connect to {}", self.addr),
                Box::new(e),
            )
        })?;
        // Messages are small and latency-sensitive.
        if let Err(e) = stream.set_nodelay(true) {
            debug!(addr = %self.addr, error = %e, "could not disable Nagle on socket");
        }
        Ok(Box::new(stream))
    }

    fn endpoint(&self) -> String {
        self.addr.clone()
    }
}
