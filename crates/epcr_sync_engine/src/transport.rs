//! Streams to the center.

use crate::error::{SyncError, SyncResult};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream};
use tokio::net::TcpStream;

/// Opens byte streams to the center.
///
/// This trait abstracts the network layer so that transfers can run over
/// TCP in production and over in-memory pipes in tests.
pub trait CenterTransport: Send + Sync {
    /// The stream type this transport opens.
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Opens a new stream.
    fn open(&self) -> impl Future<Output = SyncResult<Self::Stream>> + Send;

    /// Describes the peer for logs.
    fn peer(&self) -> String;
}

/// TCP transport.
#[derive(Debug, Clone)]
pub struct TcpTransport {
    addr: String,
    connect_timeout: Duration,
}

impl TcpTransport {
    /// Creates a transport for `addr` (`host:port`).
    pub fn new(addr: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            connect_timeout,
        }
    }
}

impl CenterTransport for TcpTransport {
    type Stream = TcpStream;

    async fn open(&self) -> SyncResult<TcpStream> {
        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(&self.addr))
            .await
            .map_err(|_| {
                SyncError::connectivity(format!("connect to {} timed out", self.addr), true)
            })?
            .map_err(|e| SyncError::connectivity(format!("connect to {}: {e}", self.addr), true))?;
        stream
            .set_nodelay(true)
            .map_err(|e| SyncError::connectivity(e.to_string(), true))?;
        Ok(stream)
    }

    fn peer(&self) -> String {
        self.addr.clone()
    }
}

/// A transport over in-memory pipes for testing.
///
/// Every call to [`MockTransport::peer_stream`] queues one pipe and returns
/// its center end; `open` hands out the field-unit ends in order.
#[derive(Debug, Default)]
pub struct MockTransport {
    pending: Mutex<VecDeque<DuplexStream>>,
}

impl MockTransport {
    /// Creates a transport with no pipes queued.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a pipe and returns the end the center should serve.
    pub fn peer_stream(&self) -> DuplexStream {
        let (local, remote) = tokio::io::duplex(64 * 1024);
        self.pending.lock().push_back(local);
        remote
    }

    /// Returns the number of pipes not yet opened.
    pub fn queued(&self) -> usize {
        self.pending.lock().len()
    }
}

impl CenterTransport for MockTransport {
    type Stream = DuplexStream;

    async fn open(&self) -> SyncResult<DuplexStream> {
        self.pending
            .lock()
            .pop_front()
            .ok_or_else(|| SyncError::connectivity("no mock peer queued", false))
    }

    fn peer(&self) -> String {
        "mock".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_transport_hands_out_queued_pipes() {
        let transport = MockTransport::new();
        assert!(matches!(
            transport.open().await,
            Err(SyncError::Connectivity { .. })
        ));

        let _remote = transport.peer_stream();
        assert_eq!(transport.queued(), 1);
        transport.open().await.unwrap();
        assert_eq!(transport.queued(), 0);
    }

    #[tokio::test]
    async fn tcp_transport_reports_refused_connection() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let transport = TcpTransport::new(addr.to_string(), Duration::from_secs(2));
        let err = transport.open().await.unwrap_err();
        assert!(err.is_retryable());
    }
}
