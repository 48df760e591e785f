//! TCP listener and per-connection loop.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::RecordWriter;
use epcr_audit::AuditLog;
use epcr_sync_protocol::{read_frame, write_frame, PacketSet};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

const SOURCE: &str = "center.connection";

/// What happened on one connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    /// Records stored.
    pub stored: usize,
    /// Records rejected.
    pub rejected: usize,
}

/// Serves one field-unit connection until the field unit closes it.
///
/// Every packet set is answered before the next one is read, so
/// acknowledgements leave in arrival order.
///
/// # Errors
///
/// Returns an error for a malformed frame, a read timeout, or a broken
/// stream. The connection is closed in every case.
pub async fn serve_connection<S>(
    mut stream: S,
    writer: RecordWriter,
    frame_timeout: Duration,
) -> ServerResult<ConnectionStats>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut stats = ConnectionStats::default();
    loop {
        let frame = tokio::time::timeout(frame_timeout, read_frame::<_, PacketSet>(&mut stream))
            .await
            .map_err(|_| ServerError::Timeout(frame_timeout))??;
        let Some(set) = frame else {
            break;
        };

        let local_id = set.local_id;
        let job = writer.clone();
        let ack = tokio::task::spawn_blocking(move || job.write(&set))
            .await
            .map_err(|e| ServerError::Internal(format!("writer for record {local_id}: {e}")))?;

        if ack.is_success() {
            stats.stored += 1;
        } else {
            stats.rejected += 1;
        }
        write_frame(&mut stream, &ack).await?;
    }
    Ok(stats)
}

/// The center's TCP server.
pub struct CenterServer {
    listener: TcpListener,
    config: ServerConfig,
    writer: RecordWriter,
    audit: Option<AuditLog>,
}

impl CenterServer {
    /// Binds the listener.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the address is unavailable.
    pub async fn bind(config: ServerConfig, writer: RecordWriter) -> ServerResult<Self> {
        let listener = TcpListener::bind(config.bind_addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: config.bind_addr,
                source,
            })?;
        Ok(Self {
            listener,
            config,
            writer,
            audit: None,
        })
    }

    /// Sets the audit log that receives connection failures.
    pub fn with_audit(mut self, audit: AuditLog) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Returns the bound address.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket has no local address.
    pub fn local_addr(&self) -> ServerResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts connections until `shutdown` completes, then waits for open
    /// connections to finish.
    ///
    /// # Errors
    ///
    /// Connection errors are logged, not returned; this only fails if the
    /// server cannot run at all.
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> ServerResult<()> {
        let limit = Arc::new(Semaphore::new(self.config.max_connections.max(1)));
        let mut connections = JoinSet::new();
        tracing::info!(addr = %self.local_addr()?, "center listening");
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                () = &mut shutdown => break,
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(pair) => pair,
                        Err(e) => {
                            tracing::warn!(error = %e, "accept failed");
                            continue;
                        }
                    };
                    let Ok(permit) = Arc::clone(&limit).try_acquire_owned() else {
                        tracing::warn!(%peer, "connection limit reached, refusing");
                        continue;
                    };

                    let writer = self.writer.clone();
                    let audit = self.audit.clone();
                    let frame_timeout = self.config.frame_timeout;
                    connections.spawn(async move {
                        let _permit = permit;
                        tracing::debug!(%peer, "field unit connected");
                        match serve_connection(stream, writer, frame_timeout).await {
                            Ok(stats) => tracing::info!(
                                %peer,
                                stored = stats.stored,
                                rejected = stats.rejected,
                                "field unit disconnected"
                            ),
                            Err(e) => {
                                tracing::warn!(%peer, error = %e, "connection closed");
                                if let Some(audit) = &audit {
                                    audit.record_error(SOURCE, format!("connection from {peer} closed"), &e);
                                }
                            }
                        }
                    });
                }
            }
        }

        tracing::info!(open = connections.len(), "center shutting down");
        while connections.join_next().await.is_some() {}
        Ok(())
    }
}

impl std::fmt::Debug for CenterServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CenterServer")
            .field("config", &self.config)
            .field("writer", &self.writer)
            .finish()
    }
}
