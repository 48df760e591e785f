//! Serve command implementation.

use super::{start_audit, stop_audit};
use epcr_audit::AuditLog;
use epcr_core::{schema, MapLookup};
use epcr_storage::{SharedStore, SqliteStore};
use epcr_sync_server::{CenterServer, RecordWriter, ServerConfig, ServerResult};
use std::fs::File;
use std::io::BufReader;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Runs the center until interrupted.
pub async fn run(
    db: &Path,
    bind: SocketAddr,
    identities: Option<&Path>,
    log: Option<&Path>,
    max_connections: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut store = SqliteStore::open(db)?;
    schema::install(&mut store)?;
    let mut writer = RecordWriter::new(SharedStore::new(Box::new(store)));

    if let Some(path) = identities {
        let registry = MapLookup::from_json(BufReader::new(File::open(path)?))?;
        info!(entries = registry.len(), "Loaded identity registry from {:?}", path);
        writer = writer.with_lookup(Arc::new(registry));
    }

    let audit = start_audit(log)?;
    if let Some(service) = &audit {
        writer = writer.with_audit(service.handle());
    }

    let config = ServerConfig::new(bind).with_max_connections(max_connections);
    let result = serve(config, writer, audit.as_ref().map(|s| s.handle())).await;
    stop_audit(audit)?;

    result?;
    println!("✓ Center stopped");
    Ok(())
}

async fn serve(
    config: ServerConfig,
    writer: RecordWriter,
    audit: Option<AuditLog>,
) -> ServerResult<()> {
    let mut server = CenterServer::bind(config, writer).await?;
    if let Some(audit) = audit {
        server = server.with_audit(audit);
    }
    println!("✓ Center listening on {}", server.local_addr()?);
    server
        .run(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
}
