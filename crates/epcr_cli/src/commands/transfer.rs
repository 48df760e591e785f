//! Transfer command implementation.

use super::{start_audit, stop_audit};
use epcr_audit::AuditLog;
use epcr_sync_engine::{
    BringUpCommand, CancelToken, ConnectionManager, ReceiverOutcome, RetryConfig, SqliteConnector,
    StoreCredentials, SyncConfig, TcpTransport, TransferBatch, TransferCoordinator,
    TransferReport,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Flags of the transfer command.
#[derive(Debug)]
pub struct TransferOptions {
    /// Center address.
    pub center: String,
    /// Command that starts the local store.
    pub bring_up: Option<String>,
    /// Audit log file.
    pub log: Option<PathBuf>,
    /// Seconds to wait for each acknowledgement.
    pub ack_timeout: u64,
    /// Store connection attempts.
    pub attempts: u32,
}

/// Runs the transfer command.
pub async fn run(db: &Path, options: TransferOptions) -> Result<(), Box<dyn std::error::Error>> {
    let audit = start_audit(options.log.as_deref())?;
    let result = transfer(db, &options, audit.as_ref().map(|s| s.handle())).await;
    stop_audit(audit)?;

    let report = result?;
    print_report(&report);
    if report.is_complete_success() {
        Ok(())
    } else {
        Err(format!("{} records remain pending", report.failed().count()).into())
    }
}

async fn transfer(
    db: &Path,
    options: &TransferOptions,
    audit: Option<AuditLog>,
) -> Result<TransferReport, Box<dyn std::error::Error>> {
    let cancel = CancelToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let retry = RetryConfig::new(options.attempts);
    let config = SyncConfig::new(options.center.clone())
        .with_ack_timeout(Duration::from_secs(options.ack_timeout))
        .with_retry(retry.clone());

    let mut manager = ConnectionManager::new(Arc::new(SqliteConnector::new().with_schema()), retry)
        .with_cancel(cancel.clone());
    if let Some(command) = options.bring_up.as_deref().and_then(BringUpCommand::parse) {
        manager = manager.with_bring_up(command);
    }
    if let Some(audit) = &audit {
        manager = manager.with_audit(audit.clone());
    }

    manager
        .connect(&StoreCredentials::new(db.display().to_string()))
        .await?;
    let store = manager.store()?;

    let batch = TransferBatch::pending(&store)?;
    info!(records = batch.len(), center = %config.center_addr, "Starting transfer");

    let transport = TcpTransport::new(config.center_addr.clone(), config.connect_timeout);
    let mut coordinator = TransferCoordinator::new(transport, config);
    if let Some(audit) = audit {
        coordinator = coordinator.with_audit(audit);
    }

    let report = coordinator.transfer(batch, cancel).await?.finish().await?;
    let applied = report.reconcile(&store)?;
    info!(applied, "Server ids stored");
    manager.disconnect();
    Ok(report)
}

fn print_report(report: &TransferReport) {
    if report.is_complete_success() {
        println!("✓ Transfer complete");
    } else {
        println!("✗ Transfer incomplete");
    }
    println!("  Batch: {}", report.batch_id);
    println!("  Sent: {}", report.sent);
    println!("  Stored: {}", report.succeeded().count());
    if let Some(error) = &report.send_error {
        println!("  Send stopped: {error}");
    }
    if let ReceiverOutcome::Failed { reason, .. } = &report.outcome {
        println!("  Receiver: {reason}");
    }
    for ack in report.failed() {
        println!("  Record {}: {}", ack.local_id, ack.message);
    }
}
