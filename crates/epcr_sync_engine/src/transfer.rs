//! Batch transfer to the center.

use crate::cancel::CancelToken;
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::receiver::{AckReceiver, ReceiverOutcome};
use crate::transport::CenterTransport;
use epcr_audit::AuditLog;
use epcr_core::{mark_transferred, pending_records, LocalRecord};
use epcr_storage::SharedStore;
use epcr_sync_protocol::{write_frame, Acknowledgement, PacketSet};
use std::collections::HashSet;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

const SOURCE: &str = "transfer";

/// Records submitted together in one transfer.
#[derive(Debug, Clone)]
pub struct TransferBatch {
    id: Uuid,
    records: Vec<LocalRecord>,
}

impl TransferBatch {
    /// Creates a batch from already loaded records.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::DuplicateRecord`] if two records share a local
    /// id; each record must get exactly one acknowledgement.
    pub fn new(records: Vec<LocalRecord>) -> SyncResult<Self> {
        check_unique(records.iter().map(|r| r.local_id))?;
        Ok(Self {
            id: Uuid::new_v4(),
            records,
        })
    }

    /// Loads the records `local_ids` from `store`, in the given order.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::DuplicateRecord`] if an id is listed twice, or
    /// an error if a record is unknown or cannot be read.
    pub fn load(store: &SharedStore, local_ids: &[i64]) -> SyncResult<Self> {
        check_unique(local_ids.iter().copied())?;
        let mut guard = store.lock();
        let mut records = Vec::with_capacity(local_ids.len());
        for &local_id in local_ids {
            records.push(LocalRecord::load(guard.as_mut(), local_id)?);
        }
        Ok(Self {
            id: Uuid::new_v4(),
            records,
        })
    }

    /// Loads every completed record without a server id.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn pending(store: &SharedStore) -> SyncResult<Self> {
        let ids = pending_records(store.lock().as_mut())?;
        Self::load(store, &ids)
    }

    /// Returns the batch id used in logs.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the records in send order.
    pub fn records(&self) -> &[LocalRecord] {
        &self.records
    }

    /// Returns the local ids in send order.
    pub fn local_ids(&self) -> Vec<i64> {
        self.records.iter().map(|r| r.local_id).collect()
    }

    /// Returns the number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if the batch has no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn check_unique(local_ids: impl Iterator<Item = i64>) -> SyncResult<()> {
    let mut seen = HashSet::new();
    for local_id in local_ids {
        if !seen.insert(local_id) {
            return Err(SyncError::DuplicateRecord(local_id));
        }
    }
    Ok(())
}

/// Sends batches to the center.
///
/// Packet sets are written in batch order by the task that calls
/// [`TransferCoordinator::transfer`]. The [`AckReceiver`] is spawned as soon
/// as the stream is open and expects one acknowledgement per record. A send
/// failure stops sending but is not rolled back; the acknowledgement stream
/// decides each record's fate.
pub struct TransferCoordinator<T> {
    transport: T,
    config: SyncConfig,
    audit: Option<AuditLog>,
}

impl<T: CenterTransport> TransferCoordinator<T> {
    /// Creates a coordinator.
    pub fn new(transport: T, config: SyncConfig) -> Self {
        Self {
            transport,
            config,
            audit: None,
        }
    }

    /// Sets the audit log.
    pub fn with_audit(mut self, audit: AuditLog) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Returns the transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Sends `batch` and returns a handle to its acknowledgements.
    ///
    /// Returns once every packet set has been written or sending stopped.
    /// Each write is bounded by [`SyncConfig::send_timeout`] and gives up
    /// as soon as `cancel` fires.
    ///
    /// # Errors
    ///
    /// Returns an error only if the stream cannot be opened; nothing has
    /// been sent in that case.
    pub async fn transfer(
        &self,
        batch: TransferBatch,
        cancel: CancelToken,
    ) -> SyncResult<TransferHandle> {
        let batch_id = batch.id();
        let expected = batch.len();
        let (tx, rx) = mpsc::unbounded_channel();

        if batch.is_empty() {
            tracing::debug!(%batch_id, "empty batch, nothing to send");
            return Ok(TransferHandle::new(batch_id, 0, rx, None, cancel));
        }

        let peer = self.transport.peer();
        let stream = match self.transport.open().await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!(%batch_id, %peer, error = %e, "could not open stream to center");
                self.record_error(format!("batch {batch_id}: could not reach {peer}"), &e);
                return Err(e);
            }
        };
        tracing::info!(%batch_id, %peer, records = expected, "transfer started");
        self.record(format!("batch {batch_id}: sending {expected} records to {peer}"));

        let (read, mut write) = tokio::io::split(stream);
        let receiver = AckReceiver::new(
            read,
            batch.local_ids(),
            self.config.ack_timeout,
            cancel.clone(),
            tx,
        )
        .with_audit(self.audit.clone());
        let task = tokio::spawn(receiver.run());

        let mut handle = TransferHandle::new(batch_id, expected, rx, Some(task), cancel.clone());
        let send_timeout = self.config.send_timeout;
        for record in batch.records {
            let local_id = record.local_id;
            let set = PacketSet::from(record);
            let sent = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(SyncError::Cancelled),
                written = tokio::time::timeout(send_timeout, write_frame(&mut write, &set)) => {
                    match written {
                        Ok(result) => result.map_err(SyncError::from),
                        Err(_) => Err(SyncError::Timeout(format!(
                            "record {local_id} not accepted by the center within {send_timeout:?}"
                        ))),
                    }
                }
            };
            if let Err(e) = sent {
                tracing::warn!(%batch_id, local_id, error = %e, "send stopped");
                self.record_error(
                    format!("batch {batch_id}: send stopped at record {local_id}"),
                    &e,
                );
                handle.send_error = Some(e.to_string());
                break;
            }
            handle.sent += 1;
        }

        close_write(&mut write, send_timeout, &cancel).await;
        drop(write);
        tracing::debug!(%batch_id, sent = handle.sent, "sending finished");
        Ok(handle)
    }

    fn record(&self, message: String) {
        if let Some(audit) = &self.audit {
            audit.record(SOURCE, message);
        }
    }

    fn record_error(&self, message: String, error: &SyncError) {
        if let Some(audit) = &self.audit {
            audit.record_error(SOURCE, message, error);
        }
    }
}

/// Shuts the write half down unless that blocks past `limit` or `cancel`.
async fn close_write<W: AsyncWrite + Unpin>(write: &mut W, limit: Duration, cancel: &CancelToken) {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {}
        closed = tokio::time::timeout(limit, write.shutdown()) => {
            if let Ok(Err(e)) = closed {
                tracing::debug!(error = %e, "write half already closed");
            }
        }
    }
}

/// Acknowledgements of an in-flight batch.
pub struct TransferHandle {
    batch_id: Uuid,
    expected: usize,
    sent: usize,
    send_error: Option<String>,
    acks: mpsc::UnboundedReceiver<Acknowledgement>,
    received: Vec<Acknowledgement>,
    task: Option<JoinHandle<ReceiverOutcome>>,
    cancel: CancelToken,
}

impl TransferHandle {
    fn new(
        batch_id: Uuid,
        expected: usize,
        acks: mpsc::UnboundedReceiver<Acknowledgement>,
        task: Option<JoinHandle<ReceiverOutcome>>,
        cancel: CancelToken,
    ) -> Self {
        Self {
            batch_id,
            expected,
            sent: 0,
            send_error: None,
            acks,
            received: Vec::new(),
            task,
            cancel,
        }
    }

    /// Returns the batch id.
    pub fn batch_id(&self) -> Uuid {
        self.batch_id
    }

    /// Returns the number of acknowledgements the batch will produce.
    pub fn expected(&self) -> usize {
        self.expected
    }

    /// Returns the number of packet sets written.
    pub fn sent(&self) -> usize {
        self.sent
    }

    /// Returns why sending stopped early, if it did.
    pub fn send_error(&self) -> Option<&str> {
        self.send_error.as_deref()
    }

    /// Waits for the next acknowledgement. `None` once all were delivered.
    pub async fn next_ack(&mut self) -> Option<Acknowledgement> {
        let ack = self.acks.recv().await?;
        self.received.push(ack.clone());
        Some(ack)
    }

    /// Stops waiting; outstanding records get synthetic acknowledgements.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Waits for every acknowledgement and the receiver's outcome.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Internal`] if the receiver task panicked.
    pub async fn finish(mut self) -> SyncResult<TransferReport> {
        while self.next_ack().await.is_some() {}
        let outcome = match self.task.take() {
            Some(task) => task
                .await
                .map_err(|e| SyncError::Internal(format!("receiver task failed: {e}")))?,
            None => ReceiverOutcome::Complete,
        };

        Ok(TransferReport {
            batch_id: self.batch_id,
            sent: self.sent,
            send_error: self.send_error,
            acks: self.received,
            outcome,
        })
    }
}

impl std::fmt::Debug for TransferHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferHandle")
            .field("batch_id", &self.batch_id)
            .field("expected", &self.expected)
            .field("sent", &self.sent)
            .field("received", &self.received.len())
            .finish()
    }
}

/// Terminal status of a transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReport {
    /// Batch id.
    pub batch_id: Uuid,
    /// Packet sets written.
    pub sent: usize,
    /// Why sending stopped early, if it did.
    pub send_error: Option<String>,
    /// Every acknowledgement, in arrival order.
    pub acks: Vec<Acknowledgement>,
    /// How the receiver ended.
    pub outcome: ReceiverOutcome,
}

impl TransferReport {
    /// Acknowledgements of records the center stored.
    pub fn succeeded(&self) -> impl Iterator<Item = &Acknowledgement> {
        self.acks.iter().filter(|a| a.is_success())
    }

    /// Acknowledgements of records that stay pending.
    pub fn failed(&self) -> impl Iterator<Item = &Acknowledgement> {
        self.acks.iter().filter(|a| !a.is_success())
    }

    /// Returns true if every record was stored.
    pub fn is_complete_success(&self) -> bool {
        self.outcome.is_complete() && self.failed().next().is_none()
    }

    /// Stores the server ids of successful records in the local store.
    /// Returns the number of records reconciled.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the update; nothing is applied
    /// in that case.
    pub fn reconcile(&self, store: &SharedStore) -> SyncResult<usize> {
        let applied = store.transaction(|s| -> SyncResult<usize> {
            let mut applied = 0;
            for ack in self.succeeded() {
                mark_transferred(s, ack.local_id, ack.server_id)?;
                applied += 1;
            }
            Ok(applied)
        })?;
        tracing::info!(batch_id = %self.batch_id, applied, "server ids reconciled");
        Ok(applied)
    }
}
