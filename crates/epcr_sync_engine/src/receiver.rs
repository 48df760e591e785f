//! Acknowledgement receiver.

use crate::cancel::CancelToken;
use crate::error::SyncError;
use epcr_audit::AuditLog;
use epcr_sync_protocol::{read_frame, Acknowledgement};
use std::collections::BTreeSet;
use std::time::Duration;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;

const SOURCE: &str = "transfer.receiver";

/// Receiver lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverState {
    /// Waiting for acknowledgements.
    Listening,
    /// Every outstanding record was acknowledged.
    Complete,
    /// The stream ended early or misbehaved.
    Failed,
}

/// How a receiver run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiverOutcome {
    /// Every record was acknowledged by the center.
    Complete,
    /// The run failed; `synthesized` records got a synthetic acknowledgement.
    Failed {
        /// Why the run failed.
        reason: String,
        /// Number of synthetic acknowledgements emitted.
        synthesized: usize,
    },
}

impl ReceiverOutcome {
    /// Returns true for [`ReceiverOutcome::Complete`].
    pub fn is_complete(&self) -> bool {
        matches!(self, ReceiverOutcome::Complete)
    }
}

/// Drains acknowledgements from the center and correlates them to
/// outstanding records.
///
/// Each real acknowledgement for an outstanding record is forwarded once.
/// An acknowledgement for a record that is not outstanding is a protocol
/// error. When the stream closes, errors, times out or is cancelled before
/// every record was acknowledged, each remaining record gets one
/// [`Acknowledgement::failed`]. The read half is released when [`run`]
/// returns, whatever the outcome.
///
/// [`run`]: AckReceiver::run
pub struct AckReceiver<R> {
    reader: R,
    outstanding: BTreeSet<i64>,
    acknowledged: BTreeSet<i64>,
    timeout: Duration,
    cancel: CancelToken,
    audit: Option<AuditLog>,
    acks: mpsc::UnboundedSender<Acknowledgement>,
    state: ReceiverState,
}

impl<R: AsyncRead + Unpin> AckReceiver<R> {
    /// Creates a receiver expecting one acknowledgement per id in `expected`.
    pub fn new(
        reader: R,
        expected: impl IntoIterator<Item = i64>,
        timeout: Duration,
        cancel: CancelToken,
        acks: mpsc::UnboundedSender<Acknowledgement>,
    ) -> Self {
        Self {
            reader,
            outstanding: expected.into_iter().collect(),
            acknowledged: BTreeSet::new(),
            timeout,
            cancel,
            audit: None,
            acks,
            state: ReceiverState::Listening,
        }
    }

    /// Sets the audit log that receives failures.
    pub fn with_audit(mut self, audit: Option<AuditLog>) -> Self {
        self.audit = audit;
        self
    }

    /// Returns the current state.
    pub fn state(&self) -> ReceiverState {
        self.state
    }

    /// Returns the number of records still waiting for an acknowledgement.
    pub fn remaining(&self) -> usize {
        self.outstanding.len()
    }

    /// Runs until every record is acknowledged or the run fails.
    pub async fn run(mut self) -> ReceiverOutcome {
        let outcome = loop {
            if self.outstanding.is_empty() {
                self.state = ReceiverState::Complete;
                tracing::debug!(acknowledged = self.acknowledged.len(), "receiver complete");
                break ReceiverOutcome::Complete;
            }

            let result = match self.next_ack().await {
                Ok(ack) => self.accept(ack),
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                break self.fail(&e);
            }
        };

        let Self { reader, audit, .. } = self;
        drop(reader);
        tracing::debug!("acknowledgement stream released");
        if let Some(audit) = &audit {
            audit.record(SOURCE, "acknowledgement stream released");
        }
        outcome
    }

    async fn next_ack(&mut self) -> Result<Acknowledgement, SyncError> {
        let remaining = self.outstanding.len();
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(SyncError::Cancelled),
            read = tokio::time::timeout(self.timeout, read_frame::<_, Acknowledgement>(&mut self.reader)) => {
                match read {
                    Err(_) => Err(SyncError::Timeout(format!(
                        "no acknowledgement within {:?}",
                        self.timeout
                    ))),
                    Ok(Err(e)) => Err(e.into()),
                    Ok(Ok(None)) => Err(SyncError::Protocol(format!(
                        "acknowledgement stream closed with {remaining} outstanding"
                    ))),
                    Ok(Ok(Some(ack))) => Ok(ack),
                }
            }
        }
    }

    fn accept(&mut self, ack: Acknowledgement) -> Result<(), SyncError> {
        if !self.outstanding.remove(&ack.local_id) {
            let kind = if self.acknowledged.contains(&ack.local_id) {
                "duplicate"
            } else {
                "unmatched"
            };
            return Err(SyncError::Protocol(format!(
                "{kind} acknowledgement for record {}",
                ack.local_id
            )));
        }

        self.acknowledged.insert(ack.local_id);
        tracing::debug!(
            local_id = ack.local_id,
            server_id = ack.server_id,
            message = %ack.message,
            "acknowledgement received"
        );
        // A dropped handle only means nobody is listening any more.
        let _ = self.acks.send(ack);
        Ok(())
    }

    fn fail(&mut self, error: &SyncError) -> ReceiverOutcome {
        self.state = ReceiverState::Failed;
        let outstanding = std::mem::take(&mut self.outstanding);
        tracing::warn!(error = %error, outstanding = outstanding.len(), "receiver failed");
        if let Some(audit) = &self.audit {
            audit.record_error(
                SOURCE,
                format!("receiver failed with {} outstanding", outstanding.len()),
                error,
            );
        }

        for local_id in &outstanding {
            let _ = self.acks.send(Acknowledgement::failed(*local_id));
        }
        ReceiverOutcome::Failed {
            reason: error.to_string(),
            synthesized: outstanding.len(),
        }
    }
}
