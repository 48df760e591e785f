//! Protocol messages for record transfer.

use epcr_core::{LocalRecord, Packet};
use serde::{Deserialize, Serialize};

/// Server id used when the center did not store a record.
pub const SENTINEL_SERVER_ID: i64 = -1;

/// Message of a positive acknowledgement.
pub const ACK_OK: &str = "OK";

/// Message of a synthetic acknowledgement emitted when a transfer fails
/// before the center answered.
pub const TRANSFER_FAILED: &str = "transfer failed";

/// Every packet of one record, as sent by the field unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PacketSet {
    /// The record's id on the field unit.
    pub local_id: i64,
    /// The record's packets.
    pub packets: Vec<Packet>,
}

impl PacketSet {
    /// Creates a packet set.
    pub fn new(local_id: i64, packets: Vec<Packet>) -> Self {
        Self { local_id, packets }
    }
}

impl From<LocalRecord> for PacketSet {
    fn from(record: LocalRecord) -> Self {
        Self::new(record.local_id, record.packets)
    }
}

impl From<PacketSet> for LocalRecord {
    fn from(set: PacketSet) -> Self {
        LocalRecord::new(set.local_id, set.packets)
    }
}

/// The center's answer to one packet set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Acknowledgement {
    /// Id of the record on the field unit.
    pub local_id: i64,
    /// Id assigned by the center, or [`SENTINEL_SERVER_ID`].
    pub server_id: i64,
    /// `"OK"` on success, otherwise a description of the failure.
    pub message: String,
}

impl Acknowledgement {
    /// A positive acknowledgement.
    pub fn ok(local_id: i64, server_id: i64) -> Self {
        Self {
            local_id,
            server_id,
            message: ACK_OK.to_string(),
        }
    }

    /// The center refused the record.
    pub fn rejected(local_id: i64, message: impl Into<String>) -> Self {
        Self {
            local_id,
            server_id: SENTINEL_SERVER_ID,
            message: message.into(),
        }
    }

    /// The transfer failed before the center answered for this record.
    pub fn failed(local_id: i64) -> Self {
        Self::rejected(local_id, TRANSFER_FAILED)
    }

    /// Returns true if the center stored the record.
    pub fn is_success(&self) -> bool {
        self.server_id != SENTINEL_SERVER_ID && self.message == ACK_OK
    }

    /// Returns true for acknowledgements synthesized on the field unit.
    pub fn is_synthetic(&self) -> bool {
        self.server_id == SENTINEL_SERVER_ID && self.message == TRANSFER_FAILED
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ack_constructors() {
        let ok = Acknowledgement::ok(101, 5001);
        assert!(ok.is_success());
        assert!(!ok.is_synthetic());

        let rejected = Acknowledgement::rejected(102, "medicine packet: invalid time");
        assert!(!rejected.is_success());
        assert!(!rejected.is_synthetic());
        assert_eq!(rejected.server_id, SENTINEL_SERVER_ID);

        let failed = Acknowledgement::failed(103);
        assert!(failed.is_synthetic());
        assert_eq!(failed.local_id, 103);
        assert_eq!(failed.message, TRANSFER_FAILED);
    }

    #[test]
    fn record_conversion_keeps_local_id() {
        let set = PacketSet::from(LocalRecord::new(7, Vec::new()));
        assert_eq!(set.local_id, 7);
        let record = LocalRecord::from(set);
        assert_eq!(record.local_id, 7);
    }
}
