//! Writes inbound packet sets to the central store.

use epcr_audit::AuditLog;
use epcr_core::{insert_received_record, IdentityLookup, PacketResult, WriteContext};
use epcr_storage::SharedStore;
use epcr_sync_protocol::{Acknowledgement, PacketSet};
use std::sync::Arc;

/// Rejection message for records that failed for reasons other than
/// validation. Details go to the audit log only.
pub const STORE_FAILED: &str = "record could not be stored";

const SOURCE: &str = "center.writer";

/// Stores packet sets and produces their acknowledgements.
#[derive(Clone)]
pub struct RecordWriter {
    store: SharedStore,
    lookup: Option<Arc<dyn IdentityLookup>>,
    audit: Option<AuditLog>,
}

impl RecordWriter {
    /// Creates a writer for the central store.
    pub fn new(store: SharedStore) -> Self {
        Self {
            store,
            lookup: None,
            audit: None,
        }
    }

    /// Enriches patient packets from `lookup`.
    pub fn with_lookup(mut self, lookup: Arc<dyn IdentityLookup>) -> Self {
        self.lookup = Some(lookup);
        self
    }

    /// Sets the audit log that receives store failures.
    pub fn with_audit(mut self, audit: AuditLog) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Returns the central store.
    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// Stores `set` as a new record and returns the acknowledgement.
    ///
    /// The record and all its packets commit together or not at all.
    pub fn write(&self, set: &PacketSet) -> Acknowledgement {
        let ctx = match &self.lookup {
            Some(lookup) => WriteContext::with_lookup(lookup.as_ref()),
            None => WriteContext::plain(),
        };

        let result = self.store.transaction(|s| -> PacketResult<i64> {
            let server_id = insert_received_record(s, set.local_id)?;
            for packet in &set.packets {
                packet.write(s, server_id, &ctx)?;
            }
            Ok(server_id)
        });

        match result {
            Ok(server_id) => {
                tracing::debug!(local_id = set.local_id, server_id, "record stored");
                Acknowledgement::ok(set.local_id, server_id)
            }
            Err(e) if e.is_validation() => {
                tracing::debug!(local_id = set.local_id, error = %e, "record rejected");
                Acknowledgement::rejected(set.local_id, e.to_string())
            }
            Err(e) => {
                tracing::error!(local_id = set.local_id, error = %e, "record could not be stored");
                if let Some(audit) = &self.audit {
                    audit.record_error(
                        SOURCE,
                        format!("record {} from field unit could not be stored", set.local_id),
                        &e,
                    );
                }
                Acknowledgement::rejected(set.local_id, STORE_FAILED)
            }
        }
    }
}

impl std::fmt::Debug for RecordWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordWriter")
            .field("store", &self.store)
            .field("lookup", &self.lookup.is_some())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use epcr_audit::{LogConfig, LogService, MemorySink};
    use epcr_core::{
        schema, server_id_of, Caregiver, Dose, Effect, IdentityRecord, LocalRecord, MapLookup,
        MedicinePacket, Packet, PacketKind, PatientPacket,
    };
    use epcr_storage::{SqliteStore, Statement};
    use epcr_sync_protocol::SENTINEL_SERVER_ID;

    fn central_store() -> SharedStore {
        let mut store = SqliteStore::open_in_memory().unwrap();
        schema::install(&mut store).unwrap();
        SharedStore::new(Box::new(store))
    }

    fn count(store: &SharedStore, table: &str) -> i64 {
        store
            .query(&Statement::new(format!("SELECT COUNT(*) FROM {table}")))
            .unwrap()
            .first()
            .unwrap()
            .get_i64(0)
            .unwrap()
    }

    fn medicine(time: &str) -> Packet {
        Packet::Medicine(MedicinePacket {
            doses: vec![Dose {
                time: time.into(),
                medicine: "Morphine".into(),
                amount: "5 mg".into(),
                route: Some("IV".into()),
                caregiver: Some(Caregiver::Unregistered("Locum Medic".into())),
                effects: vec![Effect {
                    time: "10:20".into(),
                    description: "pain 8 -> 4".into(),
                }],
            }],
        })
    }

    #[test]
    fn stored_record_gets_its_own_server_id() {
        let store = central_store();
        let writer = RecordWriter::new(store.clone());

        let ack = writer.write(&PacketSet::new(101, vec![medicine("10:05")]));
        assert!(ack.is_success());
        assert_eq!(ack.local_id, 101);

        let server_id = ack.server_id;
        let record = LocalRecord::load(store.lock().as_mut(), server_id).unwrap();
        assert_eq!(record.packets, vec![medicine("10:05")]);
        assert_eq!(server_id_of(store.lock().as_mut(), server_id).unwrap(), None);

        let origin = store
            .query(&Statement::new("SELECT origin_local_id FROM records WHERE id = ?1").bind(server_id))
            .unwrap();
        assert_eq!(origin.first().unwrap().get_i64(0).unwrap(), 101);
    }

    #[test]
    fn validation_failure_rolls_back_and_reports_the_field() {
        let store = central_store();
        let writer = RecordWriter::new(store.clone());

        let ack = writer.write(&PacketSet::new(
            7,
            vec![
                Packet::Patient(PatientPacket::default()),
                medicine("25:00"),
            ],
        ));
        assert_eq!(ack.server_id, SENTINEL_SERVER_ID);
        assert!(ack.message.contains("medicine"), "{}", ack.message);
        assert!(!ack.is_synthetic());
        assert_eq!(count(&store, "records"), 0);
        assert_eq!(count(&store, "patient"), 0);
    }

    #[test]
    fn store_failure_is_logged_and_rejected_generically() {
        let store = central_store();
        store
            .update(&Statement::new("DROP TABLE dose_effect"))
            .unwrap();
        let sink = MemorySink::new();
        let mut service = LogService::new(Box::new(sink.clone()), LogConfig::default());
        service.start().unwrap();
        let writer = RecordWriter::new(store.clone()).with_audit(service.handle());

        let ack = writer.write(&PacketSet::new(9, vec![medicine("10:05")]));
        service.stop().unwrap();

        assert_eq!(ack.message, STORE_FAILED);
        assert_eq!(count(&store, "records"), 0);
        let entries = sink.entries();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].is_error());
        assert_eq!(entries[0].source, SOURCE);
    }

    #[test]
    fn patient_is_enriched_from_registry() {
        let store = central_store();
        let mut registry = MapLookup::new();
        registry.insert(
            "010180-123A",
            IdentityRecord {
                last_name: Some("Virtanen".into()),
                municipality: Some("Espoo".into()),
                ..Default::default()
            },
        );
        let writer = RecordWriter::new(store.clone()).with_lookup(Arc::new(registry));

        let ack = writer.write(&PacketSet::new(
            1,
            vec![Packet::Patient(PatientPacket {
                personal_id: Some("010180-123A".into()),
                ..Default::default()
            })],
        ));
        assert!(ack.is_success());

        let record = LocalRecord::load(store.lock().as_mut(), ack.server_id).unwrap();
        match record.packet(PacketKind::Patient) {
            Some(Packet::Patient(p)) => {
                assert_eq!(p.last_name.as_deref(), Some("Virtanen"));
                assert!(!p.incomplete);
            }
            other => panic!("unexpected packet {other:?}"),
        }
    }
}
