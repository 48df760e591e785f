//! Record lifecycle on the field unit and the center.

use crate::error::{PacketError, PacketResult};
use crate::packet::{Packet, PacketKind, WriteContext};
use epcr_storage::{Statement, Store};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// A patient encounter together with its clinical packets.
///
/// `local_id` is the id the owning store uses for the record. Packets that
/// have no rows are simply not present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalRecord {
    /// Id of the record in the store it was loaded from.
    pub local_id: i64,
    /// Non-empty packets, in [`PacketKind::ALL`] order.
    pub packets: Vec<Packet>,
}

impl LocalRecord {
    /// Creates a record with the given packets.
    pub fn new(local_id: i64, packets: Vec<Packet>) -> Self {
        Self { local_id, packets }
    }

    /// Loads every packet of `local_id`.
    ///
    /// # Errors
    ///
    /// Returns [`PacketError::UnknownRecord`] if there is no such record.
    pub fn load(store: &mut dyn Store, local_id: i64) -> PacketResult<Self> {
        let exists = store.query(&Statement::new("SELECT id FROM records WHERE id = ?1").bind(local_id))?;
        if exists.is_empty() {
            return Err(PacketError::UnknownRecord(local_id));
        }

        let mut packets = Vec::new();
        for kind in PacketKind::ALL {
            if let Some(packet) = Packet::load(kind, store, local_id)? {
                packets.push(packet);
            }
        }
        Ok(Self { local_id, packets })
    }

    /// Returns the packet of `kind`, if present.
    pub fn packet(&self, kind: PacketKind) -> Option<&Packet> {
        self.packets.iter().find(|p| p.kind() == kind)
    }

    /// Writes every packet under `record_id`. Returns rows written.
    ///
    /// Run inside a transaction to make the record atomic.
    ///
    /// # Errors
    ///
    /// Returns the first packet error; packets after it are not written.
    pub fn write_packets(
        &self,
        store: &mut dyn Store,
        record_id: i64,
        ctx: &WriteContext<'_>,
    ) -> PacketResult<usize> {
        let mut written = 0;
        for packet in &self.packets {
            written += packet.write(store, record_id, ctx)?;
        }
        Ok(written)
    }
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

/// Creates an open record on the field unit and returns its local id.
///
/// # Errors
///
/// Returns an error if the store rejects the insert.
pub fn create_record(store: &mut dyn Store) -> PacketResult<i64> {
    Ok(store.insert(&Statement::new("INSERT INTO records (created_ms) VALUES (?1)").bind(now_ms()))?)
}

/// Creates a record on the center for an inbound packet set and returns the
/// assigned server id.
///
/// # Errors
///
/// Returns an error if the store rejects the insert.
pub fn insert_received_record(store: &mut dyn Store, origin_local_id: i64) -> PacketResult<i64> {
    Ok(store.insert(
        &Statement::new(
            "INSERT INTO records (created_ms, completed, origin_local_id) VALUES (?1, 1, ?2)",
        )
        .bind(now_ms())
        .bind(origin_local_id),
    )?)
}

/// Marks a record as finished, making it eligible for transfer.
///
/// # Errors
///
/// Returns [`PacketError::UnknownRecord`] if there is no such record.
pub fn mark_completed(store: &mut dyn Store, local_id: i64) -> PacketResult<()> {
    let changed = store.update(
        &Statement::new("UPDATE records SET completed = 1 WHERE id = ?1").bind(local_id),
    )?;
    if changed == 0 {
        return Err(PacketError::UnknownRecord(local_id));
    }
    Ok(())
}

/// Returns completed records the center has not acknowledged yet, oldest first.
///
/// # Errors
///
/// Returns an error if the store query fails.
pub fn pending_records(store: &mut dyn Store) -> PacketResult<Vec<i64>> {
    let rows = store.query(&Statement::new(
        "SELECT id FROM records WHERE completed = 1 AND server_id IS NULL ORDER BY id",
    ))?;
    let mut ids = Vec::with_capacity(rows.len());
    for row in &rows {
        ids.push(row.get_i64(0)?);
    }
    Ok(ids)
}

/// Stores the id the center assigned to a local record.
///
/// # Errors
///
/// Returns [`PacketError::UnknownRecord`] if there is no such record.
pub fn mark_transferred(store: &mut dyn Store, local_id: i64, server_id: i64) -> PacketResult<()> {
    let changed = store.update(
        &Statement::new("UPDATE records SET server_id = ?2 WHERE id = ?1")
            .bind(local_id)
            .bind(server_id),
    )?;
    if changed == 0 {
        return Err(PacketError::UnknownRecord(local_id));
    }
    Ok(())
}

/// Returns the center-assigned id of a local record, if acknowledged.
///
/// # Errors
///
/// Returns [`PacketError::UnknownRecord`] if there is no such record.
pub fn server_id_of(store: &mut dyn Store, local_id: i64) -> PacketResult<Option<i64>> {
    let rows = store.query(&Statement::new("SELECT server_id FROM records WHERE id = ?1").bind(local_id))?;
    match rows.first() {
        Some(row) => Ok(row.get_opt_i64(0)?),
        None => Err(PacketError::UnknownRecord(local_id)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{Caregiver, Dose, Effect, MedicinePacket, PatientPacket, StatisticsPacket};
    use crate::schema;
    use epcr_storage::{with_transaction, SqliteStore};

    fn store() -> SqliteStore {
        let mut store = SqliteStore::open_in_memory().unwrap();
        schema::install(&mut store).unwrap();
        store
    }

    #[test]
    fn pending_lifecycle() {
        let mut store = store();
        let a = create_record(&mut store).unwrap();
        let b = create_record(&mut store).unwrap();
        assert!(pending_records(&mut store).unwrap().is_empty());

        mark_completed(&mut store, a).unwrap();
        mark_completed(&mut store, b).unwrap();
        assert_eq!(pending_records(&mut store).unwrap(), vec![a, b]);

        mark_transferred(&mut store, a, 5001).unwrap();
        assert_eq!(pending_records(&mut store).unwrap(), vec![b]);
        assert_eq!(server_id_of(&mut store, a).unwrap(), Some(5001));
        assert_eq!(server_id_of(&mut store, b).unwrap(), None);
    }

    #[test]
    fn unknown_record() {
        let mut store = store();
        assert!(matches!(
            LocalRecord::load(&mut store, 42),
            Err(PacketError::UnknownRecord(42))
        ));
        assert!(matches!(
            mark_transferred(&mut store, 42, 1),
            Err(PacketError::UnknownRecord(42))
        ));
    }

    #[test]
    fn record_without_packets_loads_empty() {
        let mut store = store();
        let id = create_record(&mut store).unwrap();
        let record = LocalRecord::load(&mut store, id).unwrap();
        assert!(record.packets.is_empty());
    }

    #[test]
    fn failed_packet_rolls_back_whole_record() {
        let mut store = store();
        let record = LocalRecord::new(
            0,
            vec![
                Packet::Patient(PatientPacket {
                    last_name: Some("Korhonen".into()),
                    ..Default::default()
                }),
                Packet::Medicine(MedicinePacket {
                    doses: vec![Dose {
                        time: "7:5".into(),
                        medicine: "Oxygen".into(),
                        amount: "10 l/min".into(),
                        route: None,
                        caregiver: Some(Caregiver::Registered(1)),
                        effects: vec![Effect {
                            time: "07:10".into(),
                            description: "SpO2 up".into(),
                        }],
                    }],
                }),
                Packet::Statistics(StatisticsPacket::default()),
            ],
        );

        let result = with_transaction(&mut store, |s| -> PacketResult<i64> {
            let id = insert_received_record(s, 101)?;
            record.write_packets(s, id, &WriteContext::plain())?;
            Ok(id)
        });
        assert!(result.unwrap_err().is_validation());

        let rows = store
            .query(&Statement::new("SELECT COUNT(*) FROM patient"))
            .unwrap();
        assert_eq!(rows.first().unwrap().get_i64(0).unwrap(), 0);
        let rows = store
            .query(&Statement::new("SELECT COUNT(*) FROM records"))
            .unwrap();
        assert_eq!(rows.first().unwrap().get_i64(0).unwrap(), 0);
    }
}
