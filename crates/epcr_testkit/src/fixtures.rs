//! Test fixtures and store helpers.
//!
//! Provides stores with the record schema installed and the records used
//! across the workspace's transfer tests.

use epcr_core::{
    schema, Caregiver, Dose, Effect, LocalRecord, MedicinePacket, Packet, PatientPacket,
    StatisticsPacket, Urgency, WriteContext,
};
use epcr_storage::{SharedStore, SqliteStore, Statement, Store};
use std::path::PathBuf;
use tempfile::TempDir;

/// Local ids of the two-record scenario batch.
pub const SCENARIO_LOCAL_IDS: [i64; 2] = [101, 102];

/// First server id the scenario center assigns.
pub const SCENARIO_FIRST_SERVER_ID: i64 = 5001;

/// Opens an in-memory store with the schema installed.
pub fn memory_store() -> SqliteStore {
    let mut store = SqliteStore::open_in_memory().expect("Failed to open in-memory store");
    schema::install(&mut store).expect("Failed to install schema");
    store
}

/// Wraps [`memory_store`] in a shared handle.
pub fn shared_memory_store() -> SharedStore {
    SharedStore::new(Box::new(memory_store()))
}

/// Opens an in-memory central store whose next record id is
/// `first_server_id`.
pub fn central_store_starting_at(first_server_id: i64) -> SqliteStore {
    let mut store = memory_store();
    store
        .update(
            &Statement::new("INSERT INTO sqlite_sequence (name, seq) VALUES ('records', ?1)")
                .bind(first_server_id - 1),
        )
        .expect("Failed to seed record ids");
    store
}

/// A database file in a temporary directory, removed on drop.
pub struct TestStoreFile {
    path: PathBuf,
    _temp_dir: TempDir,
}

impl TestStoreFile {
    /// Creates the directory; the database file does not exist yet.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("epcr.db");
        Self {
            path,
            _temp_dir: temp_dir,
        }
    }

    /// Returns the database path.
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Returns the database path as a string.
    pub fn location(&self) -> String {
        self.path.display().to_string()
    }

    /// Opens the file with the schema installed.
    pub fn open(&self) -> SqliteStore {
        let mut store = SqliteStore::open(&self.path).expect("Failed to open store file");
        schema::install(&mut store).expect("Failed to install schema");
        store
    }
}

impl Default for TestStoreFile {
    fn default() -> Self {
        Self::new()
    }
}

/// Writes `packets` as a completed record with the given local id.
pub fn insert_record(store: &mut dyn Store, local_id: i64, packets: &[Packet]) {
    store
        .update(
            &Statement::new("INSERT INTO records (id, created_ms, completed) VALUES (?1, 0, 1)")
                .bind(local_id),
        )
        .expect("Failed to insert record");
    for packet in packets {
        packet
            .write(store, local_id, &WriteContext::plain())
            .expect("Failed to write packet");
    }
}

/// The two-record scenario batch.
///
/// Record 101 carries a patient and statistics; record 102 carries one dose
/// with one effect.
pub fn scenario_records() -> Vec<LocalRecord> {
    let patient = Packet::Patient(PatientPacket {
        personal_id: Some("010180-123A".into()),
        first_names: Some("Aino".into()),
        last_name: Some("Virtanen".into()),
        ..Default::default()
    });
    let statistics = Packet::Statistics(StatisticsPacket {
        dispatch_code: Some("703".into()),
        urgency: Some(Urgency::B),
        alarm_time: Some("10:02".into()),
        arrival_time: Some("10:11".into()),
        departure_time: Some("10:34".into()),
        destination: Some("Meilahti".into()),
        distance_km: Some(14),
    });
    let medicine = Packet::Medicine(MedicinePacket {
        doses: vec![Dose {
            time: "10:15".into(),
            medicine: "Paracetamol".into(),
            amount: "1 g".into(),
            route: Some("IV".into()),
            caregiver: Some(Caregiver::Registered(17)),
            effects: vec![Effect {
                time: "10:30".into(),
                description: "fever down".into(),
            }],
        }],
    });

    vec![
        LocalRecord::new(SCENARIO_LOCAL_IDS[0], vec![patient, statistics]),
        LocalRecord::new(SCENARIO_LOCAL_IDS[1], vec![medicine]),
    ]
}

/// Writes the scenario batch to `store` and returns its local ids.
pub fn seed_scenario(store: &mut dyn Store) -> [i64; 2] {
    for record in scenario_records() {
        insert_record(store, record.local_id, &record.packets);
    }
    SCENARIO_LOCAL_IDS
}

/// Returns the number of rows in `table`.
pub fn count_rows(store: &mut dyn Store, table: &str) -> i64 {
    store
        .query(&Statement::new(format!("SELECT COUNT(*) FROM {table}")))
        .expect("Failed to count rows")
        .first()
        .map(|row| row.get_i64(0).expect("Count is not an integer"))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use epcr_core::{pending_records, LocalRecord};

    #[test]
    fn scenario_is_pending_and_loadable() {
        let mut store = memory_store();
        let ids = seed_scenario(&mut store);
        assert_eq!(pending_records(&mut store).unwrap(), ids.to_vec());

        let loaded = LocalRecord::load(&mut store, 101).unwrap();
        assert_eq!(loaded, scenario_records()[0]);
    }

    #[test]
    fn central_store_assigns_from_the_given_id() {
        let mut store = central_store_starting_at(5001);
        let first = epcr_core::insert_received_record(&mut store, 101).unwrap();
        let second = epcr_core::insert_received_record(&mut store, 102).unwrap();
        assert_eq!((first, second), (5001, 5002));
    }

    #[test]
    fn file_store_persists() {
        let file = TestStoreFile::new();
        {
            let mut store = file.open();
            seed_scenario(&mut store);
        }
        let mut store = file.open();
        assert_eq!(count_rows(&mut store, "records"), 2);
    }
}
