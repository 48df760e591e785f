//! Relational schema shared by field units and the center.

use epcr_storage::{StorageResult, Store};

/// DDL for every table the packets read and write.
///
/// On a field unit `records.server_id` is filled in once the center has
/// acknowledged the record. On the center `records.origin_local_id` keeps
/// the id the field unit used.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS records (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    created_ms      INTEGER NOT NULL,
    completed       INTEGER NOT NULL DEFAULT 0,
    origin_local_id INTEGER,
    server_id       INTEGER
);

CREATE TABLE IF NOT EXISTS patient (
    record_id      INTEGER PRIMARY KEY REFERENCES records(id) ON DELETE CASCADE,
    personal_id    TEXT,
    first_names    TEXT,
    last_name      TEXT,
    street_address TEXT,
    postal_code    TEXT,
    municipality   TEXT,
    incomplete     INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS examination (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    record_id        INTEGER NOT NULL REFERENCES records(id) ON DELETE CASCADE,
    time             TEXT NOT NULL,
    pulse            INTEGER,
    systolic         INTEGER,
    diastolic        INTEGER,
    respiratory_rate INTEGER,
    spo2             INTEGER,
    gcs              INTEGER,
    temperature      REAL
);

CREATE TABLE IF NOT EXISTS examination_description (
    record_id   INTEGER PRIMARY KEY REFERENCES records(id) ON DELETE CASCADE,
    description TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS dose (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    record_id    INTEGER NOT NULL REFERENCES records(id) ON DELETE CASCADE,
    time         TEXT NOT NULL,
    medicine     TEXT NOT NULL,
    amount       TEXT NOT NULL,
    route        TEXT,
    caregiver_id INTEGER
);

CREATE TABLE IF NOT EXISTS dose_effect (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    dose_id     INTEGER NOT NULL REFERENCES dose(id) ON DELETE CASCADE,
    time        TEXT NOT NULL,
    description TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS dose_unregistered_caregiver (
    dose_id INTEGER PRIMARY KEY REFERENCES dose(id) ON DELETE CASCADE,
    name    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS matas (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    record_id INTEGER NOT NULL REFERENCES records(id) ON DELETE CASCADE,
    region    TEXT NOT NULL,
    x         INTEGER NOT NULL,
    y         INTEGER NOT NULL,
    finding   TEXT
);

CREATE TABLE IF NOT EXISTS statistics (
    record_id      INTEGER PRIMARY KEY REFERENCES records(id) ON DELETE CASCADE,
    dispatch_code  TEXT,
    urgency        TEXT,
    alarm_time     TEXT,
    arrival_time   TEXT,
    departure_time TEXT,
    destination    TEXT,
    distance_km    INTEGER
);

CREATE TABLE IF NOT EXISTS action (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    record_id   INTEGER NOT NULL REFERENCES records(id) ON DELETE CASCADE,
    time        TEXT NOT NULL,
    code        TEXT NOT NULL,
    description TEXT
);

CREATE INDEX IF NOT EXISTS idx_records_pending ON records(completed, server_id);
CREATE INDEX IF NOT EXISTS idx_dose_record ON dose(record_id);
"#;

/// Creates all tables that do not exist yet.
///
/// # Errors
///
/// Returns an error if the store rejects the DDL.
pub fn install(store: &mut dyn Store) -> StorageResult<()> {
    store.execute_batch(SCHEMA)
}

#[cfg(test)]
mod tests {
    use super::*;
    use epcr_storage::{SqliteStore, Statement};

    #[test]
    fn install_is_idempotent() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        install(&mut store).unwrap();
        install(&mut store).unwrap();

        let rows = store
            .query(&Statement::new(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
            ))
            .unwrap();
        assert_eq!(rows.first().unwrap().get_i64(0).unwrap(), 10);
    }
}
