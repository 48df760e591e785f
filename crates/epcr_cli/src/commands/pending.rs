//! Pending command implementation.

use epcr_core::{pending_records, LocalRecord};
use epcr_storage::SqliteStore;
use serde::Serialize;
use std::path::Path;

/// A record waiting for transfer.
#[derive(Debug, Serialize)]
pub struct PendingRecord {
    /// Local record id.
    pub local_id: i64,
    /// Packets the record carries.
    pub packets: Vec<&'static str>,
}

/// Runs the pending command.
pub fn run(db: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    if !db.exists() {
        return Err(format!("No store found at {:?}", db).into());
    }
    let mut store = SqliteStore::open(db)?;

    let mut records = Vec::new();
    for local_id in pending_records(&mut store)? {
        let record = LocalRecord::load(&mut store, local_id)?;
        records.push(PendingRecord {
            local_id,
            packets: record
                .packets
                .iter()
                .map(|p| p.kind().as_str())
                .collect(),
        });
    }

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        _ => {
            if records.is_empty() {
                println!("No records waiting for transfer");
            }
            for record in &records {
                println!("{:>8}  {}", record.local_id, record.packets.join(", "));
            }
            println!("{} pending", records.len());
        }
    }
    Ok(())
}
