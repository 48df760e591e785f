//! Init command implementation.

use epcr_core::schema;
use epcr_storage::SqliteStore;
use std::path::Path;
use tracing::info;

/// Creates the store at `db` and installs the schema.
pub fn run(db: &Path) -> Result<(), Box<dyn std::error::Error>> {
    info!("Initializing store at {:?}", db);

    let mut store = SqliteStore::open(db)?;
    schema::install(&mut store)?;
    store.close()?;

    println!("✓ Store ready");
    println!("  Path: {}", db.display());
    Ok(())
}
