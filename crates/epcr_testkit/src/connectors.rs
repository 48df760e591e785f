//! Store connectors with scripted failures.

use crate::fixtures::{memory_store, seed_scenario};
use epcr_storage::{StorageError, StorageResult, Store};
use epcr_sync_engine::{StoreConnector, StoreCredentials};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Refuses the first `failures` connection attempts, then opens an
/// in-memory store with the schema installed.
#[derive(Debug)]
pub struct ScriptedConnector {
    failures: u32,
    seed: bool,
    attempts: AtomicU32,
}

impl ScriptedConnector {
    /// Creates a connector that fails `failures` times before succeeding.
    pub fn new(failures: u32) -> Arc<Self> {
        Arc::new(Self {
            failures,
            seed: false,
            attempts: AtomicU32::new(0),
        })
    }

    /// Creates a connector that never succeeds.
    pub fn always_failing() -> Arc<Self> {
        Self::new(u32::MAX)
    }

    /// Like [`ScriptedConnector::new`], but the opened store holds the
    /// scenario records.
    pub fn seeded(failures: u32) -> Arc<Self> {
        Arc::new(Self {
            failures,
            seed: true,
            attempts: AtomicU32::new(0),
        })
    }

    /// Returns the number of connection attempts so far.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl StoreConnector for ScriptedConnector {
    fn connect(&self, credentials: &StoreCredentials) -> StorageResult<Box<dyn Store>> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.failures {
            return Err(StorageError::Rejected(format!(
                "{} refused connection attempt {attempt}",
                credentials.location
            )));
        }
        let mut store = memory_store();
        if self.seed {
            seed_scenario(&mut store);
        }
        Ok(Box::new(store))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::count_rows;

    #[test]
    fn fails_then_connects() {
        let connector = ScriptedConnector::new(2);
        let credentials = StoreCredentials::new("unit.db");
        assert!(connector.connect(&credentials).is_err());
        assert!(connector.connect(&credentials).is_err());
        assert!(connector.connect(&credentials).is_ok());
        assert_eq!(connector.attempts(), 3);
    }

    #[test]
    fn seeded_store_holds_scenario() {
        let connector = ScriptedConnector::seeded(0);
        let mut store = connector.connect(&StoreCredentials::new("unit.db")).unwrap();
        assert_eq!(count_rows(store.as_mut(), "records"), 2);
    }
}
