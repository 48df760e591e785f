//! Serialized access to a single store connection.

use crate::error::StorageResult;
use crate::store::{with_transaction, Store};
use crate::value::{RowSet, Statement};
use crate::StorageError;
use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;

/// A cloneable handle to one physical store connection.
///
/// Every operation takes the connection lock, so two tasks holding clones
/// never interleave statements on the same connection. A multi-statement
/// unit that must not be interleaved (read-after-write on a generated key)
/// goes through [`SharedStore::transaction`], which holds the lock for the
/// whole closure.
#[derive(Clone)]
pub struct SharedStore {
    inner: Arc<Mutex<Box<dyn Store>>>,
}

impl SharedStore {
    /// Wraps a connection.
    pub fn new(store: Box<dyn Store>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(store)),
        }
    }

    /// Locks the connection for a sequence of operations.
    pub fn lock(&self) -> MutexGuard<'_, Box<dyn Store>> {
        self.inner.lock()
    }

    /// Runs a read request.
    pub fn query(&self, stmt: &Statement) -> StorageResult<RowSet> {
        self.inner.lock().query(stmt)
    }

    /// Runs a write request.
    pub fn update(&self, stmt: &Statement) -> StorageResult<usize> {
        self.inner.lock().update(stmt)
    }

    /// Runs an insert and returns the generated key.
    pub fn insert(&self, stmt: &Statement) -> StorageResult<i64> {
        self.inner.lock().insert(stmt)
    }

    /// Runs `f` in a transaction while holding the connection lock.
    pub fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        E: From<StorageError>,
        F: FnOnce(&mut dyn Store) -> Result<T, E>,
    {
        let mut guard = self.inner.lock();
        with_transaction(guard.as_mut(), f)
    }

    /// Returns the number of live handles to this connection.
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }
}

impl std::fmt::Debug for SharedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedStore")
            .field("handles", &self.handle_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SqliteStore;
    use std::thread;

    #[test]
    fn concurrent_writers_are_serialized() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store
            .execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY AUTOINCREMENT, n INTEGER)")
            .unwrap();
        let shared = SharedStore::new(Box::new(store));

        let handles: Vec<_> = (0..4i64)
            .map(|worker| {
                let shared = shared.clone();
                thread::spawn(move || {
                    for i in 0..25i64 {
                        shared
                            .transaction(|s| -> StorageResult<()> {
                                let id = s.insert(
                                    &Statement::new("INSERT INTO t (n) VALUES (?1)")
                                        .bind(worker * 100 + i),
                                )?;
                                let rows = s.query(
                                    &Statement::new("SELECT n FROM t WHERE id = ?1").bind(id),
                                )?;
                                assert_eq!(rows.first().unwrap().get_i64(0)?, worker * 100 + i);
                                Ok(())
                            })
                            .unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let rows = shared.query(&Statement::new("SELECT COUNT(*) FROM t")).unwrap();
        assert_eq!(rows.first().unwrap().get_i64(0).unwrap(), 100);
    }
}
