//! Store trait definition.

use crate::error::{StorageError, StorageResult};
use crate::value::{RowSet, Statement};

/// A connection to a relational store.
///
/// Implementations wrap exactly one physical connection. The trait is
/// `Send` but not `Sync`: a connection is used by one task at a time, and
/// sharing goes through [`crate::SharedStore`].
///
/// # Invariants
///
/// - Every parameter in a [`Statement`] is bound, never spliced into SQL
/// - `insert` returns the key the store generated for the inserted row
/// - Between `begin` and `commit`, reads observe the connection's own writes
pub trait Store: Send {
    /// Runs a read request and returns the matching rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the request is malformed or the store fails.
    fn query(&mut self, stmt: &Statement) -> StorageResult<RowSet>;

    /// Runs a write request and returns the number of affected rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the write.
    fn update(&mut self, stmt: &Statement) -> StorageResult<usize>;

    /// Runs an insert and returns the store-generated key of the new row.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the write.
    fn insert(&mut self, stmt: &Statement) -> StorageResult<i64>;

    /// Runs a batch of parameterless statements (schema installation).
    ///
    /// # Errors
    ///
    /// Returns an error if any statement fails.
    fn execute_batch(&mut self, sql: &str) -> StorageResult<()>;

    /// Opens a transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if a transaction is already open or the store fails.
    fn begin(&mut self) -> StorageResult<()>;

    /// Commits the open transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NoTransaction`] if none is open.
    fn commit(&mut self) -> StorageResult<()>;

    /// Rolls back the open transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NoTransaction`] if none is open.
    fn rollback(&mut self) -> StorageResult<()>;
}

/// Runs `f` inside a transaction on `store`.
///
/// Commits when `f` returns `Ok`, rolls back otherwise. A failed rollback is
/// logged and the original error is returned.
pub fn with_transaction<T, E, F>(store: &mut dyn Store, f: F) -> Result<T, E>
where
    E: From<StorageError>,
    F: FnOnce(&mut dyn Store) -> Result<T, E>,
{
    store.begin()?;
    match f(store) {
        Ok(value) => {
            store.commit()?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = store.rollback() {
                tracing::warn!(error = %rollback_err, "rollback failed");
            }
            Err(err)
        }
    }
}
