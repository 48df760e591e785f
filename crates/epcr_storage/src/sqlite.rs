//! SQLite store backend.

use crate::error::{StorageError, StorageResult};
use crate::store::Store;
use crate::value::{Row, RowSet, Statement, Value};
use rusqlite::types::{ToSql, ToSqlOutput, Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection};
use std::path::Path;
use std::time::Duration;

/// How long a writer waits on a locked database file before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// A store backed by one SQLite connection.
///
/// # Example
///
/// ```rust
/// use epcr_storage::{SqliteStore, Statement, Store};
///
/// let mut store = SqliteStore::open_in_memory().unwrap();
/// store.execute_batch("CREATE TABLE t (v INTEGER)").unwrap();
/// let n = store.update(&Statement::new("INSERT INTO t VALUES (?1)").bind(5i64)).unwrap();
/// assert_eq!(n, 1);
/// ```
pub struct SqliteStore {
    conn: Connection,
    location: String,
}

impl SqliteStore {
    /// Opens (or creates) a database file.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Open`] if the file cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let location = path.as_ref().display().to_string();
        let conn = Connection::open(path.as_ref()).map_err(|source| StorageError::Open {
            location: location.clone(),
            source,
        })?;
        Self::configure(conn, location)
    }

    /// Opens a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if SQLite cannot allocate the database.
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory().map_err(|source| StorageError::Open {
            location: ":memory:".into(),
            source,
        })?;
        Self::configure(conn, ":memory:".into())
    }

    fn configure(conn: Connection, location: String) -> StorageResult<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self { conn, location })
    }

    /// Returns the location this store was opened from.
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Closes the connection, reporting any error from the driver.
    ///
    /// # Errors
    ///
    /// Returns an error if SQLite fails to finalize the connection.
    pub fn close(self) -> StorageResult<()> {
        self.conn.close().map_err(|(_, err)| StorageError::Sqlite(err))
    }
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("location", &self.location)
            .finish()
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(SqlValue::Null),
            Value::Integer(v) => ToSqlOutput::Owned(SqlValue::Integer(*v)),
            Value::Real(v) => ToSqlOutput::Owned(SqlValue::Real(*v)),
            Value::Text(v) => ToSqlOutput::Borrowed(ValueRef::Text(v.as_bytes())),
        })
    }
}

fn from_value_ref(column: usize, value: ValueRef<'_>) -> StorageResult<Value> {
    match value {
        ValueRef::Null => Ok(Value::Null),
        ValueRef::Integer(v) => Ok(Value::Integer(v)),
        ValueRef::Real(v) => Ok(Value::Real(v)),
        ValueRef::Text(bytes) => Ok(Value::Text(String::from_utf8_lossy(bytes).into_owned())),
        ValueRef::Blob(_) => Err(StorageError::TypeMismatch {
            column,
            expected: "text",
            found: "blob",
        }),
    }
}

impl Store for SqliteStore {
    fn query(&mut self, stmt: &Statement) -> StorageResult<RowSet> {
        let mut prepared = self.conn.prepare(&stmt.sql)?;
        let columns = prepared.column_count();
        let mut rows = prepared.query(params_from_iter(stmt.params.iter()))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(columns);
            for column in 0..columns {
                values.push(from_value_ref(column, row.get_ref(column)?)?);
            }
            out.push(Row::new(values));
        }
        Ok(RowSet::new(out))
    }

    fn update(&mut self, stmt: &Statement) -> StorageResult<usize> {
        Ok(self
            .conn
            .execute(&stmt.sql, params_from_iter(stmt.params.iter()))?)
    }

    fn insert(&mut self, stmt: &Statement) -> StorageResult<i64> {
        let changed = self.update(stmt)?;
        if changed != 1 {
            return Err(StorageError::Rejected(format!(
                "insert affected {changed} rows"
            )));
        }
        Ok(self.conn.last_insert_rowid())
    }

    fn execute_batch(&mut self, sql: &str) -> StorageResult<()> {
        Ok(self.conn.execute_batch(sql)?)
    }

    fn begin(&mut self) -> StorageResult<()> {
        Ok(self.conn.execute_batch("BEGIN IMMEDIATE")?)
    }

    fn commit(&mut self) -> StorageResult<()> {
        if self.conn.is_autocommit() {
            return Err(StorageError::NoTransaction);
        }
        Ok(self.conn.execute_batch("COMMIT")?)
    }

    fn rollback(&mut self) -> StorageResult<()> {
        if self.conn.is_autocommit() {
            return Err(StorageError::NoTransaction);
        }
        Ok(self.conn.execute_batch("ROLLBACK")?)
    }
}
