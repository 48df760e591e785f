//! Error types for store operations.

use thiserror::Error;

/// Result type for store operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The SQLite driver reported an error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The store could not be opened.
    #[error("cannot open store at {location}: {source}")]
    Open {
        /// Location that was being opened.
        location: String,
        /// Underlying driver error.
        #[source]
        source: rusqlite::Error,
    },

    /// A column held a value of an unexpected type.
    #[error("column {column}: expected {expected}, found {found}")]
    TypeMismatch {
        /// Zero-based column index.
        column: usize,
        /// Expected value kind.
        expected: &'static str,
        /// Kind actually found.
        found: &'static str,
    },

    /// A row had fewer columns than requested.
    #[error("column {0} out of range")]
    MissingColumn(usize),

    /// A write touched a different number of rows than required.
    #[error("write rejected: {0}")]
    Rejected(String),

    /// `commit` or `rollback` without an open transaction.
    #[error("no transaction in progress")]
    NoTransaction,

    /// The connection has been closed.
    #[error("store is closed")]
    Closed,
}

impl StorageError {
    /// Returns true if the error is a constraint violation reported by the store.
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            StorageError::Sqlite(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = StorageError::TypeMismatch {
            column: 2,
            expected: "integer",
            found: "text",
        };
        assert_eq!(err.to_string(), "column 2: expected integer, found text");
        assert_eq!(StorageError::Closed.to_string(), "store is closed");
    }
}
