//! Parameter and row value types.

use crate::error::{StorageError, StorageResult};

/// A single relational value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// SQL NULL.
    Null,
    /// 64-bit signed integer.
    Integer(i64),
    /// Double precision float.
    Real(f64),
    /// UTF-8 text.
    Text(String),
}

impl Value {
    fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Integer(_) => "integer",
            Value::Real(_) => "real",
            Value::Text(_) => "text",
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Value::Text(v.clone())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// A parameterized SQL request.
///
/// Free text is always carried as a bound parameter; the SQL text itself is
/// a fixed string owned by the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    /// SQL text with positional `?N` placeholders.
    pub sql: String,
    /// Bound parameters, in placeholder order.
    pub params: Vec<Value>,
}

impl Statement {
    /// Creates a statement with no parameters.
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// Binds the next positional parameter.
    #[must_use]
    pub fn bind(mut self, value: impl Into<Value>) -> Self {
        self.params.push(value.into());
        self
    }
}

/// One result row.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    values: Vec<Value>,
}

impl Row {
    /// Creates a row from column values.
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    /// Returns the raw value in `column`.
    pub fn get(&self, column: usize) -> StorageResult<&Value> {
        self.values
            .get(column)
            .ok_or(StorageError::MissingColumn(column))
    }

    /// Returns a non-null integer.
    pub fn get_i64(&self, column: usize) -> StorageResult<i64> {
        match self.get(column)? {
            Value::Integer(v) => Ok(*v),
            other => Err(mismatch(column, "integer", other)),
        }
    }

    /// Returns a nullable integer.
    pub fn get_opt_i64(&self, column: usize) -> StorageResult<Option<i64>> {
        match self.get(column)? {
            Value::Null => Ok(None),
            Value::Integer(v) => Ok(Some(*v)),
            other => Err(mismatch(column, "integer", other)),
        }
    }

    /// Returns a non-null integer narrowed to `i32`.
    pub fn get_i32(&self, column: usize) -> StorageResult<i32> {
        self.get_opt_i32(column)?.ok_or_else(|| StorageError::TypeMismatch {
            column,
            expected: "integer",
            found: "null",
        })
    }

    /// Returns a nullable integer narrowed to `i32`.
    pub fn get_opt_i32(&self, column: usize) -> StorageResult<Option<i32>> {
        match self.get_opt_i64(column)? {
            None => Ok(None),
            Some(v) => i32::try_from(v)
                .map(Some)
                .map_err(|_| StorageError::TypeMismatch {
                    column,
                    expected: "32-bit integer",
                    found: "integer",
                }),
        }
    }

    /// Returns a nullable float. Integers are widened.
    pub fn get_opt_f64(&self, column: usize) -> StorageResult<Option<f64>> {
        match self.get(column)? {
            Value::Null => Ok(None),
            Value::Real(v) => Ok(Some(*v)),
            Value::Integer(v) => Ok(Some(*v as f64)),
            other => Err(mismatch(column, "real", other)),
        }
    }

    /// Returns a boolean stored as 0/1.
    pub fn get_bool(&self, column: usize) -> StorageResult<bool> {
        Ok(self.get_i64(column)? != 0)
    }

    /// Returns non-null text.
    pub fn get_text(&self, column: usize) -> StorageResult<String> {
        match self.get(column)? {
            Value::Text(v) => Ok(v.clone()),
            other => Err(mismatch(column, "text", other)),
        }
    }

    /// Returns nullable text.
    pub fn get_opt_text(&self, column: usize) -> StorageResult<Option<String>> {
        match self.get(column)? {
            Value::Null => Ok(None),
            Value::Text(v) => Ok(Some(v.clone())),
            other => Err(mismatch(column, "text", other)),
        }
    }

    /// Returns the number of columns.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

fn mismatch(column: usize, expected: &'static str, found: &Value) -> StorageError {
    StorageError::TypeMismatch {
        column,
        expected,
        found: found.kind(),
    }
}

/// The rows returned by a query, in store order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RowSet {
    rows: Vec<Row>,
}

impl RowSet {
    /// Creates a row set.
    pub fn new(rows: Vec<Row>) -> Self {
        Self { rows }
    }

    /// Returns the number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if the query matched nothing.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns the first row, if any.
    pub fn first(&self) -> Option<&Row> {
        self.rows.first()
    }

    /// Iterates over the rows.
    pub fn iter(&self) -> std::slice::Iter<'_, Row> {
        self.rows.iter()
    }
}

impl IntoIterator for RowSet {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

impl<'a> IntoIterator for &'a RowSet {
    type Item = &'a Row;
    type IntoIter = std::slice::Iter<'a, Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statement_binds_in_order() {
        let stmt = Statement::new("INSERT INTO t VALUES (?1, ?2, ?3)")
            .bind(7i64)
            .bind("text")
            .bind(None::<i64>);
        assert_eq!(
            stmt.params,
            vec![Value::Integer(7), Value::Text("text".into()), Value::Null]
        );
    }

    #[test]
    fn row_typed_access() {
        let row = Row::new(vec![
            Value::Integer(1),
            Value::Null,
            Value::Text("x".into()),
            Value::Integer(3),
        ]);
        assert_eq!(row.get_i64(0).unwrap(), 1);
        assert_eq!(row.get_opt_text(1).unwrap(), None);
        assert_eq!(row.get_text(2).unwrap(), "x");
        assert_eq!(row.get_opt_f64(3).unwrap(), Some(3.0));
        assert!(row.get_bool(0).unwrap());
    }

    #[test]
    fn row_type_mismatch() {
        let row = Row::new(vec![Value::Text("x".into())]);
        assert!(matches!(
            row.get_i64(0),
            Err(StorageError::TypeMismatch { column: 0, .. })
        ));
        assert!(matches!(row.get_i64(4), Err(StorageError::MissingColumn(4))));
    }
}
