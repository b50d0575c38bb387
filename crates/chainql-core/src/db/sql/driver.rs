//! SQL driver seam.
//!
//! The core talks to the database only through [`SqlExecutor`]. The SQLite
//! implementation backs embedded use and the test-suite; the statements the
//! core emits stay within the dialect subset PostgreSQL and SQLite share.

use crate::{db::sql::SqlError, error::InternalError, value::Value};
use rusqlite::{
    Connection, params_from_iter,
    types::{Value as SqliteValue, ValueRef},
};
use tracing::trace;

///
/// SqlValue
/// Raw column value as returned by the driver.
///

#[derive(Clone, Debug, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

///
/// SqlRow
///

pub trait SqlRow {
    fn column_count(&self) -> usize;

    fn value(&self, index: usize) -> Result<SqlValue, InternalError>;
}

///
/// SqlExecutor
///
/// Blocking statement execution on one connection. Implementations run a
/// call to completion or fail with a driver error.
///

pub trait SqlExecutor {
    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64, InternalError>;

    fn query(
        &self,
        sql: &str,
        params: &[Value],
        on_row: &mut dyn FnMut(&dyn SqlRow) -> Result<(), InternalError>,
    ) -> Result<(), InternalError>;
}

///
/// SqliteExecutor
///

pub struct SqliteExecutor {
    conn: Connection,
}

impl SqliteExecutor {
    pub fn open_in_memory() -> Result<Self, InternalError> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }

    #[must_use]
    pub const fn from_connection(conn: Connection) -> Self {
        Self { conn }
    }

    #[must_use]
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Run a batch of parameterless statements (schema setup, fixtures).
    pub fn execute_batch(&self, sql: &str) -> Result<(), InternalError> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }
}

impl SqlExecutor for SqliteExecutor {
    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64, InternalError> {
        trace!(sql, params = params.len(), "sqlite execute");

        let bound = bind_params(params)?;
        let changed = self.conn.execute(sql, params_from_iter(bound.iter()))?;

        Ok(changed as u64)
    }

    fn query(
        &self,
        sql: &str,
        params: &[Value],
        on_row: &mut dyn FnMut(&dyn SqlRow) -> Result<(), InternalError>,
    ) -> Result<(), InternalError> {
        trace!(sql, params = params.len(), "sqlite query");

        let bound = bind_params(params)?;
        let mut stmt = self.conn.prepare(sql)?;
        let columns = stmt.column_count();
        let mut rows = stmt.query(params_from_iter(bound.iter()))?;

        while let Some(row) = rows.next()? {
            on_row(&SqliteRow { row, columns })?;
        }

        Ok(())
    }
}

struct SqliteRow<'r, 's> {
    row: &'r rusqlite::Row<'s>,
    columns: usize,
}

impl SqlRow for SqliteRow<'_, '_> {
    fn column_count(&self) -> usize {
        self.columns
    }

    fn value(&self, index: usize) -> Result<SqlValue, InternalError> {
        let value = match self.row.get_ref(index)? {
            ValueRef::Null => SqlValue::Null,
            ValueRef::Integer(v) => SqlValue::Integer(v),
            ValueRef::Real(v) => SqlValue::Real(v),
            ValueRef::Text(v) => {
                let text = std::str::from_utf8(v).map_err(|err| SqlError::Driver {
                    message: format!("column {index} is not valid UTF-8: {err}"),
                })?;
                SqlValue::Text(text.to_string())
            }
            ValueRef::Blob(v) => SqlValue::Blob(v.to_vec()),
        };

        Ok(value)
    }
}

fn bind_params(params: &[Value]) -> Result<Vec<SqliteValue>, InternalError> {
    params.iter().map(bind_value).collect()
}

fn bind_value(value: &Value) -> Result<SqliteValue, InternalError> {
    let bound = match value {
        Value::Null => SqliteValue::Null,
        Value::Bool(v) => SqliteValue::Integer(i64::from(*v)),
        Value::Int(v) | Value::Rowid(v) => SqliteValue::Integer(*v),
        Value::Entity(e) => SqliteValue::Integer(e.rowid),
        Value::Text(v) => SqliteValue::Text(v.clone()),
        Value::Bytes(v) => SqliteValue::Blob(v.clone()),
        Value::Tuple(_) | Value::List(_) => {
            return Err(SqlError::UnbindableValue {
                value: value.to_string(),
            }
            .into());
        }
    };

    Ok(bound)
}
