//! SQLite backend.
//!
//! Implements [`Connection`]/[`ConnectionSource`] over `sqlx`'s SQLite
//! driver. Each [`ConnectionSource::connect`] opens a dedicated driver
//! connection (no pool); the executor and statement cache own connection
//! lifecycle above this layer.
//!
//! Row materialization maps each declared column type to exactly one
//! [`Value`] kind through the fixed table in [`decode_column`]. A declared
//! type outside the table fails the whole query with
//! [`StorageError::UnsupportedColumnType`].

use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteArguments, SqliteConnectOptions, SqliteConnection, SqliteRow};
use sqlx::{Column, ConnectOptions, Connection as _, Row, TypeInfo, ValueRef};

use crate::connection::{Connection, ConnectionSource};
use crate::error::{Result, StorageError};
use crate::value::{FieldMap, Value};

/// Opens dedicated SQLite connections for one database file.
pub struct SqliteConnectionSource {
    options: SqliteConnectOptions,
}

impl SqliteConnectionSource {
    /// Source for a database URL such as `sqlite://catalog.db`. The file is
    /// created if missing.
    pub fn new(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        Ok(Self { options })
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::new(&format!("sqlite://{}", path.as_ref().display()))
    }
}

#[async_trait]
impl ConnectionSource for SqliteConnectionSource {
    async fn connect(&self) -> Result<Box<dyn Connection>> {
        let conn = self.options.connect().await?;
        Ok(Box::new(SqliteBackendConnection { conn }))
    }
}

struct SqliteBackendConnection {
    conn: SqliteConnection,
}

fn bind_params<'q>(
    sql: &'q str,
    params: &[Value],
) -> sqlx::query::Query<'q, sqlx::Sqlite, SqliteArguments<'q>> {
    let mut query = sqlx::query(sql);
    for value in params {
        query = match value {
            Value::Null => query.bind(None::<i64>),
            Value::Boolean(v) => query.bind(*v),
            Value::Integer(v) | Value::Timestamp(v) => query.bind(*v),
            Value::Float(v) => query.bind(*v),
            Value::Text(v) => query.bind(v.clone()),
            Value::Bytes(v) => query.bind(v.clone()),
        };
    }
    query
}

/// Fixed declared-type → value-kind mapping.
fn decode_column(row: &SqliteRow, index: usize, name: &str, sql_type: &str) -> Result<Value> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let value = match sql_type {
        "INTEGER" | "INT" | "BIGINT" => Value::Integer(row.try_get(index)?),
        "BOOLEAN" => Value::Boolean(row.try_get(index)?),
        "REAL" | "DOUBLE" | "FLOAT" => Value::Float(row.try_get(index)?),
        "TEXT" | "VARCHAR" => Value::Text(row.try_get(index)?),
        "BLOB" => Value::Bytes(row.try_get(index)?),
        "DATETIME" | "TIMESTAMP" => Value::Timestamp(row.try_get(index)?),
        other => {
            return Err(StorageError::UnsupportedColumnType {
                column: name.to_string(),
                sql_type: other.to_string(),
            })
        }
    };
    Ok(value)
}

fn materialize_row(row: &SqliteRow) -> Result<FieldMap> {
    let mut fields = FieldMap::new();
    for (index, column) in row.columns().iter().enumerate() {
        let value = decode_column(row, index, column.name(), column.type_info().name())?;
        fields.insert(column.name().to_string(), value);
    }
    Ok(fields)
}

#[async_trait]
impl Connection for SqliteBackendConnection {
    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64> {
        let result = bind_params(sql, params).execute(&mut self.conn).await?;
        Ok(result.rows_affected())
    }

    async fn fetch_all(&mut self, sql: &str, params: &[Value]) -> Result<Vec<FieldMap>> {
        let rows = bind_params(sql, params).fetch_all(&mut self.conn).await?;
        rows.iter().map(materialize_row).collect()
    }

    async fn fetch_scalar(&mut self, sql: &str, params: &[Value]) -> Result<i64> {
        let row = bind_params(sql, params).fetch_one(&mut self.conn).await?;
        Ok(row.try_get(0)?)
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.conn.close().await?;
        Ok(())
    }
}
