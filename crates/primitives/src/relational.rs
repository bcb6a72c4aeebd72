//! Relational facade over SQLite
//!
//! `exec`/`query` with positional parameters. Both `?n` and `$n`
//! placeholders are accepted; `$n` is rewritten to SQLite's `?n`.
//! Statements run on the blocking pool under a single connection lock.

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use rusqlite::types::{FromSql, Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;
use trellis_core::{Error, Result, Value};

static DOLLAR_PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$(\d+)").expect("placeholder pattern is valid"));

fn backend(e: rusqlite::Error) -> Error {
    Error::backend(format!("sqlite: {}", e))
}

/// Rewrite `$n` placeholders to `?n`
pub fn rewrite_placeholders(sql: &str) -> String {
    DOLLAR_PLACEHOLDER.replace_all(sql, "?$1").into_owned()
}

/// Convert a document value into a SQL parameter.
///
/// Nested documents and arrays are stored as JSON text.
pub fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(*b as i64),
        Value::Int32(i) => SqlValue::Integer(*i as i64),
        Value::Int64(i) => SqlValue::Integer(*i),
        Value::Double(f) => SqlValue::Real(*f),
        Value::String(s) => SqlValue::Text(s.clone()),
        Value::Binary(b) => SqlValue::Blob(b.clone()),
        Value::ObjectId(id) => SqlValue::Text(id.to_hex()),
        Value::Document(_) | Value::Array(_) => SqlValue::Text(value.to_json().to_string()),
    }
}

/// Materialized query result.
///
/// Starts positioned before the first row; call [`Rows::next`] to advance.
#[derive(Debug, Default)]
pub struct Rows {
    columns: Vec<String>,
    rows: Vec<Vec<SqlValue>>,
    pos: Option<usize>,
}

impl Rows {
    /// Advance to the next row. Returns false when exhausted.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> bool {
        let next = self.pos.map(|p| p + 1).unwrap_or(0);
        self.pos = Some(next.min(self.rows.len()));
        next < self.rows.len()
    }

    /// Read column `index` of the current row
    pub fn get<T: FromSql>(&self, index: usize) -> Result<T> {
        let row = self.current()?;
        let value = row.get(index).ok_or_else(|| {
            Error::invalid_argument(format!("column {} out of range ({})", index, row.len()))
        })?;
        T::column_result(ValueRef::from(value))
            .map_err(|e| Error::type_mismatch(std::any::type_name::<T>(), e.to_string()))
    }

    /// Every column of the current row, in column order
    pub fn current(&self) -> Result<&[SqlValue]> {
        self.pos
            .and_then(|p| self.rows.get(p))
            .map(|r| r.as_slice())
            .ok_or_else(|| Error::invalid_argument("no current row; call next() first"))
    }

    /// Column names
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Total number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True if the query returned no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// SQL database handle
#[derive(Clone)]
pub struct SqlDatabase {
    conn: Arc<Mutex<Connection>>,
}

impl SqlDatabase {
    /// Open (or create) a database file
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref()).map_err(backend)?;
        debug!(target: "trellis::sql", path = ?path.as_ref(), "Opened database");
        Ok(Self::from_connection(conn))
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(backend)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        SqlDatabase {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Execute a statement. Returns the number of affected rows.
    pub async fn exec(&self, sql: &str, args: &[Value]) -> Result<u64> {
        let sql = rewrite_placeholders(sql);
        let params: Vec<SqlValue> = args.iter().map(to_sql).collect();
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock();
            conn.execute(&sql, params_from_iter(params))
                .map(|n| n as u64)
                .map_err(backend)
        })
        .await
        .map_err(|e| Error::backend(format!("sqlite task: {}", e)))?
    }

    /// Run a query and materialize its rows
    pub async fn query(&self, sql: &str, args: &[Value]) -> Result<Rows> {
        let sql = rewrite_placeholders(sql);
        let params: Vec<SqlValue> = args.iter().map(to_sql).collect();
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock();
            let mut stmt = conn.prepare(&sql).map_err(backend)?;
            let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
            let width = columns.len();
            let mut raw = stmt.query(params_from_iter(params)).map_err(backend)?;
            let mut rows = Vec::new();
            while let Some(row) = raw.next().map_err(backend)? {
                let mut values = Vec::with_capacity(width);
                for i in 0..width {
                    values.push(row.get::<_, SqlValue>(i).map_err(backend)?);
                }
                rows.push(values);
            }
            Ok(Rows {
                columns,
                rows,
                pos: None,
            })
        })
        .await
        .map_err(|e| Error::backend(format!("sqlite task: {}", e)))?
    }
}
