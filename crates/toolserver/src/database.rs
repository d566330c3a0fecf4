//! SQLite access for the database tools.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::types::ValueRef;
use rusqlite::{Connection, params};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::{Error, Result};

/// Output of an arbitrary SQL statement.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueryOutput {
    /// Rows of a statement that returns columns, one object per row.
    Rows(Vec<Map<String, Value>>),
    /// Statements without result columns (INSERT, UPDATE, DDL).
    Affected { rows_affected: usize },
}

/// One column of a table, as reported by `describe_table`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    pub nullable: bool,
    pub default: Option<String>,
    pub primary_key: bool,
}

/// SQLite-backed database shared by all tool handlers.
pub struct Database {
    conn: Mutex<Option<Connection>>,
}

impl Database {
    /// Open or create a database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        Ok(Self::from_connection(conn))
    }

    /// Create an in-memory database (useful for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(Some(conn)),
        }
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let guard = self.conn.lock().map_err(|_| Error::Poisoned)?;
        let conn = guard.as_ref().ok_or(Error::Closed)?;
        f(conn)
    }

    /// Run a batch of statements, discarding results.
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        self.with_conn(|conn| Ok(conn.execute_batch(sql)?))
    }

    /// Execute a single SQL statement.
    pub fn query(&self, sql: &str) -> Result<QueryOutput> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(sql)?;

            if stmt.column_count() == 0 {
                let rows_affected = stmt.execute([])?;
                return Ok(QueryOutput::Affected { rows_affected });
            }

            let names: Vec<String> = stmt
                .column_names()
                .into_iter()
                .map(String::from)
                .collect();

            let rows = stmt
                .query_map([], |row| {
                    let mut object = Map::with_capacity(names.len());
                    for (i, name) in names.iter().enumerate() {
                        object.insert(name.clone(), to_json(row.get_ref(i)?));
                    }
                    Ok(object)
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok(QueryOutput::Rows(rows))
        })
    }

    /// Names of all user tables, sorted.
    pub fn tables(&self) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT name FROM sqlite_master
                 WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
                 ORDER BY name",
            )?;
            let tables = stmt
                .query_map([], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<String>>>()?;
            Ok(tables)
        })
    }

    /// Column layout of `table`.
    pub fn describe(&self, table: &str) -> Result<Vec<Column>> {
        let columns = self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                r#"SELECT name, type, "notnull", dflt_value, pk
                   FROM pragma_table_info(?1) ORDER BY cid"#,
            )?;
            let columns = stmt
                .query_map(params![table], |row| {
                    Ok(Column {
                        name: row.get(0)?,
                        data_type: row.get(1)?,
                        nullable: row.get::<_, i64>(2)? == 0,
                        default: row.get(3)?,
                        primary_key: row.get::<_, i64>(4)? > 0,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(columns)
        })?;

        if columns.is_empty() {
            return Err(Error::TableNotFound(table.to_string()));
        }
        Ok(columns)
    }

    /// Close the underlying connection. Later calls fail with [`Error::Closed`].
    pub fn close(&self) -> Result<()> {
        let mut guard = self.conn.lock().map_err(|_| Error::Poisoned)?;
        if let Some(conn) = guard.take() {
            conn.close().map_err(|(_, e)| Error::Database(e))?;
        }
        Ok(())
    }
}

fn to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(text) => Value::String(String::from_utf8_lossy(text).into_owned()),
        ValueRef::Blob(bytes) => Value::String(bytes.iter().map(|b| format!("{b:02x}")).collect()),
    }
}
