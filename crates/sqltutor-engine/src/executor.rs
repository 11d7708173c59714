//! Query execution against the practice dataset.
//!
//! The [`QueryExecutor`] trait is the boundary to the dataset: it never
//! returns `Err` and never panics for bad query text. Every failure becomes
//! an [`ExecutionResult`] with `success == false` and the executor's message.
//!
//! Only read-only statements run. Anything that would modify the dataset is
//! rejected before it executes, so the reference solutions always see the
//! data the exercises were written against.

use std::path::Path;

use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Result, TutorError};
use crate::result::{CellValue, ExecutionResult};

/// Error reported for statements that would modify the dataset.
const READ_ONLY_MESSAGE: &str =
    "only read-only queries are allowed; the practice database cannot be modified";

/// Runs query text against the active dataset.
pub trait QueryExecutor: Send {
    /// Executes a query and returns its rows and columns, or the error as a value.
    fn execute(&self, query: &str) -> ExecutionResult;

    /// Names of the user tables in the dataset, used to ground generated exercises.
    fn table_names(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Description of one dataset table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableInfo {
    /// Table name.
    pub name: String,
    /// Columns in declaration order.
    pub columns: Vec<ColumnInfo>,
    /// Number of rows at the time of inspection.
    pub row_count: u64,
}

/// Description of one table column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    /// Column name.
    pub name: String,
    /// Declared type (may be empty in SQLite).
    pub data_type: String,
    /// Whether the column carries `NOT NULL`.
    pub not_null: bool,
    /// Default value expression, if any.
    pub default_value: Option<String>,
    /// Whether the column is part of the primary key.
    pub primary_key: bool,
}

impl ColumnInfo {
    /// Returns the column's constraints as display labels.
    #[must_use]
    pub fn constraints(&self) -> Vec<String> {
        let mut constraints = Vec::new();
        if self.primary_key {
            constraints.push("PRIMARY KEY".to_string());
        }
        if self.not_null {
            constraints.push("NOT NULL".to_string());
        }
        if let Some(default) = &self.default_value {
            constraints.push(format!("DEFAULT {default}"));
        }
        constraints
    }
}

/// SQLite-backed executor.
///
/// Owns its connection exclusively for the lifetime of the tutor.
#[derive(Debug)]
pub struct SqliteExecutor {
    conn: Connection,
}

impl SqliteExecutor {
    /// Opens an existing SQLite database file read-only.
    ///
    /// # Errors
    ///
    /// Returns `TutorError::DatabaseNotFound` if the file doesn't exist and
    /// `TutorError::Database` if SQLite cannot open it.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(TutorError::database_not_found(path));
        }
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        info!(path = %path.display(), "Opened practice database");
        Ok(Self { conn })
    }

    /// Builds an in-memory database by running an SQL script.
    pub fn from_script(sql: &str) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(sql)?;
        debug!(script_len = sql.len(), "Initialized in-memory practice database");
        Ok(Self { conn })
    }

    /// Describes every user table (internal `sqlite_` tables are skipped).
    pub fn tables(&self) -> Result<Vec<TableInfo>> {
        let names = self.user_table_names()?;
        let mut tables = Vec::with_capacity(names.len());

        for name in names {
            let quoted = quote_identifier(&name);

            let mut stmt = self.conn.prepare(&format!("PRAGMA table_info({quoted})"))?;
            let columns = stmt
                .query_map([], |row| {
                    Ok(ColumnInfo {
                        name: row.get(1)?,
                        data_type: row.get(2)?,
                        not_null: row.get::<_, i64>(3)? != 0,
                        default_value: row.get(4)?,
                        primary_key: row.get::<_, i64>(5)? != 0,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let row_count: i64 =
                self.conn
                    .query_row(&format!("SELECT COUNT(*) FROM {quoted}"), [], |row| row.get(0))?;

            tables.push(TableInfo {
                name,
                columns,
                row_count: u64::try_from(row_count).unwrap_or(0),
            });
        }

        Ok(tables)
    }

    fn user_table_names(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(names
            .into_iter()
            .filter(|name| !name.starts_with("sqlite_"))
            .collect())
    }

    fn try_execute(&self, query: &str) -> rusqlite::Result<ExecutionResult> {
        let mut stmt = self.conn.prepare(query)?;
        if !stmt.readonly() {
            return Ok(ExecutionResult::failure(READ_ONLY_MESSAGE));
        }

        let columns: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(String::from)
            .collect();
        let column_count = columns.len();

        let mut rows = stmt.query([])?;
        let mut collected = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(column_count);
            for index in 0..column_count {
                values.push(cell_from_ref(row.get_ref(index)?));
            }
            collected.push(values);
        }

        Ok(ExecutionResult::success(columns, collected))
    }
}

impl QueryExecutor for SqliteExecutor {
    fn execute(&self, query: &str) -> ExecutionResult {
        match self.try_execute(query) {
            Ok(result) => {
                debug!(rows = result.row_count(), "Query executed");
                result
            }
            Err(e) => {
                debug!(error = %e, "Query failed");
                ExecutionResult::failure(e.to_string())
            }
        }
    }

    fn table_names(&self) -> Vec<String> {
        self.user_table_names().unwrap_or_default()
    }
}

fn cell_from_ref(value: ValueRef<'_>) -> CellValue {
    match value {
        ValueRef::Null => CellValue::Null,
        ValueRef::Integer(i) => CellValue::Integer(i),
        ValueRef::Real(r) => CellValue::Real(r),
        ValueRef::Text(t) => CellValue::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => CellValue::Blob(b.to_vec()),
    }
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
