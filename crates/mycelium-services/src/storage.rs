//! SQLite-backed persistence for mod logs, permissions and guild settings.

use parking_lot::Mutex;
use rusqlite::types::ValueRef;
use rusqlite::{params_from_iter, Connection};
use serde_json::{Map, Value as JsonValue};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, error, info};

pub use rusqlite::types::Value as SqlValue;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS mod_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    guild_id TEXT NOT NULL,
    moderator_id TEXT NOT NULL,
    target_id TEXT NOT NULL,
    action TEXT NOT NULL,
    reason TEXT,
    timestamp DATETIME DEFAULT CURRENT_TIMESTAMP
);
CREATE TABLE IF NOT EXISTS command_permissions (
    guild_id TEXT NOT NULL,
    command_name TEXT NOT NULL,
    permission_type TEXT NOT NULL,
    target_id TEXT NOT NULL,
    PRIMARY KEY (guild_id, command_name)
);
CREATE TABLE IF NOT EXISTS guild_settings (
    guild_id TEXT PRIMARY KEY,
    user_prefix TEXT,
    mod_prefix TEXT,
    log_channel TEXT,
    welcome_channel TEXT,
    auto_mod_enabled BOOLEAN DEFAULT FALSE,
    max_warnings INTEGER DEFAULT 3
);
CREATE TABLE IF NOT EXISTS user_warnings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    guild_id TEXT NOT NULL,
    user_id TEXT NOT NULL,
    moderator_id TEXT NOT NULL,
    reason TEXT NOT NULL,
    timestamp DATETIME DEFAULT CURRENT_TIMESTAMP
);
";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("failed to create database directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// One result row: column name to text value (or null)
pub type Row = Map<String, JsonValue>;

/// Shared handle to the bot database
///
/// All statements are parametrized. The connection is guarded by a mutex so
/// the worker thread and async command handlers can share one handle.
pub struct Storage {
    conn: Mutex<Connection>,
    runtime: Option<Handle>,
}

impl Storage {
    /// Open (or create) the database file and ensure the schema exists
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StorageError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        info!(target: "storage", "Opened database at {}", path.display());
        Ok(Self {
            conn: Mutex::new(conn),
            runtime: None,
        })
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            runtime: None,
        })
    }

    /// Runtime used for `execute_async`; without one those calls run inline
    pub fn with_runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    /// Run a statement and return the number of affected rows
    pub fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<usize, StorageError> {
        let conn = self.conn.lock();
        let changed = conn.execute(sql, params_from_iter(params.iter()))?;
        debug!(target: "storage", "execute affected {} row(s)", changed);
        Ok(changed)
    }

    /// Run a statement off the calling thread, logging any failure
    pub fn execute_async(self: &Arc<Self>, sql: String, params: Vec<SqlValue>) {
        let storage = Arc::clone(self);
        let job = move || {
            if let Err(e) = storage.execute(&sql, &params) {
                error!(target: "storage", "async execute failed: {}", e);
            }
        };

        match &self.runtime {
            Some(handle) => {
                handle.spawn_blocking(job);
            }
            None => job(),
        }
    }

    /// Run a query and return every row
    pub fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>, StorageError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

        let mut rows = stmt.query(params_from_iter(params.iter()))?;
        let mut results = Vec::new();
        while let Some(row) = rows.next()? {
            let mut record = Map::with_capacity(columns.len());
            for (idx, name) in columns.iter().enumerate() {
                record.insert(name.clone(), column_text(row.get_ref(idx)?));
            }
            results.push(record);
        }
        Ok(results)
    }

    /// First column of the first row, as text
    pub fn query_single(
        &self,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<Option<String>, StorageError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(sql)?;
        let mut rows = stmt.query(params_from_iter(params.iter()))?;
        match rows.next()? {
            Some(row) => match column_text(row.get_ref(0)?) {
                JsonValue::String(text) => Ok(Some(text)),
                _ => Ok(None),
            },
            None => Ok(None),
        }
    }

    pub fn exists(&self, sql: &str, params: &[SqlValue]) -> Result<bool, StorageError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(sql)?;
        let mut rows = stmt.query(params_from_iter(params.iter()))?;
        Ok(rows.next()?.is_some())
    }
}

fn column_text(value: ValueRef<'_>) -> JsonValue {
    match value {
        ValueRef::Null => JsonValue::Null,
        ValueRef::Integer(i) => JsonValue::String(i.to_string()),
        ValueRef::Real(f) => JsonValue::String(f.to_string()),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            JsonValue::String(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}
