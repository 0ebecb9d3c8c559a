//! SQLite database layer for the Waypost run state store.
//!
//! Uses rusqlite with WAL mode for concurrent read performance.
//! All database operations are executed via `tokio::task::spawn_blocking`
//! to avoid blocking the async runtime.

use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::error::EngineError;

/// Thread-safe handle to the SQLite database.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) a SQLite database at the given path.
    pub fn open(db_path: &str) -> Result<Self, EngineError> {
        let path = Path::new(db_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let conn = Connection::open(db_path)
            .map_err(|e| EngineError::Database(format!("Failed to open database: {}", e)))?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .map_err(|e| EngineError::Database(format!("Failed to set pragmas: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.initialize_tables()?;

        tracing::info!("SQLite database opened at: {}", db_path);
        Ok(db)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self, EngineError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| EngineError::Database(format!("Failed to open in-memory db: {}", e)))?;

        conn.execute_batch("PRAGMA foreign_keys=ON;")
            .map_err(|e| EngineError::Database(format!("Failed to set pragmas: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.initialize_tables()?;
        Ok(db)
    }

    /// Execute a closure with access to the database connection.
    /// Automatically handles locking and error conversion.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, EngineError>
    where
        F: FnOnce(&Connection) -> Result<T, rusqlite::Error>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| EngineError::Database(format!("Lock poisoned: {}", e)))?;
        f(&conn).map_err(|e| EngineError::Database(e.to_string()))
    }

    /// Execute a closure with access to the database connection (async-friendly).
    pub async fn with_conn_async<F, T>(&self, f: F) -> Result<T, EngineError>
    where
        F: FnOnce(&Connection) -> Result<T, rusqlite::Error> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || db.with_conn(f))
            .await
            .map_err(|e| EngineError::Database(format!("Task join error: {}", e)))?
    }

    /// Create all tables if they don't exist.
    fn initialize_tables(&self) -> Result<(), EngineError> {
        self.with_conn(|conn| {
            conn.execute_batch(
                "
                CREATE TABLE IF NOT EXISTS pathways (
                    pathway_id      TEXT PRIMARY KEY,
                    version         INTEGER NOT NULL DEFAULT 1,
                    name            TEXT NOT NULL,
                    description     TEXT NOT NULL DEFAULT '',
                    owner_agent_id  TEXT NOT NULL DEFAULT '',
                    pathway_json    TEXT NOT NULL,
                    created_at      INTEGER NOT NULL,
                    updated_at      INTEGER NOT NULL
                );

                CREATE TABLE IF NOT EXISTS pathruns (
                    pathrun_id      TEXT PRIMARY KEY,
                    owner_agent_id  TEXT NOT NULL,
                    pathway_id      TEXT NOT NULL,
                    pathway_json    TEXT NOT NULL,
                    can_take_over   INTEGER NOT NULL DEFAULT 1,
                    state           TEXT NOT NULL DEFAULT 'PENDING',
                    status_msg      TEXT NOT NULL DEFAULT '',
                    description     TEXT NOT NULL DEFAULT '',
                    inputs          TEXT NOT NULL DEFAULT '{}',
                    results         TEXT,
                    days_to_live    INTEGER NOT NULL DEFAULT 0,
                    created_at      INTEGER NOT NULL,
                    updated_at      INTEGER NOT NULL,
                    stopped_at      INTEGER
                );
                CREATE INDEX IF NOT EXISTS idx_pathruns_pathway ON pathruns(pathway_id);

                CREATE TABLE IF NOT EXISTS poststeps (
                    pathrun_id      TEXT NOT NULL,
                    poststep_id     INTEGER NOT NULL,
                    owner_agent_id  TEXT NOT NULL,
                    pathway_id      TEXT NOT NULL,
                    post_id         TEXT NOT NULL,
                    post_json       TEXT NOT NULL,
                    state           TEXT NOT NULL DEFAULT 'PENDING',
                    status_msg      TEXT NOT NULL DEFAULT '',
                    variables       TEXT NOT NULL DEFAULT '{}',
                    last_poststep   INTEGER,
                    next_poststep   INTEGER,
                    started_at      INTEGER NOT NULL,
                    stopped_at      INTEGER,
                    PRIMARY KEY (pathrun_id, poststep_id)
                );
                CREATE INDEX IF NOT EXISTS idx_poststeps_pathrun ON poststeps(pathrun_id);
                ",
            )
        })
    }
}
