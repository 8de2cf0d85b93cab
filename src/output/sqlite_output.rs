//! SQLite output
//!
//! Each run gets a row in `runs`; every saved record becomes a row in
//! `records` referencing it. Finalizing the saver marks the run completed.

use crate::capability::{PageRecord, Saver};
use crate::output::{OutputError, OutputResult};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection};
use serde::Serialize;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id INTEGER NOT NULL REFERENCES runs(id),
    url TEXT NOT NULL,
    keys TEXT NOT NULL,
    title TEXT NOT NULL,
    fetched_at TEXT NOT NULL,
    saved_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_records_run ON records(run_id);
CREATE INDEX IF NOT EXISTS idx_records_url ON records(url);
"#;

/// Status of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

struct SqliteState {
    conn: Connection,
    finalized: bool,
}

/// Saver writing records into a SQLite database
///
/// Each saver owns one row of `runs`; once finalized that run is completed
/// and further saves fail with `OutputError::Finalized`.
pub struct SqliteSaver {
    state: Mutex<SqliteState>,
    run_id: i64,
}

impl SqliteSaver {
    /// Opens (or creates) the database and starts a new run
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    /// * `config_hash` - Hash of the configuration used for this run
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteSaver)` - Database ready, run row inserted
    /// * `Err(OutputError)` - Failed to open or initialize the database
    pub fn open(path: &Path, config_hash: &str) -> OutputResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            ",
        )?;
        Self::with_connection(conn, config_hash)
    }

    /// Creates an in-memory database (for testing)
    pub fn open_in_memory(config_hash: &str) -> OutputResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Self::with_connection(conn, config_hash)
    }

    fn with_connection(conn: Connection, config_hash: &str) -> OutputResult<Self> {
        conn.execute_batch(SCHEMA_SQL)?;
        conn.execute(
            "INSERT INTO runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![
                Utc::now().to_rfc3339(),
                config_hash,
                RunStatus::Running.to_db_string()
            ],
        )?;
        let run_id = conn.last_insert_rowid();
        tracing::debug!("Started run {} in SQLite output", run_id);

        Ok(Self {
            state: Mutex::new(SqliteState {
                conn,
                finalized: false,
            }),
            run_id,
        })
    }

    /// Returns the ID of the run this saver writes to
    pub fn run_id(&self) -> i64 {
        self.run_id
    }

    fn lock(&self) -> OutputResult<MutexGuard<'_, SqliteState>> {
        self.state
            .lock()
            .map_err(|e| OutputError::Write(format!("Failed to lock database: {}", e)))
    }

    fn insert<K: Serialize>(&self, url: &str, keys: &K, record: &PageRecord) -> OutputResult<()> {
        let keys = serde_json::to_string(keys)?;
        let state = self.lock()?;
        if state.finalized {
            return Err(OutputError::Finalized);
        }

        state.conn.execute(
            "INSERT INTO records (run_id, url, keys, title, fetched_at, saved_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                self.run_id,
                url,
                keys,
                record.title,
                record.fetched_at.to_rfc3339(),
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    /// Counts records stored for this run
    pub fn record_count(&self) -> OutputResult<u64> {
        let state = self.lock()?;
        let count: i64 = state.conn.query_row(
            "SELECT COUNT(*) FROM records WHERE run_id = ?1",
            params![self.run_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Reads the status of this run
    pub fn run_status(&self) -> OutputResult<Option<RunStatus>> {
        let state = self.lock()?;
        let status: String = state.conn.query_row(
            "SELECT status FROM runs WHERE id = ?1",
            params![self.run_id],
            |row| row.get(0),
        )?;
        Ok(RunStatus::from_db_string(&status))
    }
}

#[async_trait]
impl<K: Serialize + Send + Sync> Saver<K, PageRecord> for SqliteSaver {
    async fn save(&self, url: &str, keys: &K, record: &PageRecord) -> bool {
        match self.insert(url, keys, record) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Failed to save {} to SQLite: {}", url, e);
                false
            }
        }
    }

    async fn finalize(&self) -> OutputResult<()> {
        let mut state = self.lock()?;
        if state.finalized {
            return Err(OutputError::Finalized);
        }

        state.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2 WHERE id = ?3",
            params![
                RunStatus::Completed.to_db_string(),
                Utc::now().to_rfc3339(),
                self.run_id
            ],
        )?;
        state.finalized = true;
        Ok(())
    }
}
