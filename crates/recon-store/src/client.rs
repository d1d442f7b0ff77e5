//! SQLite connection management and schema.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use recon_core::{ScanId, ScanStatus};
use rusqlite::Connection;

/// Errors from store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Scan not found: {0}")]
    NotFound(ScanId),

    #[error("Scan {scan_id} cannot move from {from} to {to}")]
    InvalidTransition {
        scan_id: ScanId,
        from: ScanStatus,
        to: ScanStatus,
    },

    #[error("Corrupt row: {0}")]
    Decode(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store connection lock poisoned")]
    Poisoned,
}

/// Thread-safe SQLite-backed scan store.
///
/// Clone is cheap (inner Arc).
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Open or create the database at `path`, creating parent directories.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;

        tracing::debug!(path = %path.display(), "Opened scan store");
        Ok(store)
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self, StoreError> {
        let store = Self {
            conn: Arc::new(Mutex::new(Connection::open_in_memory()?)),
        };
        store.init_schema()?;
        Ok(store)
    }

    pub(crate) fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS scans (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                target TEXT NOT NULL,
                scan_type TEXT NOT NULL,
                status TEXT NOT NULL,
                started_at TEXT NOT NULL,
                completed_at TEXT,
                config TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_scans_target ON scans(target, started_at);

            CREATE TABLE IF NOT EXISTS subdomains (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                scan_id INTEGER NOT NULL REFERENCES scans(id),
                subdomain TEXT NOT NULL,
                sources TEXT NOT NULL DEFAULT '[]',
                url TEXT,
                ip_address TEXT,
                status_code INTEGER,
                title TEXT,
                technologies TEXT NOT NULL DEFAULT '[]',
                discovered_at TEXT NOT NULL,
                UNIQUE(scan_id, subdomain)
            );

            CREATE TABLE IF NOT EXISTS vulnerabilities (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                scan_id INTEGER NOT NULL REFERENCES scans(id),
                target TEXT NOT NULL,
                template_id TEXT NOT NULL,
                name TEXT,
                severity TEXT NOT NULL,
                severity_rank INTEGER NOT NULL,
                description TEXT,
                matched_at TEXT,
                raw_output TEXT NOT NULL,
                discovered_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_vulns_scan ON vulnerabilities(scan_id, severity_rank);
            "#,
        )?;
        Ok(())
    }
}
