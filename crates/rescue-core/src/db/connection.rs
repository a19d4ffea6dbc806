//! Database connection management

use crate::error::{Error, Result};
use libsql::{Builder, Connection, Database as LibSqlDatabase};
use std::path::{Path, PathBuf};

use super::migrations;

const IN_MEMORY: &str = ":memory:";

/// Database wrapper for the local libSQL queue file
pub struct Database {
    // Owns the file handle the connection was opened from
    _db: LibSqlDatabase,
    conn: Option<Connection>,
    path: Option<PathBuf>,
}

impl Database {
    /// Open a local database at the given path, creating it if it doesn't exist
    ///
    /// Runs migrations automatically.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let path_str = path.to_string_lossy().to_string();
        let (db, conn) = connect(&path_str).await?;

        let database = Self {
            _db: db,
            conn: Some(conn),
            path: Some(path),
        };
        database.configure().await?;
        database.migrate().await?;
        Ok(database)
    }

    /// Open an in-memory database (useful for testing)
    ///
    /// An in-memory database cannot be reopened once its connection is closed.
    pub async fn open_in_memory() -> Result<Self> {
        let (db, conn) = connect(IN_MEMORY).await?;

        let database = Self {
            _db: db,
            conn: Some(conn),
            path: None,
        };
        database.configure().await?;
        database.migrate().await?;
        Ok(database)
    }

    /// Configure `SQLite` for durability
    async fn configure(&self) -> Result<()> {
        let conn = self.connection()?;
        // journal_mode returns a row, which libsql reports as an error from execute
        conn.execute("PRAGMA journal_mode = WAL;", ()).await.ok();
        conn.execute("PRAGMA synchronous = FULL;", ()).await.ok();
        conn.execute("PRAGMA busy_timeout = 5000;", ()).await.ok();
        Ok(())
    }

    /// Run database migrations
    async fn migrate(&self) -> Result<()> {
        migrations::run(self.connection()?).await
    }

    /// Get a reference to the live connection
    pub fn connection(&self) -> Result<&Connection> {
        self.conn.as_ref().ok_or_else(|| {
            Error::ConnectionInvalidated("queue store connection is closed".to_string())
        })
    }

    /// Drop the live connection; the next operation sees it as invalidated
    pub fn close(&mut self) {
        if self.conn.take().is_some() {
            tracing::debug!("Closed queue store connection");
        }
    }

    /// Reopen the database file and replace the connection
    pub async fn reopen(&mut self) -> Result<()> {
        let Some(path) = self.path.clone() else {
            return Err(Error::StorageUnavailable(
                "in-memory queue store cannot be reopened".to_string(),
            ));
        };

        self.conn = None;
        let path_str = path.to_string_lossy().to_string();
        let (db, conn) = connect(&path_str).await?;
        self._db = db;
        self.conn = Some(conn);
        self.configure().await?;
        self.migrate().await?;
        tracing::info!("Reopened queue store at {}", path.display());
        Ok(())
    }

    /// Filesystem path of the database, `None` for in-memory stores
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Whether a live connection is held
    pub const fn is_open(&self) -> bool {
        self.conn.is_some()
    }
}

async fn connect(path: &str) -> Result<(LibSqlDatabase, Connection)> {
    let db = Builder::new_local(path)
        .build()
        .await
        .map_err(|error| unavailable(path, &error))?;
    let conn = db.connect().map_err(|error| unavailable(path, &error))?;
    Ok((db, conn))
}

fn unavailable(path: &str, error: &libsql::Error) -> Error {
    Error::StorageUnavailable(format!("failed to open queue store at {path}: {error}"))
}
