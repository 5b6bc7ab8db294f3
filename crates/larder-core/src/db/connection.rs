//! Database connection management

use crate::error::{Error, Result};
use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

use super::migrations;

/// Connection tuning shared by every connection a [`Database`] hands out
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// How long a writer waits for a competing transaction before failing
    pub busy_timeout: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            busy_timeout: Duration::from_secs(5),
        }
    }
}

impl DatabaseConfig {
    /// Set the busy timeout
    #[must_use]
    pub const fn with_busy_timeout(mut self, busy_timeout: Duration) -> Self {
        self.busy_timeout = busy_timeout;
        self
    }
}

#[derive(Debug, Clone)]
enum Location {
    File(PathBuf),
    /// Shared-cache URI so every connection sees the same in-memory database
    Memory(String),
}

/// Handle to the backing store.
///
/// Holds the database location plus one migrated anchor connection. Work is
/// done on short-lived connections from [`Database::connect`], one per request,
/// so concurrent requests each get their own transaction.
pub struct Database {
    location: Location,
    config: DatabaseConfig,
    // Keeps shared-cache in-memory databases alive between requests.
    _anchor: Mutex<Connection>,
}

impl Database {
    /// Open a database file at the given path, creating it if it doesn't exist
    ///
    /// Runs migrations automatically.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_config(path, DatabaseConfig::default())
    }

    /// Open a database file with explicit connection tuning
    pub fn open_with_config(path: impl AsRef<Path>, config: DatabaseConfig) -> Result<Self> {
        let path = path.as_ref();
        if path.as_os_str() == ":memory:" {
            return Self::open_in_memory_with_config(config);
        }
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        Self::bootstrap(Location::File(path.to_path_buf()), config)
    }

    /// Open an in-memory database (useful for testing)
    pub fn open_in_memory() -> Result<Self> {
        Self::open_in_memory_with_config(DatabaseConfig::default())
    }

    fn open_in_memory_with_config(config: DatabaseConfig) -> Result<Self> {
        let uri = format!("file:larder-{}?mode=memory&cache=shared", Uuid::new_v4().simple());
        Self::bootstrap(Location::Memory(uri), config)
    }

    fn bootstrap(location: Location, config: DatabaseConfig) -> Result<Self> {
        let mut anchor = open_connection(&location, &config)?;
        migrations::run(&mut anchor)?;
        tracing::debug!(location = ?location, "Database ready");
        Ok(Self {
            location,
            config,
            _anchor: Mutex::new(anchor),
        })
    }

    /// Open a fresh connection to this database.
    ///
    /// The caller owns it for the duration of one unit of work.
    pub fn connect(&self) -> Result<Connection> {
        open_connection(&self.location, &self.config)
    }

    /// Whether this database lives only in memory
    pub const fn is_in_memory(&self) -> bool {
        matches!(self.location, Location::Memory(_))
    }

    /// Path of the database file, if file-backed
    pub fn path(&self) -> Option<&Path> {
        match &self.location {
            Location::File(path) => Some(path),
            Location::Memory(_) => None,
        }
    }
}

fn open_connection(location: &Location, config: &DatabaseConfig) -> Result<Connection> {
    let conn = match location {
        Location::File(path) => Connection::open(path)?,
        Location::Memory(uri) => Connection::open_with_flags(
            uri,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?,
    };
    configure(&conn, location, config)?;
    Ok(conn)
}

/// Configure `SQLite` for concurrent request-scoped transactions
fn configure(conn: &Connection, location: &Location, config: &DatabaseConfig) -> Result<()> {
    conn.busy_timeout(config.busy_timeout)?;
    if matches!(location, Location::File(_)) {
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        if !mode.eq_ignore_ascii_case("wal") {
            tracing::warn!("Journal mode is {mode}, expected WAL");
        }
        conn.pragma_update(None, "synchronous", "NORMAL")?;
    }
    conn.pragma_update(None, "foreign_keys", "ON")?;

    let enabled: i64 = conn.query_row("PRAGMA foreign_keys", [], |row| row.get(0))?;
    if enabled != 1 {
        return Err(Error::Database(
            "foreign key enforcement could not be enabled".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_open_in_memory() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.is_in_memory());
        assert!(db.path().is_none());
    }

    #[test]
    fn test_in_memory_connections_share_state() {
        let db = Database::open_in_memory().unwrap();

        let writer = db.connect().unwrap();
        writer
            .execute(
                "INSERT INTO users (id, display_name, created_at) VALUES ('alice', 'Alice', 1)",
                [],
            )
            .unwrap();
        drop(writer);

        let reader = db.connect().unwrap();
        let count: i64 = reader
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_in_memory_databases_are_isolated() {
        let first = Database::open_in_memory().unwrap();
        let second = Database::open_in_memory().unwrap();

        first
            .connect()
            .unwrap()
            .execute(
                "INSERT INTO users (id, display_name, created_at) VALUES ('alice', 'Alice', 1)",
                [],
            )
            .unwrap();

        let count: i64 = second
            .connect()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_open_file_creates_parent_dirs() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("nested").join("larder.db");

        let db = Database::open(&path).unwrap();
        assert!(!db.is_in_memory());
        assert_eq!(db.path(), Some(path.as_path()));
        assert!(path.exists());
    }

    #[test]
    fn test_connections_enforce_foreign_keys() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.connect().unwrap();
        let result = conn.execute(
            "INSERT INTO list_shares (list_id, user_id) VALUES ('missing', 'bob')",
            [],
        );
        assert!(result.is_err());
    }
}
