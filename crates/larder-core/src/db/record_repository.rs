//! Entity store for synchronizable records

use std::marker::PhantomData;

use crate::error::{Error, Result};
use crate::models::{RecordKind, SyncRecord};
use rusqlite::{params, Connection};

/// Trait for per-entity record storage
pub trait RecordRepository<R: SyncRecord> {
    /// Store a record that does not exist yet
    fn insert(&self, record: &R) -> Result<()>;

    /// Get a record by ID
    fn find(&self, id: &str) -> Result<Option<R>>;

    /// Overwrite an existing record
    fn update(&self, record: &R) -> Result<()>;

    /// Delete a record; returns whether it existed
    fn remove(&self, id: &str) -> Result<bool>;

    /// IDs of every record owned by `owner`, sorted
    fn find_owned(&self, owner: &str) -> Result<Vec<String>>;

    /// Delete every record of this kind; returns the number removed
    fn clear(&self) -> Result<usize>;
}

/// Table backing each record kind
pub(crate) const fn record_table(kind: RecordKind) -> &'static str {
    match kind {
        RecordKind::List => "lists",
        RecordKind::Recipe => "recipes",
        RecordKind::Collection => "collections",
    }
}

/// `SQLite` implementation of `RecordRepository`
///
/// Works on any connection, including an open transaction (`Transaction`
/// derefs to `Connection`).
pub struct SqliteRecordRepository<'a, R> {
    conn: &'a Connection,
    table: &'static str,
    _record: PhantomData<fn() -> R>,
}

impl<'a, R: SyncRecord> SqliteRecordRepository<'a, R> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self {
            conn,
            table: record_table(R::KIND),
            _record: PhantomData,
        }
    }

    fn decode(id: &str, payload: &str) -> Result<R> {
        let record: R = serde_json::from_str(payload)?;
        if record.id() != id {
            return Err(Error::Database(format!(
                "{} row {id} holds payload for {}",
                R::KIND,
                record.id()
            )));
        }
        Ok(record)
    }
}

impl<R: SyncRecord> RecordRepository<R> for SqliteRecordRepository<'_, R> {
    fn insert(&self, record: &R) -> Result<()> {
        let payload = serde_json::to_string(record)?;
        self.conn.execute(
            &format!(
                "INSERT INTO {} (id, owner, last_updated, payload) VALUES (?, ?, ?, ?)",
                self.table
            ),
            params![record.id(), record.owner(), record.last_updated(), payload],
        )?;
        Ok(())
    }

    fn find(&self, id: &str) -> Result<Option<R>> {
        let result = self.conn.query_row(
            &format!("SELECT payload FROM {} WHERE id = ?", self.table),
            params![id],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(payload) => Self::decode(id, &payload).map(Some),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn update(&self, record: &R) -> Result<()> {
        let payload = serde_json::to_string(record)?;
        let rows = self.conn.execute(
            &format!(
                "UPDATE {} SET owner = ?, last_updated = ?, payload = ? WHERE id = ?",
                self.table
            ),
            params![record.owner(), record.last_updated(), payload, record.id()],
        )?;

        if rows == 0 {
            return Err(Error::NotFound(record.id().to_string()));
        }
        Ok(())
    }

    fn remove(&self, id: &str) -> Result<bool> {
        let rows = self.conn.execute(
            &format!("DELETE FROM {} WHERE id = ?", self.table),
            params![id],
        )?;
        Ok(rows > 0)
    }

    fn find_owned(&self, owner: &str) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT id FROM {} WHERE owner = ? ORDER BY id",
            self.table
        ))?;

        let ids = stmt
            .query_map(params![owner], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;

        Ok(ids)
    }

    fn clear(&self) -> Result<usize> {
        let rows = self
            .conn
            .execute(&format!("DELETE FROM {}", self.table), [])?;
        Ok(rows)
    }
}
