//! Capabilities shared by every synchronizable record

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

/// Anything the reconciler can merge: a stable id plus a modification instant.
pub trait Versioned {
    /// Globally unique, immutable identifier
    fn id(&self) -> &str;

    /// Last modification timestamp (Unix ms)
    fn last_updated(&self) -> i64;
}

/// Which table family a record belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    /// Shopping lists
    List,
    /// Recipes
    Recipe,
    /// Collections of recipes
    Collection,
}

impl RecordKind {
    /// Human readable label used in logs and messages
    pub const fn label(self) -> &'static str {
        match self {
            Self::List => "list",
            Self::Recipe => "recipe",
            Self::Collection => "collection",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A record that can be persisted by the entity store and exchanged with clients.
pub trait SyncRecord: Versioned + Clone + Serialize + DeserializeOwned + Send {
    /// Family this record type is stored under
    const KIND: RecordKind;

    /// User id of the creating owner
    fn owner(&self) -> &str;
}

/// Generate a fresh time-sortable record id.
///
/// Clients normally mint their own ids; this is used for server-created records.
#[must_use]
pub fn new_record_id() -> String {
    Uuid::now_v7().to_string()
}

/// Current time in Unix milliseconds
#[must_use]
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
