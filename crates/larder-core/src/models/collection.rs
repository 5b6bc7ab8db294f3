//! Recipe collection model

use serde::{Deserialize, Serialize};

use super::record::{new_record_id, now_millis, RecordKind, SyncRecord, Versioned};

/// A named group of recipes. Membership lives in the permission store as
/// `(recipe id, collection id)` pairs, not on the record itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeCollection {
    /// Unique identifier
    pub id: String,
    /// Owning user id
    pub owner: String,
    /// Display name
    pub name: String,
    /// Optional blurb
    #[serde(default)]
    pub description: Option<String>,
    /// Last update timestamp (Unix ms)
    pub last_updated: i64,
}

impl RecipeCollection {
    /// Create an empty collection owned by `owner`
    #[must_use]
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: new_record_id(),
            owner: owner.into(),
            name: name.into(),
            description: None,
            last_updated: now_millis(),
        }
    }
}

impl Versioned for RecipeCollection {
    fn id(&self) -> &str {
        &self.id
    }

    fn last_updated(&self) -> i64 {
        self.last_updated
    }
}

impl SyncRecord for RecipeCollection {
    const KIND: RecordKind = RecordKind::Collection;

    fn owner(&self) -> &str {
        &self.owner
    }
}
