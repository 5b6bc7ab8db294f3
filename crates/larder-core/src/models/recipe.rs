//! Recipe model

use serde::{Deserialize, Serialize};

use super::record::{new_record_id, now_millis, RecordKind, SyncRecord, Versioned};

/// A recipe, shareable between users and groupable into collections
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipe {
    /// Unique identifier
    pub id: String,
    /// Owning user id
    pub owner: String,
    /// Title
    pub name: String,
    /// Optional blurb
    #[serde(default)]
    pub description: Option<String>,
    /// Ingredient lines
    #[serde(default)]
    pub ingredients: Vec<String>,
    /// Preparation steps in order
    #[serde(default)]
    pub steps: Vec<String>,
    /// Number of servings
    #[serde(default)]
    pub servings: Option<u32>,
    /// Last update timestamp (Unix ms)
    pub last_updated: i64,
}

impl Recipe {
    /// Create an empty recipe owned by `owner`
    #[must_use]
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: new_record_id(),
            owner: owner.into(),
            name: name.into(),
            description: None,
            ingredients: Vec::new(),
            steps: Vec::new(),
            servings: None,
            last_updated: now_millis(),
        }
    }
}

impl Versioned for Recipe {
    fn id(&self) -> &str {
        &self.id
    }

    fn last_updated(&self) -> i64 {
        self.last_updated
    }
}

impl SyncRecord for Recipe {
    const KIND: RecordKind = RecordKind::Recipe;

    fn owner(&self) -> &str {
        &self.owner
    }
}
