//! User model

use serde::{Deserialize, Serialize};

use super::record::{new_record_id, now_millis};

/// An account that can own and hold records
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Unique identifier, used as permission holder
    pub id: String,
    /// Name shown to other holders
    pub display_name: String,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
}

impl User {
    /// Create a user with a generated id
    #[must_use]
    pub fn new(display_name: impl Into<String>) -> Self {
        Self::with_id(new_record_id(), display_name)
    }

    /// Create a user with a caller-chosen id
    #[must_use]
    pub fn with_id(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            created_at: now_millis(),
        }
    }
}
