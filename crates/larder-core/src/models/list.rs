//! Shopping list model

use serde::{Deserialize, Serialize};

use super::record::{new_record_id, now_millis, RecordKind, SyncRecord, Versioned};

/// One line on a shopping list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListItem {
    /// What to buy
    pub name: String,
    /// Free-form amount ("2", "500 g")
    #[serde(default)]
    pub quantity: Option<String>,
    /// Whether the item has been picked up
    #[serde(default)]
    pub checked: bool,
}

/// A shopping list, shareable between users
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShoppingList {
    /// Unique identifier
    pub id: String,
    /// Owning user id
    pub owner: String,
    /// Display name
    pub name: String,
    /// Items in display order
    #[serde(default)]
    pub items: Vec<ListItem>,
    /// Last update timestamp (Unix ms)
    pub last_updated: i64,
}

impl ShoppingList {
    /// Create an empty list owned by `owner`
    #[must_use]
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: new_record_id(),
            owner: owner.into(),
            name: name.into(),
            items: Vec::new(),
            last_updated: now_millis(),
        }
    }

    /// Number of items not yet checked off
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.items.iter().filter(|item| !item.checked).count()
    }
}

impl Versioned for ShoppingList {
    fn id(&self) -> &str {
        &self.id
    }

    fn last_updated(&self) -> i64 {
        self.last_updated
    }
}

impl SyncRecord for ShoppingList {
    const KIND: RecordKind = RecordKind::List;

    fn owner(&self) -> &str {
        &self.owner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_new() {
        let list = ShoppingList::new("alice", "Groceries");
        assert_eq!(list.owner, "alice");
        assert!(list.items.is_empty());
        assert!(list.last_updated > 0);
    }

    #[test]
    fn test_list_wire_format_is_camel_case() {
        let json = r#"{"id":"L1","owner":"alice","name":"Groceries","items":[{"name":"milk"}],"lastUpdated":10}"#;
        let list: ShoppingList = serde_json::from_str(json).unwrap();
        assert_eq!(list.last_updated, 10);
        assert_eq!(list.items[0].quantity, None);
        assert!(!list.items[0].checked);

        let encoded = serde_json::to_string(&list).unwrap();
        assert!(encoded.contains("\"lastUpdated\":10"));
    }

    #[test]
    fn test_remaining() {
        let mut list = ShoppingList::new("alice", "Groceries");
        list.items.push(ListItem {
            name: "milk".into(),
            quantity: None,
            checked: true,
        });
        list.items.push(ListItem {
            name: "eggs".into(),
            quantity: Some("12".into()),
            checked: false,
        });
        assert_eq!(list.remaining(), 1);
    }
}
