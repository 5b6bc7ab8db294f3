//! Permission model

use serde::{Deserialize, Serialize};
use std::fmt;

/// An access-grant pair.
///
/// For shares, `object` is a record id and `holder` a user id. For collection
/// membership, `object` is the contained recipe id and `holder` the collection id.
/// Equality is by the pair; there is no independent identity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Permission {
    /// Record the grant applies to
    pub object: String,
    /// User or container holding the grant
    pub holder: String,
}

impl Permission {
    /// Create a permission pair
    #[must_use]
    pub fn new(object: impl Into<String>, holder: impl Into<String>) -> Self {
        Self {
            object: object.into(),
            holder: holder.into(),
        }
    }

    /// Whether either endpoint is named by `id`
    #[must_use]
    pub fn touches(&self, id: &str) -> bool {
        self.object == id || self.holder == id
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.object, self.holder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_permission_equality_is_by_pair() {
        let mut set = HashSet::new();
        set.insert(Permission::new("L1", "bob"));
        set.insert(Permission::new("L1", "bob"));
        set.insert(Permission::new("bob", "L1"));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_touches() {
        let permission = Permission::new("L1", "bob");
        assert!(permission.touches("L1"));
        assert!(permission.touches("bob"));
        assert!(!permission.touches("alice"));
    }
}
