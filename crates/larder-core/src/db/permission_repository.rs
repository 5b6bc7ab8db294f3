//! Permission store: many-to-many links between an object and its holders

use crate::error::Result;
use crate::models::Permission;
use rusqlite::{params, Connection};

/// Link table backing one entity family's permissions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkTable {
    /// (list id, user id)
    ListShares,
    /// (recipe id, user id)
    RecipeShares,
    /// (recipe id, collection id)
    CollectionRecipes,
}

impl LinkTable {
    const fn table(self) -> &'static str {
        match self {
            Self::ListShares => "list_shares",
            Self::RecipeShares => "recipe_shares",
            Self::CollectionRecipes => "collection_recipes",
        }
    }

    const fn object_column(self) -> &'static str {
        match self {
            Self::ListShares => "list_id",
            Self::RecipeShares | Self::CollectionRecipes => "recipe_id",
        }
    }

    const fn holder_column(self) -> &'static str {
        match self {
            Self::ListShares | Self::RecipeShares => "user_id",
            Self::CollectionRecipes => "collection_id",
        }
    }
}

/// Trait for permission link storage.
///
/// Links are only added or removed, never updated.
pub trait PermissionRepository {
    /// Add a link; returns false when it already existed
    fn add_link(&self, permission: &Permission) -> Result<bool>;

    /// Remove a link; returns whether it existed
    fn remove_link(&self, permission: &Permission) -> Result<bool>;

    /// Whether the link exists
    fn contains(&self, permission: &Permission) -> Result<bool>;

    /// Holders linked to `object`, sorted
    fn find_holders(&self, object: &str) -> Result<Vec<String>>;

    /// Objects linked to `holder`, sorted
    fn find_objects(&self, holder: &str) -> Result<Vec<String>>;

    /// Delete every link; returns the number removed
    fn clear(&self) -> Result<usize>;
}

/// `SQLite` implementation of `PermissionRepository`
pub struct SqlitePermissionRepository<'a> {
    conn: &'a Connection,
    links: LinkTable,
}

impl<'a> SqlitePermissionRepository<'a> {
    /// Create a new repository over one link table
    pub const fn new(conn: &'a Connection, links: LinkTable) -> Self {
        Self { conn, links }
    }

    fn list_column(&self, wanted: &str, filter: &str, value: &str) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {wanted} FROM {} WHERE {filter} = ? ORDER BY {wanted}",
            self.links.table()
        ))?;

        let values = stmt
            .query_map(params![value], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;

        Ok(values)
    }
}

impl PermissionRepository for SqlitePermissionRepository<'_> {
    fn add_link(&self, permission: &Permission) -> Result<bool> {
        let rows = self.conn.execute(
            &format!(
                "INSERT OR IGNORE INTO {} ({}, {}) VALUES (?, ?)",
                self.links.table(),
                self.links.object_column(),
                self.links.holder_column()
            ),
            params![permission.object, permission.holder],
        )?;
        Ok(rows > 0)
    }

    fn remove_link(&self, permission: &Permission) -> Result<bool> {
        let rows = self.conn.execute(
            &format!(
                "DELETE FROM {} WHERE {} = ? AND {} = ?",
                self.links.table(),
                self.links.object_column(),
                self.links.holder_column()
            ),
            params![permission.object, permission.holder],
        )?;
        Ok(rows > 0)
    }

    fn contains(&self, permission: &Permission) -> Result<bool> {
        let exists = self.conn.query_row(
            &format!(
                "SELECT EXISTS(SELECT 1 FROM {} WHERE {} = ? AND {} = ?)",
                self.links.table(),
                self.links.object_column(),
                self.links.holder_column()
            ),
            params![permission.object, permission.holder],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn find_holders(&self, object: &str) -> Result<Vec<String>> {
        self.list_column(
            self.links.holder_column(),
            self.links.object_column(),
            object,
        )
    }

    fn find_objects(&self, holder: &str) -> Result<Vec<String>> {
        self.list_column(
            self.links.object_column(),
            self.links.holder_column(),
            holder,
        )
    }

    fn clear(&self) -> Result<usize> {
        let rows = self
            .conn
            .execute(&format!("DELETE FROM {}", self.links.table()), [])?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Database, RecordRepository, SqliteRecordRepository};
    use crate::models::{Recipe, RecipeCollection, ShoppingList};

    fn setup() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn seed_list(conn: &Connection, id: &str) {
        let mut list = ShoppingList::new("alice", id);
        list.id = id.to_string();
        SqliteRecordRepository::<ShoppingList>::new(conn)
            .insert(&list)
            .unwrap();
    }

    #[test]
    fn test_add_link_is_idempotent() {
        let db = setup();
        let conn = db.connect().unwrap();
        seed_list(&conn, "L1");
        let repo = SqlitePermissionRepository::new(&conn, LinkTable::ListShares);

        let share = Permission::new("L1", "bob");
        assert!(repo.add_link(&share).unwrap());
        assert!(!repo.add_link(&share).unwrap());
        assert!(repo.contains(&share).unwrap());
        assert_eq!(repo.find_holders("L1").unwrap(), vec!["bob"]);
    }

    #[test]
    fn test_remove_link() {
        let db = setup();
        let conn = db.connect().unwrap();
        seed_list(&conn, "L1");
        let repo = SqlitePermissionRepository::new(&conn, LinkTable::ListShares);

        let share = Permission::new("L1", "bob");
        repo.add_link(&share).unwrap();
        assert!(repo.remove_link(&share).unwrap());
        assert!(!repo.remove_link(&share).unwrap());
        assert!(!repo.contains(&share).unwrap());
    }

    #[test]
    fn test_find_holders_and_objects() {
        let db = setup();
        let conn = db.connect().unwrap();
        seed_list(&conn, "L1");
        seed_list(&conn, "L2");
        let repo = SqlitePermissionRepository::new(&conn, LinkTable::ListShares);

        repo.add_link(&Permission::new("L1", "carol")).unwrap();
        repo.add_link(&Permission::new("L1", "bob")).unwrap();
        repo.add_link(&Permission::new("L2", "bob")).unwrap();

        assert_eq!(repo.find_holders("L1").unwrap(), vec!["bob", "carol"]);
        assert_eq!(repo.find_objects("bob").unwrap(), vec!["L1", "L2"]);
        assert!(repo.find_objects("dave").unwrap().is_empty());
        assert_eq!(repo.clear().unwrap(), 3);
    }

    #[test]
    fn test_removing_record_cascades_to_links() {
        let db = setup();
        let conn = db.connect().unwrap();
        seed_list(&conn, "L1");
        let repo = SqlitePermissionRepository::new(&conn, LinkTable::ListShares);
        repo.add_link(&Permission::new("L1", "bob")).unwrap();

        SqliteRecordRepository::<ShoppingList>::new(&conn)
            .remove("L1")
            .unwrap();

        assert!(repo.find_holders("L1").unwrap().is_empty());
    }

    #[test]
    fn test_collection_membership_cascades_from_both_endpoints() {
        let db = setup();
        let conn = db.connect().unwrap();
        let recipes = SqliteRecordRepository::<Recipe>::new(&conn);
        let collections = SqliteRecordRepository::<RecipeCollection>::new(&conn);
        let members = SqlitePermissionRepository::new(&conn, LinkTable::CollectionRecipes);

        let mut soup = Recipe::new("alice", "Soup");
        soup.id = "R1".into();
        let mut stew = Recipe::new("alice", "Stew");
        stew.id = "R2".into();
        let mut winter = RecipeCollection::new("alice", "Winter");
        winter.id = "C1".into();
        recipes.insert(&soup).unwrap();
        recipes.insert(&stew).unwrap();
        collections.insert(&winter).unwrap();

        members.add_link(&Permission::new("R1", "C1")).unwrap();
        members.add_link(&Permission::new("R2", "C1")).unwrap();
        assert_eq!(members.find_objects("C1").unwrap(), vec!["R1", "R2"]);

        recipes.remove("R1").unwrap();
        assert_eq!(members.find_objects("C1").unwrap(), vec!["R2"]);

        collections.remove("C1").unwrap();
        assert!(members.find_holders("R2").unwrap().is_empty());
    }
}
