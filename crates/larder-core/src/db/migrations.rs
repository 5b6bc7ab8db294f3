//! Database migrations

use crate::error::Result;
use rusqlite::Connection;

/// Current schema version
const CURRENT_VERSION: i32 = 1;

/// Run all pending migrations
pub fn run(conn: &mut Connection) -> Result<()> {
    let version = get_version(conn)?;

    if version < 1 {
        migrate_v1(conn)?;
    }

    Ok(())
}

/// Get the current schema version
fn get_version(conn: &Connection) -> Result<i32> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
        [],
        |row| row.get(0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;

    Ok(version)
}

/// Migration to version 1: users, records and link tables
fn migrate_v1(conn: &mut Connection) -> Result<()> {
    let statements = [
        // Schema version tracking
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        )",
        // Users and opaque session tokens
        "CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            display_name TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )",
        "CREATE TABLE IF NOT EXISTS auth_tokens (
            token TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            issued_at INTEGER NOT NULL
        )",
        "CREATE INDEX IF NOT EXISTS idx_auth_tokens_user ON auth_tokens(user_id)",
        // Record tables: indexed columns plus the full record as JSON
        "CREATE TABLE IF NOT EXISTS lists (
            id TEXT PRIMARY KEY,
            owner TEXT NOT NULL,
            last_updated INTEGER NOT NULL,
            payload TEXT NOT NULL
        )",
        "CREATE INDEX IF NOT EXISTS idx_lists_owner ON lists(owner)",
        "CREATE TABLE IF NOT EXISTS recipes (
            id TEXT PRIMARY KEY,
            owner TEXT NOT NULL,
            last_updated INTEGER NOT NULL,
            payload TEXT NOT NULL
        )",
        "CREATE INDEX IF NOT EXISTS idx_recipes_owner ON recipes(owner)",
        "CREATE TABLE IF NOT EXISTS collections (
            id TEXT PRIMARY KEY,
            owner TEXT NOT NULL,
            last_updated INTEGER NOT NULL,
            payload TEXT NOT NULL
        )",
        "CREATE INDEX IF NOT EXISTS idx_collections_owner ON collections(owner)",
        // Share links (record id, user id)
        "CREATE TABLE IF NOT EXISTS list_shares (
            list_id TEXT NOT NULL REFERENCES lists(id) ON DELETE CASCADE,
            user_id TEXT NOT NULL,
            PRIMARY KEY (list_id, user_id)
        )",
        "CREATE INDEX IF NOT EXISTS idx_list_shares_user ON list_shares(user_id)",
        "CREATE TABLE IF NOT EXISTS recipe_shares (
            recipe_id TEXT NOT NULL REFERENCES recipes(id) ON DELETE CASCADE,
            user_id TEXT NOT NULL,
            PRIMARY KEY (recipe_id, user_id)
        )",
        "CREATE INDEX IF NOT EXISTS idx_recipe_shares_user ON recipe_shares(user_id)",
        // Collection membership (recipe id, collection id)
        "CREATE TABLE IF NOT EXISTS collection_recipes (
            recipe_id TEXT NOT NULL REFERENCES recipes(id) ON DELETE CASCADE,
            collection_id TEXT NOT NULL REFERENCES collections(id) ON DELETE CASCADE,
            PRIMARY KEY (recipe_id, collection_id)
        )",
        "CREATE INDEX IF NOT EXISTS idx_collection_recipes_collection ON collection_recipes(collection_id)",
        // Record migration version
        "INSERT INTO schema_version (version) VALUES (1)",
    ];

    // Dropping the transaction without commit rolls every statement back.
    let tx = conn.transaction()?;
    for stmt in statements {
        tx.execute(stmt, [])?;
    }
    tx.commit()?;

    tracing::info!("Migrated database to version {CURRENT_VERSION}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> Connection {
        Connection::open_in_memory().unwrap()
    }

    fn table_exists(conn: &Connection, name: &str) -> bool {
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?)",
            [name],
            |row| row.get(0),
        )
        .unwrap()
    }

    #[test]
    fn test_migrations() {
        let mut conn = setup();
        run(&mut conn).unwrap();

        let version = get_version(&conn).unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[test]
    fn test_migrations_idempotent() {
        let mut conn = setup();
        run(&mut conn).unwrap();
        run(&mut conn).unwrap(); // Should not fail

        let version = get_version(&conn).unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[test]
    fn test_migration_v1_creates_all_tables() {
        let mut conn = setup();
        run(&mut conn).unwrap();

        for table in [
            "users",
            "auth_tokens",
            "lists",
            "recipes",
            "collections",
            "list_shares",
            "recipe_shares",
            "collection_recipes",
        ] {
            assert!(table_exists(&conn, table), "missing table {table}");
        }
    }
}
