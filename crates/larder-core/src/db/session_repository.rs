//! Users and opaque session tokens

use crate::error::{Error, Result};
use crate::models::{now_millis, User};
use rusqlite::{params, Connection};
use uuid::Uuid;

/// Trait for resolving callers from session tokens
pub trait SessionRepository {
    /// Register a user
    fn create_user(&self, user: &User) -> Result<()>;

    /// Get a user by ID
    fn find_user(&self, id: &str) -> Result<Option<User>>;

    /// Mint a new opaque token for an existing user
    fn issue_token(&self, user_id: &str) -> Result<String>;

    /// Map a token to its user id, if the token is known
    fn resolve_caller(&self, token: &str) -> Result<Option<String>>;

    /// Invalidate a token; returns whether it existed
    fn revoke_token(&self, token: &str) -> Result<bool>;
}

/// `SQLite` implementation of `SessionRepository`
pub struct SqliteSessionRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteSessionRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl SessionRepository for SqliteSessionRepository<'_> {
    fn create_user(&self, user: &User) -> Result<()> {
        if user.id.trim().is_empty() {
            return Err(Error::InvalidInput("User ID cannot be empty".into()));
        }
        self.conn.execute(
            "INSERT INTO users (id, display_name, created_at) VALUES (?, ?, ?)",
            params![user.id, user.display_name, user.created_at],
        )?;
        Ok(())
    }

    fn find_user(&self, id: &str) -> Result<Option<User>> {
        let result = self.conn.query_row(
            "SELECT id, display_name, created_at FROM users WHERE id = ?",
            params![id],
            |row| {
                Ok(User {
                    id: row.get(0)?,
                    display_name: row.get(1)?,
                    created_at: row.get(2)?,
                })
            },
        );

        match result {
            Ok(user) => Ok(Some(user)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn issue_token(&self, user_id: &str) -> Result<String> {
        if self.find_user(user_id)?.is_none() {
            return Err(Error::NotFound(user_id.to_string()));
        }

        let token = Uuid::new_v4().simple().to_string();
        self.conn.execute(
            "INSERT INTO auth_tokens (token, user_id, issued_at) VALUES (?, ?, ?)",
            params![token, user_id, now_millis()],
        )?;
        Ok(token)
    }

    fn resolve_caller(&self, token: &str) -> Result<Option<String>> {
        let token = token.trim();
        if token.is_empty() {
            return Ok(None);
        }

        let result = self.conn.query_row(
            "SELECT user_id FROM auth_tokens WHERE token = ?",
            params![token],
            |row| row.get(0),
        );

        match result {
            Ok(user_id) => Ok(Some(user_id)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn revoke_token(&self, token: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM auth_tokens WHERE token = ?", params![token])?;
        Ok(rows > 0)
    }
}
