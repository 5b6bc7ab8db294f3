//! Database layer for Larder

mod connection;
mod migrations;
mod permission_repository;
mod record_repository;
mod session_repository;

pub use connection::{Database, DatabaseConfig};
pub use permission_repository::{LinkTable, PermissionRepository, SqlitePermissionRepository};
pub use record_repository::{RecordRepository, SqliteRecordRepository};
pub use session_repository::{SessionRepository, SqliteSessionRepository};
