//! Data models for Larder

mod collection;
mod list;
mod permission;
mod recipe;
mod record;
mod user;

pub use collection::RecipeCollection;
pub use list::{ListItem, ShoppingList};
pub use permission::Permission;
pub use recipe::Recipe;
pub use record::{new_record_id, now_millis, RecordKind, SyncRecord, Versioned};
pub use user::User;
