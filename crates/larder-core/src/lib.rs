//! larder-core - Core library for Larder
//!
//! This crate contains the record models, reconciliation rules, storage layer
//! and sync orchestration shared by the Larder server and its tests.

pub mod db;
pub mod error;
pub mod models;
pub mod reconcile;
pub mod sync;

pub use error::{Error, Result};
pub use models::{Permission, Recipe, RecipeCollection, ShoppingList, User};
pub use sync::{
    CollectionSync, ListSync, RecipeSync, SyncError, SyncOutcome, SyncRequest, SyncResponse,
};
