//! Entity families and how their permissions are interpreted

use std::collections::BTreeSet;

use rusqlite::Connection;

use crate::db::{
    LinkTable, PermissionRepository, RecordRepository, SessionRepository,
    SqlitePermissionRepository, SqliteRecordRepository, SqliteSessionRepository,
};
use crate::error::Result;
use crate::models::{Permission, Recipe, RecipeCollection, ShoppingList, SyncRecord};

/// How a family's permission pairs relate to its records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkModel {
    /// `(record id, user id)`: the owner and every holder can see the record.
    /// The owner link is created with the record and cannot be revoked.
    Share,
    /// `(member id, container id)`: the holder is the family's own record
    /// and only its owner sees it.
    Containment,
}

/// One synchronizable entity family: its record type, link table and access rules.
pub trait SyncFamily {
    /// Record type exchanged by this family
    type Record: SyncRecord;

    /// Link table holding this family's permissions
    const LINKS: LinkTable;

    /// Meaning of a permission pair in this family
    const MODEL: LinkModel;

    /// Endpoint the caller must own to add or revoke a permission
    fn controlling_id(permission: &Permission) -> &str {
        match Self::MODEL {
            LinkModel::Share => &permission.object,
            LinkModel::Containment => &permission.holder,
        }
    }

    /// Record ids the caller currently has access to
    fn visible_ids(conn: &Connection, caller: &str) -> Result<BTreeSet<String>> {
        let mut ids: BTreeSet<String> = SqliteRecordRepository::<Self::Record>::new(conn)
            .find_owned(caller)?
            .into_iter()
            .collect();
        if Self::MODEL == LinkModel::Share {
            ids.extend(SqlitePermissionRepository::new(conn, Self::LINKS).find_objects(caller)?);
        }
        Ok(ids)
    }

    /// Every stored permission attached to record `id`
    fn links_of(conn: &Connection, id: &str) -> Result<Vec<Permission>> {
        let links = SqlitePermissionRepository::new(conn, Self::LINKS);
        let permissions = match Self::MODEL {
            LinkModel::Share => links
                .find_holders(id)?
                .into_iter()
                .map(|holder| Permission::new(id, holder))
                .collect(),
            LinkModel::Containment => links
                .find_objects(id)?
                .into_iter()
                .map(|object| Permission::new(object, id))
                .collect(),
        };
        Ok(permissions)
    }

    /// Whether `caller` may point a permission at its other endpoint
    fn may_link(conn: &Connection, caller: &str, permission: &Permission) -> Result<bool>;
}

/// Shopping lists shared between users
#[derive(Debug, Clone, Copy, Default)]
pub struct Lists;

/// Recipes shared between users
#[derive(Debug, Clone, Copy, Default)]
pub struct Recipes;

/// Recipe collections and the recipes they contain
#[derive(Debug, Clone, Copy, Default)]
pub struct Collections;

impl SyncFamily for Lists {
    type Record = ShoppingList;
    const LINKS: LinkTable = LinkTable::ListShares;
    const MODEL: LinkModel = LinkModel::Share;

    fn may_link(conn: &Connection, _caller: &str, permission: &Permission) -> Result<bool> {
        holder_is_user(conn, permission)
    }
}

impl SyncFamily for Recipes {
    type Record = Recipe;
    const LINKS: LinkTable = LinkTable::RecipeShares;
    const MODEL: LinkModel = LinkModel::Share;

    fn may_link(conn: &Connection, _caller: &str, permission: &Permission) -> Result<bool> {
        holder_is_user(conn, permission)
    }
}

impl SyncFamily for Collections {
    type Record = RecipeCollection;
    const LINKS: LinkTable = LinkTable::CollectionRecipes;
    const MODEL: LinkModel = LinkModel::Containment;

    /// Only recipes the caller can see may go into a collection
    fn may_link(conn: &Connection, caller: &str, permission: &Permission) -> Result<bool> {
        let Some(recipe) = SqliteRecordRepository::<Recipe>::new(conn).find(&permission.object)?
        else {
            return Ok(false);
        };
        if recipe.owner == caller {
            return Ok(true);
        }
        SqlitePermissionRepository::new(conn, LinkTable::RecipeShares)
            .contains(&Permission::new(recipe.id, caller))
    }
}

fn holder_is_user(conn: &Connection, permission: &Permission) -> Result<bool> {
    Ok(SqliteSessionRepository::new(conn)
        .find_user(&permission.holder)?
        .is_some())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_controlling_id_follows_link_model() {
        let share = Permission::new("L1", "bob");
        assert_eq!(Lists::controlling_id(&share), "L1");
        assert_eq!(Recipes::controlling_id(&share), "L1");

        let membership = Permission::new("R1", "C1");
        assert_eq!(Collections::controlling_id(&membership), "C1");
    }
}
