//! Reconciliation of client and server state.
//!
//! Both merges are pure and total: they never touch storage and never fail.
//! Records merge whole-record last-write-wins on `last_updated`, with the
//! client winning exact ties. Permissions carry no timestamp and merge as an
//! additive union minus explicit revocations and anything touching a removed id.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};

use crate::models::{Permission, Versioned};

/// Which copy of a record survives a merge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// The submitting device's copy
    Client,
    /// The stored copy
    Server,
}

/// Last-write-wins with ties going to the client.
///
/// This is the single tie-break rule for every entity family.
pub const fn pick_side(client_updated_at: i64, server_updated_at: i64) -> Side {
    if client_updated_at >= server_updated_at {
        Side::Client
    } else {
        Side::Server
    }
}

/// Merge two record sets, dropping every id listed in `removals`.
///
/// Output is ordered by id and holds each id once.
pub fn merge_records<'a, R>(
    client: impl IntoIterator<Item = &'a R>,
    server: impl IntoIterator<Item = &'a R>,
    removals: &BTreeSet<String>,
) -> Vec<R>
where
    R: Versioned + Clone + 'a,
{
    let client = index_by_id(client, removals);
    let mut merged = index_by_id(server, removals);

    for (id, candidate) in client {
        match merged.entry(id) {
            Entry::Occupied(mut slot) => {
                let side = pick_side(candidate.last_updated(), slot.get().last_updated());
                tracing::trace!(id, ?side, "Resolved record present on both sides");
                if side == Side::Client {
                    slot.insert(candidate);
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(candidate);
            }
        }
    }

    merged.into_values().cloned().collect()
}

/// Union of client and server permissions minus revocations and removed endpoints.
pub fn merge_permissions<'a>(
    client: impl IntoIterator<Item = &'a Permission>,
    server: impl IntoIterator<Item = &'a Permission>,
    removals: &BTreeSet<String>,
    revocations: &BTreeSet<Permission>,
) -> BTreeSet<Permission> {
    client
        .into_iter()
        .chain(server)
        .filter(|permission| !revocations.contains(*permission))
        .filter(|permission| {
            !removals.contains(&permission.object) && !removals.contains(&permission.holder)
        })
        .cloned()
        .collect()
}

// Duplicate ids within one side collapse to the newest copy (later entries win ties).
fn index_by_id<'a, R>(
    records: impl IntoIterator<Item = &'a R>,
    removals: &BTreeSet<String>,
) -> BTreeMap<&'a str, &'a R>
where
    R: Versioned + 'a,
{
    let mut index: BTreeMap<&'a str, &'a R> = BTreeMap::new();
    for record in records {
        if removals.contains(record.id()) {
            continue;
        }
        match index.entry(record.id()) {
            Entry::Occupied(mut slot) => {
                if record.last_updated() >= slot.get().last_updated() {
                    slot.insert(record);
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(record);
            }
        }
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ShoppingList;
    use pretty_assertions::assert_eq;

    fn list(id: &str, ts: i64, name: &str) -> ShoppingList {
        ShoppingList {
            id: id.to_string(),
            owner: "alice".to_string(),
            name: name.to_string(),
            items: Vec::new(),
            last_updated: ts,
        }
    }

    fn ids(ids: &[&str]) -> BTreeSet<String> {
        ids.iter().map(|id| (*id).to_string()).collect()
    }

    fn perms(pairs: &[(&str, &str)]) -> BTreeSet<Permission> {
        pairs
            .iter()
            .map(|(object, holder)| Permission::new(*object, *holder))
            .collect()
    }

    #[test]
    fn test_pick_side() {
        assert_eq!(pick_side(10, 5), Side::Client);
        assert_eq!(pick_side(5, 10), Side::Server);
        assert_eq!(pick_side(7, 7), Side::Client);
    }

    #[test]
    fn test_merge_identical_sets_is_identity() {
        let records = vec![list("A", 1, "a"), list("B", 2, "b"), list("C", 3, "c")];
        let merged = merge_records(&records, &records, &BTreeSet::new());
        assert_eq!(merged, records);
    }

    #[test]
    fn test_tie_prefers_client_copy() {
        let server = vec![list("A", 7, "server")];
        let client = vec![list("A", 7, "client")];
        let merged = merge_records(&client, &server, &BTreeSet::new());
        assert_eq!(merged, client);
    }

    #[test]
    fn test_later_timestamp_wins_either_side() {
        let client = vec![list("A", 10, "client-a"), list("B", 1, "client-b")];
        let server = vec![list("A", 5, "server-a"), list("B", 2, "server-b")];
        let merged = merge_records(&client, &server, &BTreeSet::new());
        assert_eq!(merged, vec![list("A", 10, "client-a"), list("B", 2, "server-b")]);
    }

    #[test]
    fn test_one_sided_records_survive() {
        let client = vec![list("new", 3, "created offline")];
        let server = vec![list("other", 4, "edited elsewhere")];
        let merged = merge_records(&client, &server, &BTreeSet::new());
        assert_eq!(merged.len(), 2);
        assert!(merged.iter().any(|record| record.id == "new"));
        assert!(merged.iter().any(|record| record.id == "other"));
    }

    #[test]
    fn test_removal_dominates_both_sides() {
        let server = vec![list("X", 1, "x")];
        let merged = merge_records::<ShoppingList>(&[], &server, &ids(&["X"]));
        assert!(merged.is_empty());

        let client = vec![list("X", 99, "newer")];
        let merged = merge_records(&client, &server, &ids(&["X"]));
        assert!(merged.is_empty());
    }

    #[test]
    fn test_empty_sides() {
        let records = vec![list("A", 1, "a"), list("B", 1, "b")];
        let removals = ids(&["B"]);

        assert_eq!(
            merge_records(&[], &records, &removals),
            vec![list("A", 1, "a")]
        );
        assert_eq!(
            merge_records(&records, &[], &removals),
            vec![list("A", 1, "a")]
        );
        assert!(merge_records::<ShoppingList>(&[], &[], &BTreeSet::new()).is_empty());
    }

    #[test]
    fn test_duplicate_ids_within_one_side_collapse() {
        let client = vec![list("A", 4, "older"), list("A", 9, "newer")];
        let merged = merge_records(&client, &[], &BTreeSet::new());
        assert_eq!(merged, vec![list("A", 9, "newer")]);
    }

    #[test]
    fn test_permission_union_is_additive() {
        let server = perms(&[("L1", "bob")]);
        let client = perms(&[("L1", "carol")]);
        let merged = merge_permissions(&client, &server, &BTreeSet::new(), &BTreeSet::new());
        assert_eq!(merged, perms(&[("L1", "bob"), ("L1", "carol")]));
    }

    #[test]
    fn test_permission_union_closure() {
        let client = perms(&[("L1", "bob"), ("L2", "bob"), ("L3", "dave")]);
        let server = perms(&[("L1", "bob"), ("L1", "carol"), ("L4", "erin"), ("L5", "gone")]);
        let removals = ids(&["L2", "gone"]);
        let revocations = perms(&[("L1", "carol")]);

        let merged = merge_permissions(&client, &server, &removals, &revocations);

        for permission in client.iter().chain(&server) {
            let excluded = revocations.contains(permission)
                || removals.contains(&permission.object)
                || removals.contains(&permission.holder);
            assert_eq!(merged.contains(permission), !excluded, "{permission}");
        }
        assert_eq!(merged, perms(&[("L1", "bob"), ("L3", "dave"), ("L4", "erin")]));
    }

    #[test]
    fn test_revocation_removes_server_permission() {
        let server = perms(&[("L1", "bob")]);
        let revocations = perms(&[("L1", "bob")]);
        let merged = merge_permissions(&BTreeSet::new(), &server, &BTreeSet::new(), &revocations);
        assert!(merged.is_empty());
    }

    #[test]
    fn test_scenario_newer_client_record_keeps_untouched_share() {
        let client = vec![list("L1", 10, "client")];
        let server = vec![list("L1", 5, "server")];
        let server_perms = perms(&[("L1", "bob")]);

        let records = merge_records(&client, &server, &BTreeSet::new());
        let permissions =
            merge_permissions(&[], &server_perms, &BTreeSet::new(), &BTreeSet::new());

        assert_eq!(records, client);
        assert_eq!(permissions, server_perms);
    }
}
