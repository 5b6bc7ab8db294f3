//! Transactional apply of a reconciled sync

use std::collections::{BTreeMap, BTreeSet};
use std::marker::PhantomData;

use rusqlite::{Connection, Transaction, TransactionBehavior};

use super::family::{LinkModel, SyncFamily};
use super::{SyncBatch, SyncError, SyncRequest};
use crate::db::{
    PermissionRepository, RecordRepository, SessionRepository, SqlitePermissionRepository,
    SqliteRecordRepository, SqliteSessionRepository,
};
use crate::error::Error;
use crate::models::{Permission, SyncRecord, Versioned};
use crate::reconcile::{merge_permissions, merge_records};

/// Counts of what one sync wrote
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Records created
    pub inserted: usize,
    /// Records overwritten
    pub updated: usize,
    /// Records deleted
    pub removed: usize,
    /// Removals by a non-owner that only dropped the caller's link
    pub detached: usize,
    /// Permissions added
    pub linked: usize,
    /// Permissions revoked
    pub unlinked: usize,
    /// Removals, shares and revocations skipped by policy
    pub ignored: usize,
}

/// Authoritative state after a committed sync
#[derive(Debug, Clone)]
pub struct SyncOutcome<R> {
    /// Records visible to the caller, ordered by id
    pub records: Vec<R>,
    /// Permissions on those records, ordered
    pub permissions: Vec<Permission>,
    /// What was written
    pub report: ApplyReport,
}

/// Per-family sync coordinator.
///
/// Stateless; the connection is supplied per call and the whole call runs in
/// one transaction on it. Concurrent calls need separate connections.
pub struct SyncOrchestrator<F> {
    _family: PhantomData<fn() -> F>,
}

impl<F> Default for SyncOrchestrator<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F> SyncOrchestrator<F> {
    /// Create an orchestrator
    pub const fn new() -> Self {
        Self {
            _family: PhantomData,
        }
    }
}

impl<F: SyncFamily> SyncOrchestrator<F> {
    /// Reconcile a client's view with the store and commit the result.
    ///
    /// The request is validated before any storage access. Everything after
    /// that happens in one IMMEDIATE transaction which is rolled back on any
    /// error, including authorization failures.
    pub fn sync(
        &self,
        conn: &mut Connection,
        token: &str,
        request: Option<SyncRequest<F::Record>>,
    ) -> Result<SyncOutcome<F::Record>, SyncError> {
        let kind = <F::Record as SyncRecord>::KIND;
        let batch = SyncBatch::from_request(request)?;

        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        match apply::<F>(&tx, token, &batch) {
            Ok(outcome) => {
                tx.commit()?;
                tracing::info!(
                    family = %kind,
                    inserted = outcome.report.inserted,
                    updated = outcome.report.updated,
                    removed = outcome.report.removed,
                    detached = outcome.report.detached,
                    linked = outcome.report.linked,
                    unlinked = outcome.report.unlinked,
                    ignored = outcome.report.ignored,
                    "Sync committed"
                );
                Ok(outcome)
            }
            Err(error) => {
                if let Err(rollback_error) = tx.rollback() {
                    tracing::error!(family = %kind, "Rollback failed: {rollback_error}");
                }
                tracing::warn!(family = %kind, "Sync rolled back: {error}");
                Err(error)
            }
        }
    }
}

/// What the caller could see before this sync
struct ServerState<R> {
    records: BTreeMap<String, R>,
    permissions: BTreeSet<Permission>,
}

impl<R: SyncRecord> ServerState<R> {
    fn load<F: SyncFamily<Record = R>>(conn: &Connection, caller: &str) -> Result<Self, Error> {
        let repo = SqliteRecordRepository::<R>::new(conn);
        let mut records = BTreeMap::new();
        let mut permissions = BTreeSet::new();

        for id in F::visible_ids(conn, caller)? {
            let record = repo
                .find(&id)?
                .ok_or_else(|| Error::Database(format!("{} {id} is linked but missing", R::KIND)))?;
            permissions.extend(F::links_of(conn, &id)?);
            records.insert(id, record);
        }

        Ok(Self {
            records,
            permissions,
        })
    }
}

fn apply<F: SyncFamily>(
    tx: &Transaction<'_>,
    token: &str,
    batch: &SyncBatch<F::Record>,
) -> Result<SyncOutcome<F::Record>, SyncError> {
    let caller = SqliteSessionRepository::new(tx)
        .resolve_caller(token)?
        .ok_or_else(|| SyncError::Unauthorized("unknown or expired token".into()))?;

    let server = ServerState::<F::Record>::load::<F>(tx, &caller)?;
    authorize_records(tx, &caller, batch, &server)?;

    let records = merge_records(&batch.records, server.records.values(), &batch.removals);
    let permissions = merge_permissions(
        &batch.permissions,
        &server.permissions,
        &batch.removals,
        &batch.revocations,
    );

    let mut writer = Writer::<F> {
        conn: tx,
        caller: &caller,
        owners: records
            .iter()
            .map(|record| (record.id().to_string(), record.owner().to_string()))
            .collect(),
        report: ApplyReport::default(),
        _family: PhantomData,
    };

    let created_links = writer.write_records(&records, &server)?;
    let skipped = writer.link_new_permissions(&permissions, &server)?;
    let retained = writer.apply_revocations(batch, &server)?;
    writer.apply_removals(&batch.removals, &server)?;

    let permissions = permissions
        .difference(&skipped)
        .cloned()
        .chain(retained)
        .chain(created_links)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    Ok(SyncOutcome {
        records,
        permissions,
        report: writer.report,
    })
}

/// Reject client records that would act on someone else's behalf
fn authorize_records<R: SyncRecord>(
    conn: &Connection,
    caller: &str,
    batch: &SyncBatch<R>,
    server: &ServerState<R>,
) -> Result<(), SyncError> {
    let repo = SqliteRecordRepository::<R>::new(conn);

    for record in &batch.records {
        if batch.removals.contains(record.id()) {
            continue;
        }
        match server.records.get(record.id()) {
            Some(existing) if existing.owner() != record.owner() => {
                return Err(SyncError::Unauthorized(format!(
                    "cannot change the owner of {} {}",
                    R::KIND,
                    record.id()
                )));
            }
            Some(_) => {}
            None => {
                if repo.find(record.id())?.is_some() {
                    return Err(SyncError::Unauthorized(format!(
                        "{} {} is not shared with the caller",
                        R::KIND,
                        record.id()
                    )));
                }
                if record.owner() != caller {
                    return Err(SyncError::Unauthorized(format!(
                        "cannot create {} {} on behalf of another user",
                        R::KIND,
                        record.id()
                    )));
                }
            }
        }
    }
    Ok(())
}

struct Writer<'c, F: SyncFamily> {
    conn: &'c Connection,
    caller: &'c str,
    /// Owners of the merged records, for the ownership gate
    owners: BTreeMap<String, String>,
    report: ApplyReport,
    _family: PhantomData<fn() -> F>,
}

impl<F: SyncFamily> Writer<'_, F> {
    fn records(&self) -> SqliteRecordRepository<'_, F::Record> {
        SqliteRecordRepository::new(self.conn)
    }

    fn links(&self) -> SqlitePermissionRepository<'_> {
        SqlitePermissionRepository::new(self.conn, F::LINKS)
    }

    /// Owner of record `id`, as merged or as stored
    fn owner_of(&self, id: &str) -> Result<Option<String>, Error> {
        if let Some(owner) = self.owners.get(id) {
            return Ok(Some(owner.clone()));
        }
        Ok(self
            .records()
            .find(id)?
            .map(|record| record.owner().to_string()))
    }

    fn caller_owns(&self, id: &str) -> Result<bool, Error> {
        Ok(self.owner_of(id)?.as_deref() == Some(self.caller))
    }

    /// Insert new records and overwrite known ones.
    ///
    /// Returns the owner links created alongside new shareable records.
    fn write_records(
        &mut self,
        records: &[F::Record],
        server: &ServerState<F::Record>,
    ) -> Result<Vec<Permission>, Error> {
        let mut created_links = Vec::new();

        for record in records {
            if server.records.contains_key(record.id()) {
                self.records().update(record)?;
                self.report.updated += 1;
                continue;
            }

            self.records().insert(record)?;
            self.report.inserted += 1;
            if F::MODEL == LinkModel::Share {
                let owner_link = Permission::new(record.id(), record.owner());
                self.links().add_link(&owner_link)?;
                created_links.push(owner_link);
            }
        }
        Ok(created_links)
    }

    /// Drop the caller's access to each removed id.
    ///
    /// The owner holds a shared record for as long as it exists, so an owner's
    /// removal deletes it for every holder while anyone else only detaches.
    fn apply_removals(
        &mut self,
        removals: &BTreeSet<String>,
        server: &ServerState<F::Record>,
    ) -> Result<(), Error> {
        for id in removals {
            if !server.records.contains_key(id) {
                tracing::debug!(id = %id, "Removal names a record the caller cannot see");
                self.report.ignored += 1;
                continue;
            }

            match F::MODEL {
                LinkModel::Share if !self.caller_owns(id)? => {
                    self.links()
                        .remove_link(&Permission::new(id.as_str(), self.caller))?;
                    self.report.detached += 1;
                }
                LinkModel::Share | LinkModel::Containment => {
                    self.records().remove(id)?;
                    self.report.removed += 1;
                }
            }
        }
        Ok(())
    }

    /// Link merged permissions the store lacks, if the caller controls them.
    ///
    /// Returns the permissions skipped by the ownership gate.
    fn link_new_permissions(
        &mut self,
        permissions: &BTreeSet<Permission>,
        server: &ServerState<F::Record>,
    ) -> Result<BTreeSet<Permission>, Error> {
        let mut skipped = BTreeSet::new();

        for permission in permissions.difference(&server.permissions) {
            if !self.caller_owns(F::controlling_id(permission))? {
                tracing::warn!(%permission, "Ignoring permission on a record the caller does not own");
                skipped.insert(permission.clone());
                self.report.ignored += 1;
                continue;
            }
            if !F::may_link(self.conn, self.caller, permission)? {
                tracing::debug!(%permission, "Ignoring permission naming an endpoint the caller cannot reach");
                skipped.insert(permission.clone());
                self.report.ignored += 1;
                continue;
            }
            if self.links().add_link(permission)? {
                self.report.linked += 1;
            }
        }
        Ok(skipped)
    }

    /// Unlink revocations on records the caller controls.
    ///
    /// A shared record's owner link is never revoked. Returns stored
    /// permissions that stay because the caller may not revoke them.
    fn apply_revocations(
        &mut self,
        batch: &SyncBatch<F::Record>,
        server: &ServerState<F::Record>,
    ) -> Result<Vec<Permission>, Error> {
        let mut retained = Vec::new();

        for permission in &batch.revocations {
            match self.owner_of(F::controlling_id(permission))? {
                Some(owner) if F::MODEL == LinkModel::Share && permission.holder == owner => {
                    tracing::debug!(%permission, "Ignoring revocation of an owner link");
                }
                Some(owner) if owner == self.caller => {
                    if self.links().remove_link(permission)? {
                        self.report.unlinked += 1;
                    }
                    continue;
                }
                _ => {
                    tracing::warn!(%permission, "Ignoring revocation on a record the caller does not own");
                }
            }

            self.report.ignored += 1;
            let removed_endpoint = batch.removals.iter().any(|id| permission.touches(id));
            if server.permissions.contains(permission) && !removed_endpoint {
                retained.push(permission.clone());
            }
        }
        Ok(retained)
    }
}
