//! Sync orchestration.
//!
//! A client pushes its full view of one entity family (records, permissions,
//! removals and revocations). The orchestrator resolves the caller, loads what
//! the caller can see, reconciles both sides, writes the difference back inside
//! one transaction and answers with the merged state.

mod engine;
mod family;

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{Permission, SyncRecord};

pub use engine::{ApplyReport, SyncOrchestrator, SyncOutcome};
pub use family::{Collections, LinkModel, Lists, Recipes, SyncFamily};

/// Orchestrator for shopping lists
pub type ListSync = SyncOrchestrator<Lists>;
/// Orchestrator for recipes
pub type RecipeSync = SyncOrchestrator<Recipes>;
/// Orchestrator for recipe collections
pub type CollectionSync = SyncOrchestrator<Collections>;

/// Failures surfaced to sync callers
#[derive(Debug, Error)]
pub enum SyncError {
    /// Malformed or incomplete payload; resend a corrected one
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Unknown token, or an attempt to act on another user's records
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Storage failure; every write of the call was rolled back
    #[error("Internal error: {0}")]
    Internal(#[from] crate::Error),
}

impl SyncError {
    /// Whether resending the same request may succeed
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Internal(_))
    }
}

impl From<rusqlite::Error> for SyncError {
    fn from(error: rusqlite::Error) -> Self {
        Self::Internal(error.into())
    }
}

/// Client payload for one entity family, as decoded from the wire.
///
/// Every list is required; `null` or a missing field is an invalid request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest<R> {
    /// Token carried in the body by clients that cannot set headers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    /// Client's current copy of every record it holds
    pub data: Option<Vec<R>>,
    /// Permissions the client knows about
    pub permissions: Option<Vec<Permission>>,
    /// Record ids to drop entirely
    pub removals: Option<Vec<String>>,
    /// Permissions to drop without touching the record
    pub revocations: Option<Vec<Permission>>,
}

impl<R> SyncRequest<R> {
    /// A complete request with empty permission, removal and revocation lists
    pub const fn with_data(data: Vec<R>) -> Self {
        Self {
            auth_token: None,
            data: Some(data),
            permissions: Some(Vec::new()),
            removals: Some(Vec::new()),
            revocations: Some(Vec::new()),
        }
    }

    /// Set the client permissions
    #[must_use]
    pub fn permissions(mut self, permissions: Vec<Permission>) -> Self {
        self.permissions = Some(permissions);
        self
    }

    /// Set the removal list
    #[must_use]
    pub fn removals(mut self, removals: Vec<String>) -> Self {
        self.removals = Some(removals);
        self
    }

    /// Set the revocation list
    #[must_use]
    pub fn revocations(mut self, revocations: Vec<Permission>) -> Self {
        self.revocations = Some(revocations);
        self
    }
}

/// A validated request, with set semantics applied
#[derive(Debug, Clone)]
pub struct SyncBatch<R> {
    /// Client records
    pub records: Vec<R>,
    /// Client permissions
    pub permissions: BTreeSet<Permission>,
    /// Ids to remove
    pub removals: BTreeSet<String>,
    /// Permissions to revoke
    pub revocations: BTreeSet<Permission>,
}

impl<R: SyncRecord> SyncBatch<R> {
    /// Check shape and field presence without touching storage
    pub fn from_request(request: Option<SyncRequest<R>>) -> Result<Self, SyncError> {
        let request = request.ok_or_else(|| invalid("request body is missing"))?;
        let records = request.data.ok_or_else(|| invalid("`data` is required"))?;
        let permissions = request
            .permissions
            .ok_or_else(|| invalid("`permissions` is required"))?;
        let removals = request
            .removals
            .ok_or_else(|| invalid("`removals` is required"))?;
        let revocations = request
            .revocations
            .ok_or_else(|| invalid("`revocations` is required"))?;

        for record in &records {
            if record.id().trim().is_empty() {
                return Err(invalid(format!("{} with empty id", R::KIND)));
            }
            if record.owner().trim().is_empty() {
                return Err(invalid(format!("{} {} has no owner", R::KIND, record.id())));
            }
        }
        if let Some(bad) = permissions.iter().chain(&revocations).find(|permission| {
            permission.object.trim().is_empty() || permission.holder.trim().is_empty()
        }) {
            return Err(invalid(format!("permission {bad} has an empty endpoint")));
        }
        if removals.iter().any(|id| id.trim().is_empty()) {
            return Err(invalid("removals contain an empty id"));
        }

        Ok(Self {
            records,
            permissions: permissions.into_iter().collect(),
            removals: removals.into_iter().collect(),
            revocations: revocations.into_iter().collect(),
        })
    }
}

fn invalid(message: impl Into<String>) -> SyncError {
    SyncError::InvalidRequest(message.into())
}

/// Wire envelope returned to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse<R> {
    /// Whether the sync committed
    pub success: bool,
    /// Human readable outcome
    pub message: String,
    /// Authoritative records after the merge
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_data: Option<Vec<R>>,
    /// Authoritative permissions after the merge
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_permissions: Option<Vec<Permission>>,
}

impl<R> SyncResponse<R> {
    /// Envelope for a committed sync
    pub fn success(outcome: SyncOutcome<R>) -> Self {
        Self {
            success: true,
            message: format!(
                "Synced {} records and {} permissions",
                outcome.records.len(),
                outcome.permissions.len()
            ),
            sync_data: Some(outcome.records),
            sync_permissions: Some(outcome.permissions),
        }
    }

    /// Envelope for a failed sync
    pub fn failure(error: &SyncError) -> Self {
        Self {
            success: false,
            message: error.to_string(),
            sync_data: None,
            sync_permissions: None,
        }
    }
}

impl<R> From<Result<SyncOutcome<R>, SyncError>> for SyncResponse<R> {
    fn from(result: Result<SyncOutcome<R>, SyncError>) -> Self {
        match result {
            Ok(outcome) => Self::success(outcome),
            Err(error) => Self::failure(&error),
        }
    }
}
