//! Owner-scoped target record store.
//!
//! The persistent entities the workers reconcile against live outside this
//! crate; the engine only touches them through this narrow, owner-scoped seam.
//! Every lookup takes an explicit `OwnerId` and implementations must never
//! return or mutate records outside that scope.

use std::collections::BTreeMap;
use std::future::Future;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

pub mod in_memory;

/// Internal numeric id of a target record.
pub type RecordId = i64;

/// Tenant/user that owns a set of target records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(pub i64);

impl std::fmt::Display for OwnerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A target record as seen through the store seam.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub owner_id: OwnerId,
    /// Application-supplied unique key; may change over the record's life
    pub unique_key: Option<String>,
    /// Secondary descriptive field used by fallback identity matching
    pub title: Option<String>,
    /// Remaining application-defined fields
    pub fields: BTreeMap<String, Value>,
}

/// Field values for creating a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordDraft {
    pub owner_id: OwnerId,
    pub unique_key: Option<String>,
    pub title: Option<String>,
    pub fields: BTreeMap<String, Value>,
}

/// A partial update: only the present fields are written, everything else is
/// preserved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordChanges {
    pub unique_key: Option<String>,
    pub title: Option<String>,
    pub fields: BTreeMap<String, Value>,
}

/// Store trait for owner-scoped record access.
pub trait RecordStore: Send + Sync {
    /// Load a record by internal id, scoped to `owner`. An id that exists under
    /// a different owner is `None`, not an error.
    fn find_by_id(
        &self,
        id: RecordId,
        owner: OwnerId,
    ) -> impl Future<Output = Result<Option<Record>>> + Send;

    /// Look up a record by its application-supplied unique key within `owner`.
    fn find_by_unique_key(
        &self,
        key: &str,
        owner: OwnerId,
    ) -> impl Future<Output = Result<Option<Record>>> + Send;

    /// All records belonging to `owner`.
    fn find_all_by_owner(&self, owner: OwnerId) -> impl Future<Output = Result<Vec<Record>>> + Send;

    /// Create a record, owner-stamped from the draft.
    fn create(&self, draft: RecordDraft) -> impl Future<Output = Result<Record>> + Send;

    /// Apply a partial update to a record.
    fn update(
        &self,
        id: RecordId,
        changes: RecordChanges,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Delete a record by internal id.
    fn delete(&self, id: RecordId) -> impl Future<Output = Result<()>> + Send;
}
