//! Per-item reconciliation workers.
//!
//! A worker receives bulk groups of claimed queue items and returns one typed
//! outcome per item; the runner decides delete vs. release from the outcome
//! rather than from exceptions. Worker implementations are chosen at
//! batch-creation time through the runner's type parameter, not resolved
//! dynamically by name.

use std::collections::BTreeMap;
use std::future::Future;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::queue::QueueItem;
use crate::record::{OwnerId, RecordChanges, RecordDraft, RecordId};

pub mod delete;
pub mod identity;
pub mod sync;

/// Outcome of reconciling a single queue item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Reconciled against the record store; the item is done.
    Applied,
    /// Transient failure; the item should be released for retry on a later tick.
    Retry(String),
    /// Terminal failure or a guarded no-op; the item is dropped with a log and
    /// counts as processed.
    Discard(String),
    /// Identity resolution found several plausible targets and refuses to
    /// guess between them. Treated as terminal; the candidates are surfaced
    /// for out-of-band disambiguation.
    NeedsDisambiguation(Vec<RecordId>),
}

impl ItemOutcome {
    /// Whether this outcome removes the item from its queue and advances the
    /// batch's processed count. Only retries keep the item alive.
    pub fn advances_progress(&self) -> bool {
        !matches!(self, ItemOutcome::Retry(_))
    }
}

/// Advisory hint for how a sync payload expects to be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionHint {
    Create,
    Update,
}

/// Payload for create-or-update reconciliation.
///
/// `action` is advisory only; identity resolution decides what actually
/// happens. All remaining keys land in `fields` untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncPayload {
    pub owner_id: OwnerId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<ActionHint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend_id: Option<RecordId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(flatten)]
    pub fields: BTreeMap<String, Value>,
}

impl SyncPayload {
    /// The partial update this payload represents: only present fields written.
    pub fn as_changes(&self) -> RecordChanges {
        RecordChanges {
            unique_key: self.unique_key.clone(),
            title: self.title.clone(),
            fields: self.fields.clone(),
        }
    }

    /// The owner-stamped draft this payload creates when nothing matched.
    pub fn as_draft(&self) -> RecordDraft {
        RecordDraft {
            owner_id: self.owner_id,
            unique_key: self.unique_key.clone(),
            title: self.title.clone(),
            fields: self.fields.clone(),
        }
    }
}

/// Payload identifying a record to delete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletePayload {
    pub owner_id: OwnerId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend_id: Option<RecordId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// A reconciliation worker invoked by the runner with bulk groups of items.
///
/// Implementations must return exactly one outcome per input item, in order.
/// A returned `Err` fails the whole bulk call and the runner releases the
/// entire group for retry.
pub trait Worker: Send + Sync {
    fn process_bulk(
        &self,
        items: &[QueueItem],
    ) -> impl Future<Output = Result<Vec<ItemOutcome>>> + Send;
}
