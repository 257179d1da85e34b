//! Record deletion worker.

use std::sync::Arc;

use crate::error::Result;
use crate::queue::QueueItem;
use crate::record::RecordStore;

use super::identity::{resolve_delete_target, DeleteTarget};
use super::{DeletePayload, ItemOutcome, Worker};

/// Deletes the record a payload identifies, after verifying ownership.
///
/// Not-found and ownership-mismatch are guarded no-ops with a warning, never
/// errors: a delete that cannot find its target must not block the batch.
pub struct DeleteWorker<R: RecordStore> {
    records: Arc<R>,
}

impl<R: RecordStore> DeleteWorker<R> {
    pub fn new(records: Arc<R>) -> Self {
        Self { records }
    }

    async fn process_one(&self, item: &QueueItem) -> ItemOutcome {
        let payload: DeletePayload = match serde_json::from_value(item.payload.clone()) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(item_id = %item.id, error = %e, "Discarding malformed delete payload");
                return ItemOutcome::Discard(format!("malformed payload: {e}"));
            }
        };

        match resolve_delete_target(self.records.as_ref(), &payload).await {
            Ok(DeleteTarget::Found(record)) => {
                // Resolution is owner-scoped already; re-check before the
                // destructive step anyway.
                if record.owner_id != payload.owner_id {
                    tracing::warn!(
                        item_id = %item.id,
                        record_id = record.id,
                        record_owner = %record.owner_id,
                        payload_owner = %payload.owner_id,
                        "Ownership mismatch on delete, leaving record untouched"
                    );
                    return ItemOutcome::Discard("ownership mismatch".to_string());
                }

                match self.records.delete(record.id).await {
                    Ok(()) => {
                        tracing::debug!(
                            item_id = %item.id,
                            record_id = record.id,
                            owner_id = %payload.owner_id,
                            "Deleted record"
                        );
                        ItemOutcome::Applied
                    }
                    Err(e) => ItemOutcome::Retry(format!("delete failed: {e}")),
                }
            }
            Ok(DeleteTarget::NotFound) => {
                tracing::warn!(
                    item_id = %item.id,
                    owner_id = %payload.owner_id,
                    "Delete target not found, nothing to do"
                );
                ItemOutcome::Discard("record not found".to_string())
            }
            Ok(DeleteTarget::Ambiguous(candidates)) => {
                tracing::warn!(
                    item_id = %item.id,
                    owner_id = %payload.owner_id,
                    candidates = ?candidates,
                    "Delete target ambiguous, refusing to guess"
                );
                ItemOutcome::NeedsDisambiguation(candidates)
            }
            Err(e) => ItemOutcome::Retry(format!("resolution failed: {e}")),
        }
    }
}

impl<R: RecordStore> Worker for DeleteWorker<R> {
    async fn process_bulk(&self, items: &[QueueItem]) -> Result<Vec<ItemOutcome>> {
        let mut outcomes = Vec::with_capacity(items.len());
        for item in items {
            outcomes.push(self.process_one(item).await);
        }
        Ok(outcomes)
    }
}
