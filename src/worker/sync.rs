//! Create-or-update reconciliation worker.

use std::sync::Arc;

use crate::error::Result;
use crate::queue::QueueItem;
use crate::record::RecordStore;

use super::identity::{resolve_sync_target, Resolution};
use super::{ItemOutcome, SyncPayload, Worker};

/// Reconciles sync payloads against the record store: updates the resolved
/// record's present fields, or creates an owner-stamped record when nothing
/// matched.
pub struct SyncWorker<R: RecordStore> {
    records: Arc<R>,
}

impl<R: RecordStore> SyncWorker<R> {
    pub fn new(records: Arc<R>) -> Self {
        Self { records }
    }

    async fn process_one(&self, item: &QueueItem) -> ItemOutcome {
        let payload: SyncPayload = match serde_json::from_value(item.payload.clone()) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(item_id = %item.id, error = %e, "Discarding malformed sync payload");
                return ItemOutcome::Discard(format!("malformed payload: {e}"));
            }
        };

        match resolve_sync_target(self.records.as_ref(), &payload).await {
            Ok(Resolution::Existing(record)) => {
                match self.records.update(record.id, payload.as_changes()).await {
                    Ok(()) => {
                        tracing::debug!(
                            item_id = %item.id,
                            record_id = record.id,
                            owner_id = %payload.owner_id,
                            "Updated existing record"
                        );
                        ItemOutcome::Applied
                    }
                    Err(e) => ItemOutcome::Retry(format!("update failed: {e}")),
                }
            }
            Ok(Resolution::CreateNew) => match self.records.create(payload.as_draft()).await {
                Ok(record) => {
                    tracing::debug!(
                        item_id = %item.id,
                        record_id = record.id,
                        owner_id = %payload.owner_id,
                        "Created new record"
                    );
                    ItemOutcome::Applied
                }
                Err(e) => ItemOutcome::Retry(format!("create failed: {e}")),
            },
            Ok(Resolution::Ambiguous(candidates)) => {
                tracing::warn!(
                    item_id = %item.id,
                    owner_id = %payload.owner_id,
                    candidates = ?candidates,
                    "Sync target ambiguous, refusing to guess"
                );
                ItemOutcome::NeedsDisambiguation(candidates)
            }
            Err(e) => ItemOutcome::Retry(format!("resolution failed: {e}")),
        }
    }
}

impl<R: RecordStore> Worker for SyncWorker<R> {
    async fn process_bulk(&self, items: &[QueueItem]) -> Result<Vec<ItemOutcome>> {
        let mut outcomes = Vec::with_capacity(items.len());
        for item in items {
            outcomes.push(self.process_one(item).await);
        }
        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::BatchId;
    use crate::record::in_memory::InMemoryRecordStore;
    use crate::record::OwnerId;
    use chrono::Utc;
    use serde_json::{json, Value};
    use uuid::Uuid;

    fn item(payload: Value) -> QueueItem {
        let batch_id = BatchId::new();
        QueueItem {
            id: Uuid::new_v4(),
            queue_name: batch_id.queue_name(),
            batch_id,
            payload,
            created_at: Utc::now(),
            lease_expiry: None,
        }
    }

    #[tokio::test]
    async fn test_creates_then_updates_idempotently() {
        let records = Arc::new(InMemoryRecordStore::new());
        let worker = SyncWorker::new(records.clone());

        let first = item(json!({
            "owner_id": 1,
            "unique_key": "slug-1",
            "title": "draft",
            "body": "v1"
        }));
        let outcomes = worker.process_bulk(std::slice::from_ref(&first)).await.unwrap();
        assert_eq!(outcomes, vec![ItemOutcome::Applied]);
        assert_eq!(records.len(), 1);

        // Same unique key again: one record, second write's values
        let second = item(json!({
            "owner_id": 1,
            "unique_key": "slug-1",
            "title": "published",
            "body": "v2"
        }));
        let outcomes = worker.process_bulk(std::slice::from_ref(&second)).await.unwrap();
        assert_eq!(outcomes, vec![ItemOutcome::Applied]);
        assert_eq!(records.len(), 1);

        let record = records
            .find_by_unique_key("slug-1", OwnerId(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.title.as_deref(), Some("published"));
        assert_eq!(record.fields.get("body"), Some(&json!("v2")));
    }

    #[tokio::test]
    async fn test_update_preserves_fields_absent_from_payload() {
        let records = Arc::new(InMemoryRecordStore::new());
        let worker = SyncWorker::new(records.clone());

        let create = item(json!({
            "owner_id": 1,
            "unique_key": "slug-1",
            "title": "original",
            "color": "red"
        }));
        worker.process_bulk(std::slice::from_ref(&create)).await.unwrap();

        // Update carries only the body; title and color must survive
        let update = item(json!({
            "owner_id": 1,
            "unique_key": "slug-1",
            "body": "text"
        }));
        worker.process_bulk(std::slice::from_ref(&update)).await.unwrap();

        let record = records
            .find_by_unique_key("slug-1", OwnerId(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.title.as_deref(), Some("original"));
        assert_eq!(record.fields.get("color"), Some(&json!("red")));
        assert_eq!(record.fields.get("body"), Some(&json!("text")));
    }

    #[tokio::test]
    async fn test_same_key_different_owner_creates_separate_records() {
        let records = Arc::new(InMemoryRecordStore::new());
        let worker = SyncWorker::new(records.clone());

        let for_owner_1 = item(json!({"owner_id": 1, "unique_key": "shared"}));
        let for_owner_2 = item(json!({"owner_id": 2, "unique_key": "shared"}));

        worker
            .process_bulk(&[for_owner_1, for_owner_2])
            .await
            .unwrap();

        assert_eq!(records.len(), 2);
    }

    #[tokio::test]
    async fn test_malformed_payload_discarded() {
        let records = Arc::new(InMemoryRecordStore::new());
        let worker = SyncWorker::new(records.clone());

        // owner_id missing
        let bad = item(json!({"unique_key": "slug-1"}));
        let outcomes = worker.process_bulk(std::slice::from_ref(&bad)).await.unwrap();

        assert!(matches!(outcomes[0], ItemOutcome::Discard(_)));
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_ambiguous_target_reported_not_guessed() {
        let records = Arc::new(InMemoryRecordStore::new());
        for key in ["a", "b"] {
            records
                .create(crate::record::RecordDraft {
                    owner_id: OwnerId(1),
                    unique_key: Some(key.to_string()),
                    title: Some("untitled".to_string()),
                    fields: Default::default(),
                })
                .await
                .unwrap();
        }

        let worker = SyncWorker::new(records.clone());
        let update = item(json!({
            "owner_id": 1,
            "action": "update",
            "title": "untitled"
        }));
        let outcomes = worker.process_bulk(std::slice::from_ref(&update)).await.unwrap();

        match &outcomes[0] {
            ItemOutcome::NeedsDisambiguation(candidates) => assert_eq!(candidates.len(), 2),
            other => panic!("expected NeedsDisambiguation, got {other:?}"),
        }
        // Neither record was touched
        assert_eq!(records.len(), 2);
    }
}
