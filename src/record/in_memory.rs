//! In-memory record store.
//!
//! Serves as the test double for worker logic and as a backend for
//! single-process deployments. Ids are assigned from a monotonic counter, the
//! way a database sequence would.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{EngineError, Result};

use super::{OwnerId, Record, RecordChanges, RecordDraft, RecordId, RecordStore};

/// In-memory implementation of the [`RecordStore`] trait.
#[derive(Clone, Default)]
pub struct InMemoryRecordStore {
    records: Arc<RwLock<HashMap<RecordId, Record>>>,
    next_id: Arc<AtomicI64>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
            next_id: Arc::new(AtomicI64::new(1)),
        }
    }

    /// Total record count across all owners (test helper).
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl RecordStore for InMemoryRecordStore {
    async fn find_by_id(&self, id: RecordId, owner: OwnerId) -> Result<Option<Record>> {
        let records = self.records.read();
        Ok(records
            .get(&id)
            .filter(|record| record.owner_id == owner)
            .cloned())
    }

    async fn find_by_unique_key(&self, key: &str, owner: OwnerId) -> Result<Option<Record>> {
        let records = self.records.read();
        Ok(records
            .values()
            .find(|record| {
                record.owner_id == owner && record.unique_key.as_deref() == Some(key)
            })
            .cloned())
    }

    async fn find_all_by_owner(&self, owner: OwnerId) -> Result<Vec<Record>> {
        let records = self.records.read();
        let mut owned: Vec<Record> = records
            .values()
            .filter(|record| record.owner_id == owner)
            .cloned()
            .collect();
        owned.sort_by_key(|record| record.id);
        Ok(owned)
    }

    async fn create(&self, draft: RecordDraft) -> Result<Record> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let record = Record {
            id,
            owner_id: draft.owner_id,
            unique_key: draft.unique_key,
            title: draft.title,
            fields: draft.fields,
        };

        self.records.write().insert(id, record.clone());
        Ok(record)
    }

    async fn update(&self, id: RecordId, changes: RecordChanges) -> Result<()> {
        let mut records = self.records.write();
        let record = records
            .get_mut(&id)
            .ok_or_else(|| EngineError::Internal(format!("record {id} not found")))?;

        if let Some(unique_key) = changes.unique_key {
            record.unique_key = Some(unique_key);
        }
        if let Some(title) = changes.title {
            record.title = Some(title);
        }
        for (key, value) in changes.fields {
            record.fields.insert(key, value);
        }

        Ok(())
    }

    async fn delete(&self, id: RecordId) -> Result<()> {
        self.records
            .write()
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| EngineError::Internal(format!("record {id} not found")))
    }
}
