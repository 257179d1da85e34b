//! Identity resolution for reconciliation payloads.
//!
//! Client-supplied primary keys are not reliable: the backend id may be stale,
//! the unique key is derived from a mutable natural field, and some producers
//! send neither. Resolution therefore walks a priority order, every step scoped
//! to the payload's owner:
//!
//! 1. backend id (update hint only)
//! 2. unique key
//! 3. fallback heuristics: an owner with exactly one record, then an exact
//!    title match among the owner's records
//! 4. nothing matched: create
//!
//! When the title fallback matches several records the resolution refuses to
//! guess and reports the candidates instead.

use crate::error::Result;
use crate::record::{Record, RecordId, RecordStore};

use super::{ActionHint, DeletePayload, SyncPayload};

/// Where a sync payload should land.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Update this existing record.
    Existing(Record),
    /// Nothing matched; create a new record.
    CreateNew,
    /// Several records plausibly match; caller must disambiguate.
    Ambiguous(Vec<RecordId>),
}

/// What a delete payload points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteTarget {
    Found(Record),
    NotFound,
    Ambiguous(Vec<RecordId>),
}

/// Match an owner's records by exact title.
fn title_matches<'a>(records: &'a [Record], title: &str) -> Vec<&'a Record> {
    records
        .iter()
        .filter(|record| record.title.as_deref() == Some(title))
        .collect()
}

/// Resolve the target record for a create-or-update payload.
pub async fn resolve_sync_target<R: RecordStore>(
    records: &R,
    payload: &SyncPayload,
) -> Result<Resolution> {
    let is_update = payload.action == Some(ActionHint::Update);

    // 1. Internal id, trusted only for updates. Owner scoping is the store's:
    //    an id under another owner comes back as None and we keep looking.
    if is_update {
        if let Some(id) = payload.backend_id {
            if let Some(record) = records.find_by_id(id, payload.owner_id).await? {
                return Ok(Resolution::Existing(record));
            }
        }
    }

    // 2. Unique key within the owner scope.
    if let Some(key) = payload.unique_key.as_deref() {
        if let Some(record) = records.find_by_unique_key(key, payload.owner_id).await? {
            return Ok(Resolution::Existing(record));
        }
    }

    // 3. Heuristic fallback, update hint only. Best effort: an owner with one
    //    record is unambiguous, a unique title match is accepted, anything
    //    else is surfaced instead of guessed.
    if is_update {
        let owned = records.find_all_by_owner(payload.owner_id).await?;
        if let [only] = owned.as_slice() {
            return Ok(Resolution::Existing(only.clone()));
        }

        if let Some(title) = payload.title.as_deref() {
            let matches = title_matches(&owned, title);
            match matches.len() {
                0 => {}
                1 => return Ok(Resolution::Existing(matches[0].clone())),
                _ => {
                    return Ok(Resolution::Ambiguous(
                        matches.iter().map(|record| record.id).collect(),
                    ))
                }
            }
        }
    }

    // 4. Nothing matched: treat as create.
    Ok(Resolution::CreateNew)
}

/// Resolve the target record for a delete payload.
///
/// Same priority order as sync steps 1-2 (the backend id is trusted without an
/// action hint here), plus the title fallback.
pub async fn resolve_delete_target<R: RecordStore>(
    records: &R,
    payload: &DeletePayload,
) -> Result<DeleteTarget> {
    if let Some(id) = payload.backend_id {
        if let Some(record) = records.find_by_id(id, payload.owner_id).await? {
            return Ok(DeleteTarget::Found(record));
        }
    }

    if let Some(key) = payload.unique_key.as_deref() {
        if let Some(record) = records.find_by_unique_key(key, payload.owner_id).await? {
            return Ok(DeleteTarget::Found(record));
        }
    }

    if let Some(title) = payload.title.as_deref() {
        let owned = records.find_all_by_owner(payload.owner_id).await?;
        let matches = title_matches(&owned, title);
        match matches.len() {
            0 => {}
            1 => return Ok(DeleteTarget::Found(matches[0].clone())),
            _ => {
                return Ok(DeleteTarget::Ambiguous(
                    matches.iter().map(|record| record.id).collect(),
                ))
            }
        }
    }

    Ok(DeleteTarget::NotFound)
}
