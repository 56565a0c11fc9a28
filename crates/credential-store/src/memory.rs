//! In-memory store adapter
//!
//! A tokio-mutex-serialized map, sufficient for a single-instance
//! deployment and for tests. Every trait operation takes the lock once, so
//! selection and invalidation are trivially atomic relative to each other.

use std::collections::HashMap;

use async_trait::async_trait;
use common::Platform;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::record::{CredentialRecord, CredentialStatus, now_ms};
use crate::store::CredentialStore;

#[derive(Default)]
struct Inner {
    records: HashMap<Uuid, CredentialRecord>,
    /// Logical clock for selection rotation; strictly increases per claim.
    selection_clock: u64,
}

/// Single-process credential store.
#[derive(Default)]
pub struct MemoryCredentialStore {
    state: Mutex<Inner>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn select_active(
        &self,
        platform: Platform,
        excluded: &[Uuid],
    ) -> Result<Option<CredentialRecord>> {
        let mut state = self.state.lock().await;

        // Least-recently-selected active record, id as the tie-break.
        let picked = state
            .records
            .values()
            .filter(|r| r.platform == platform && r.is_active() && !excluded.contains(&r.id))
            .min_by_key(|r| (r.last_selected_seq, r.id))
            .map(|r| r.id);

        let Some(id) = picked else {
            return Ok(None);
        };

        state.selection_clock += 1;
        let seq = state.selection_clock;
        let record = state
            .records
            .get_mut(&id)
            .ok_or(Error::NotFound(id))?;
        record.last_selected_seq = seq;
        debug!(platform = %platform, id = %id, seq, "claimed credential");
        Ok(Some(record.clone()))
    }

    async fn mark_invalid(&self, id: Uuid, reason: &str) -> Result<bool> {
        let mut state = self.state.lock().await;
        let record = state.records.get_mut(&id).ok_or(Error::NotFound(id))?;
        if record.status == CredentialStatus::Invalid {
            return Ok(false);
        }
        record.status = CredentialStatus::Invalid;
        record.failure_reason = Some(reason.to_string());
        Ok(true)
    }

    async fn record_validated(&self, id: Uuid) -> Result<()> {
        let mut state = self.state.lock().await;
        let record = state.records.get_mut(&id).ok_or(Error::NotFound(id))?;
        record.last_validated_at = Some(now_ms());
        Ok(())
    }

    async fn list(&self, platform: Platform) -> Result<Vec<CredentialRecord>> {
        let state = self.state.lock().await;
        let mut records: Vec<CredentialRecord> = state
            .records
            .values()
            .filter(|r| r.platform == platform)
            .cloned()
            .collect();
        records.sort_by_key(|r| (r.created_at, r.id));
        Ok(records)
    }

    async fn counts(&self, platform: Platform) -> Result<(usize, usize)> {
        let state = self.state.lock().await;
        let mut active = 0;
        let mut invalid = 0;
        for record in state.records.values() {
            if record.platform != platform {
                continue;
            }
            match record.status {
                CredentialStatus::Active => active += 1,
                CredentialStatus::Invalid => invalid += 1,
            }
        }
        Ok((active, invalid))
    }

    async fn insert(&self, record: CredentialRecord) -> Result<()> {
        let mut state = self.state.lock().await;
        state.selection_clock = state.selection_clock.max(record.last_selected_seq);
        state.records.insert(record.id, record);
        Ok(())
    }
}
