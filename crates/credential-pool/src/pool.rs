//! Pool operations over the credential store
//!
//! The pool owns nothing durable — the store is the single source of truth
//! — but it serializes selection and invalidation per platform, so two
//! concurrent callers can never interleave a claim with an invalidation.
//! Each critical section is narrow: one store call (or, for
//! `invalidate_then_select`, the invalidate+reselect pair the coordinator
//! needs to be atomic). No lock is held across a probe.

use std::collections::HashMap;
use std::sync::Arc;

use common::Platform;
use credential_store::{CredentialRecord, CredentialStore};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

type StoreResult<T> = std::result::Result<T, credential_store::Error>;

/// Selection and invalidation over a shared credential store, serialized
/// per platform.
pub struct CredentialPool {
    store: Arc<dyn CredentialStore>,
    locks: HashMap<Platform, Mutex<()>>,
}

impl CredentialPool {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        let locks = Platform::ALL
            .into_iter()
            .map(|p| (p, Mutex::new(())))
            .collect();
        Self { store, locks }
    }

    /// The backing store (used by the sweep for listing records).
    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    fn platform_lock(&self, platform: Platform) -> &Mutex<()> {
        // The table is built over Platform::ALL at construction.
        self.locks
            .get(&platform)
            .expect("lock table covers every platform")
    }

    /// Claim one ACTIVE record for the platform, skipping `excluded` ids.
    ///
    /// Returns `None` on pool exhaustion — never an error. Exhaustion
    /// classification is the coordinator's concern.
    pub async fn get_one(
        &self,
        platform: Platform,
        excluded: &[Uuid],
    ) -> StoreResult<Option<CredentialRecord>> {
        let _guard = self.platform_lock(platform).lock().await;
        let record = self.store.select_active(platform, excluded).await?;
        match &record {
            Some(record) => {
                metrics::counter!("credpool_selections_total", "platform" => platform.as_str())
                    .increment(1);
                debug!(platform = %platform, id = %record.id, "credential selected");
            }
            None => {
                debug!(platform = %platform, "no active credential to select");
            }
        }
        Ok(record)
    }

    /// Transition a record ACTIVE → INVALID. Idempotent: a repeat call on
    /// the same id is a no-op and returns `false`.
    pub async fn mark_invalid(
        &self,
        platform: Platform,
        id: Uuid,
        reason: &str,
    ) -> StoreResult<bool> {
        let _guard = self.platform_lock(platform).lock().await;
        self.mark_invalid_locked(platform, id, reason).await
    }

    /// Invalidate a failed record and claim the next one as a single
    /// critical section, so the failed record is provably excluded from
    /// the reselection that follows it.
    pub async fn invalidate_then_select(
        &self,
        platform: Platform,
        failed: Uuid,
        reason: &str,
        excluded: &[Uuid],
    ) -> StoreResult<Option<CredentialRecord>> {
        let _guard = self.platform_lock(platform).lock().await;
        self.mark_invalid_locked(platform, failed, reason).await?;
        self.store.select_active(platform, excluded).await
    }

    /// Touch `last_validated_at` after a successful probe.
    pub async fn record_validated(&self, id: Uuid) -> StoreResult<()> {
        self.store.record_validated(id).await
    }

    /// `(active, invalid)` counts for a platform.
    pub async fn counts(&self, platform: Platform) -> StoreResult<(usize, usize)> {
        self.store.counts(platform).await
    }

    /// Pool health summary for the health endpoint.
    ///
    /// Status mapping: every platform that has records also has an active
    /// one → healthy; some do → degraded; none do (or no records at all)
    /// → unhealthy.
    pub async fn health(&self) -> StoreResult<serde_json::Value> {
        let mut platforms = Vec::new();
        let mut populated = 0usize;
        let mut populated_with_active = 0usize;
        let mut total_active = 0usize;
        let mut total_invalid = 0usize;

        for platform in Platform::ALL {
            let (active, invalid) = self.store.counts(platform).await?;
            if active + invalid > 0 {
                populated += 1;
                if active > 0 {
                    populated_with_active += 1;
                }
            }
            total_active += active;
            total_invalid += invalid;
            platforms.push(serde_json::json!({
                "platform": platform.as_str(),
                "active": active,
                "invalid": invalid,
            }));
        }

        let status = if populated > 0 && populated_with_active == populated {
            "healthy"
        } else if total_active > 0 {
            "degraded"
        } else {
            "unhealthy"
        };

        Ok(serde_json::json!({
            "status": status,
            "credentials_active": total_active,
            "credentials_invalid": total_invalid,
            "platforms": platforms,
        }))
    }

    async fn mark_invalid_locked(
        &self,
        platform: Platform,
        id: Uuid,
        reason: &str,
    ) -> StoreResult<bool> {
        let transitioned = self.store.mark_invalid(id, reason).await?;
        if transitioned {
            metrics::counter!("credpool_invalidations_total", "platform" => platform.as_str())
                .increment(1);
            warn!(platform = %platform, id = %id, reason, "credential invalidated");
        } else {
            debug!(platform = %platform, id = %id, "credential already invalid");
        }
        Ok(transitioned)
    }
}
