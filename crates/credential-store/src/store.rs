//! Store contract consumed by the pool

use async_trait::async_trait;
use common::Platform;
use uuid::Uuid;

use crate::error::Result;
use crate::record::CredentialRecord;

/// Durable credential state, shared by every pool instance.
///
/// `select_active` and `mark_invalid` are the only mutating operations the
/// pool issues on the request path; both must be individually atomic so
/// that concurrent callers — in this process or another sharing the same
/// database — never race a claim against an invalidation.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Atomically claim the least-recently-selected `Active` record for
    /// the platform, skipping any id in `excluded`. Returns `None` when no
    /// such record exists — exhaustion is not an error at this layer.
    ///
    /// Claiming bumps the record's `last_selected_seq`, so a concurrent
    /// claim for the same platform lands on a different record whenever
    /// more than one is active.
    async fn select_active(
        &self,
        platform: Platform,
        excluded: &[Uuid],
    ) -> Result<Option<CredentialRecord>>;

    /// Transition `Active` → `Invalid`, recording the probe failure
    /// reason. Returns `Ok(true)` if this call performed the transition,
    /// `Ok(false)` if the record was already invalid (idempotent no-op),
    /// and `Error::NotFound` for an unknown id.
    async fn mark_invalid(&self, id: Uuid, reason: &str) -> Result<bool>;

    /// Touch `last_validated_at` after a successful probe.
    async fn record_validated(&self, id: Uuid) -> Result<()>;

    /// All records for a platform, any status.
    async fn list(&self, platform: Platform) -> Result<Vec<CredentialRecord>>;

    /// `(active, invalid)` counts for a platform.
    async fn counts(&self, platform: Platform) -> Result<(usize, usize)>;

    /// Administrative import seam. Records are created externally; this
    /// subsystem only consumes them. Exposed for operator tooling and
    /// tests.
    async fn insert(&self, record: CredentialRecord) -> Result<()>;
}
