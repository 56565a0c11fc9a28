//! SQLite store adapter (SQLx)
//!
//! The adapter for deployments where several worker processes share one
//! database. The claim is a single conditional `UPDATE … RETURNING`
//! statement, so two processes can never walk away with the same row from
//! one selection round, and `mark_invalid` is a conditional update whose
//! affected-row count makes idempotency observable.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use common::{CookiePayload, Platform};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::record::{CredentialRecord, CredentialStatus, now_ms};
use crate::store::CredentialStore;

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS credentials (
    id                TEXT PRIMARY KEY,
    platform          TEXT NOT NULL,
    cookie_payload    TEXT NOT NULL,
    status            TEXT NOT NULL,
    failure_reason    TEXT,
    last_validated_at INTEGER,
    last_selected_seq INTEGER NOT NULL DEFAULT 0,
    created_at        INTEGER NOT NULL
)
"#;

const CREATE_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_credentials_selection
ON credentials (platform, status, last_selected_seq)
"#;

/// SQLx-backed credential store.
pub struct SqliteCredentialStore {
    pool: SqlitePool,
}

impl SqliteCredentialStore {
    /// Wrap an existing pool. The schema must already be initialized.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if missing) a database file and initialize the
    /// schema. WAL mode keeps claim updates from blocking readers.
    pub async fn open(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        let store = Self { pool };
        store.init_schema().await?;
        info!(path = %path.display(), "credential database opened");
        Ok(store)
    }

    /// Private in-memory database, for tests.
    pub async fn in_memory() -> Result<Self> {
        // A single connection: every :memory: connection is its own database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Create the credentials table and selection index if absent.
    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query(CREATE_TABLE).execute(&self.pool).await?;
        sqlx::query(CREATE_INDEX).execute(&self.pool).await?;
        Ok(())
    }
}

fn row_to_record(row: &SqliteRow) -> Result<CredentialRecord> {
    let id: String = row.try_get("id")?;
    let id = Uuid::parse_str(&id).map_err(|e| Error::Corrupt(format!("id {id}: {e}")))?;

    let platform: String = row.try_get("platform")?;
    let platform: Platform = platform
        .parse()
        .map_err(|_| Error::Corrupt(format!("platform {platform}")))?;

    let status: String = row.try_get("status")?;
    let status = CredentialStatus::parse(&status)
        .ok_or_else(|| Error::Corrupt(format!("status {status}")))?;

    let cookie_payload: String = row.try_get("cookie_payload")?;
    let last_validated_at: Option<i64> = row.try_get("last_validated_at")?;
    let last_selected_seq: i64 = row.try_get("last_selected_seq")?;
    let created_at: i64 = row.try_get("created_at")?;

    Ok(CredentialRecord {
        id,
        platform,
        cookie_payload: CookiePayload::new(cookie_payload),
        status,
        failure_reason: row.try_get("failure_reason")?,
        last_validated_at: last_validated_at.map(|v| v as u64),
        last_selected_seq: last_selected_seq as u64,
        created_at: created_at as u64,
    })
}

#[async_trait]
impl CredentialStore for SqliteCredentialStore {
    async fn select_active(
        &self,
        platform: Platform,
        excluded: &[Uuid],
    ) -> Result<Option<CredentialRecord>> {
        // One statement claims the row and returns it: the inner SELECT
        // picks the least-recently-selected active row, the UPDATE bumps
        // its rotation counter. Assembled dynamically because the exclusion
        // list has a caller-determined length.
        let mut sql = String::from(
            "UPDATE credentials \
             SET last_selected_seq = (SELECT IFNULL(MAX(last_selected_seq), 0) + 1 FROM credentials) \
             WHERE id = (\
                 SELECT id FROM credentials \
                 WHERE platform = ? AND status = 'ACTIVE'",
        );
        for _ in excluded {
            sql.push_str(" AND id <> ?");
        }
        sql.push_str(
            " ORDER BY last_selected_seq, id LIMIT 1) \
             RETURNING id, platform, cookie_payload, status, failure_reason, \
                       last_validated_at, last_selected_seq, created_at",
        );

        let mut query = sqlx::query(&sql).bind(platform.as_str());
        for id in excluded {
            query = query.bind(id.to_string());
        }

        let row = query.fetch_optional(&self.pool).await?;
        match row {
            Some(row) => {
                let record = row_to_record(&row)?;
                debug!(platform = %platform, id = %record.id, "claimed credential");
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    async fn mark_invalid(&self, id: Uuid, reason: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE credentials SET status = 'INVALID', failure_reason = ? \
             WHERE id = ? AND status = 'ACTIVE'",
        )
        .bind(reason)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }

        // No row transitioned: either already invalid or unknown.
        let exists = sqlx::query("SELECT 1 FROM credentials WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        if exists.is_some() {
            Ok(false)
        } else {
            Err(Error::NotFound(id))
        }
    }

    async fn record_validated(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query("UPDATE credentials SET last_validated_at = ? WHERE id = ?")
            .bind(now_ms() as i64)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(id));
        }
        Ok(())
    }

    async fn list(&self, platform: Platform) -> Result<Vec<CredentialRecord>> {
        let rows = sqlx::query(
            "SELECT id, platform, cookie_payload, status, failure_reason, \
                    last_validated_at, last_selected_seq, created_at \
             FROM credentials WHERE platform = ? ORDER BY created_at, id",
        )
        .bind(platform.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_record).collect()
    }

    async fn counts(&self, platform: Platform) -> Result<(usize, usize)> {
        let active: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM credentials WHERE platform = ? AND status = 'ACTIVE'",
        )
        .bind(platform.as_str())
        .fetch_one(&self.pool)
        .await?;
        let invalid: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM credentials WHERE platform = ? AND status = 'INVALID'",
        )
        .bind(platform.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok((active as usize, invalid as usize))
    }

    async fn insert(&self, record: CredentialRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO credentials \
             (id, platform, cookie_payload, status, failure_reason, \
              last_validated_at, last_selected_seq, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(record.id.to_string())
        .bind(record.platform.as_str())
        .bind(record.cookie_payload.expose())
        .bind(record.status.as_str())
        .bind(&record.failure_reason)
        .bind(record.last_validated_at.map(|v| v as i64))
        .bind(record.last_selected_seq as i64)
        .bind(record.created_at as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    async fn seeded(store: &SqliteCredentialStore, platform: Platform, n: usize) -> Vec<Uuid> {
        let mut ids = Vec::new();
        for i in 0..n {
            let record =
                CredentialRecord::new(platform, CookiePayload::new(format!("session={i}")));
            ids.push(record.id);
            store.insert(record).await.unwrap();
        }
        ids
    }

    #[tokio::test]
    async fn insert_and_list_round_trip() {
        let store = SqliteCredentialStore::in_memory().await.unwrap();
        let ids = seeded(&store, Platform::Xhs, 2).await;

        let records = store.list(Platform::Xhs).await.unwrap();
        assert_eq!(records.len(), 2);
        for record in &records {
            assert!(ids.contains(&record.id));
            assert!(record.is_active());
            assert!(record.cookie_payload.expose().starts_with("session="));
        }
    }

    #[tokio::test]
    async fn claim_rotates_least_recently_selected_first() {
        let store = SqliteCredentialStore::in_memory().await.unwrap();
        seeded(&store, Platform::Xhs, 3).await;

        let a = store.select_active(Platform::Xhs, &[]).await.unwrap().unwrap();
        let b = store.select_active(Platform::Xhs, &[]).await.unwrap().unwrap();
        let c = store.select_active(Platform::Xhs, &[]).await.unwrap().unwrap();
        let d = store.select_active(Platform::Xhs, &[]).await.unwrap().unwrap();

        assert_ne!(a.id, b.id);
        assert_ne!(b.id, c.id);
        assert_ne!(a.id, c.id);
        assert_eq!(d.id, a.id, "rotation wraps to the oldest claim");
    }

    #[tokio::test]
    async fn claim_skips_excluded_and_invalid_rows() {
        let store = SqliteCredentialStore::in_memory().await.unwrap();
        let ids = seeded(&store, Platform::Douyin, 3).await;

        store.mark_invalid(ids[0], "dead").await.unwrap();

        let picked = store
            .select_active(Platform::Douyin, &[ids[1]])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(picked.id, ids[2]);

        let none = store
            .select_active(Platform::Douyin, &[ids[1], ids[2]])
            .await
            .unwrap();
        assert!(none.is_none());
    }

    #[tokio::test]
    async fn exhausted_platform_claims_nothing() {
        let store = SqliteCredentialStore::in_memory().await.unwrap();
        seeded(&store, Platform::Weibo, 1).await;
        assert!(store.select_active(Platform::Zhihu, &[]).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn mark_invalid_is_idempotent_and_keeps_first_reason() {
        let store = SqliteCredentialStore::in_memory().await.unwrap();
        let ids = seeded(&store, Platform::Bilibili, 1).await;

        assert!(store.mark_invalid(ids[0], "probe timed out").await.unwrap());
        assert!(!store.mark_invalid(ids[0], "later reason").await.unwrap());

        let records = store.list(Platform::Bilibili).await.unwrap();
        assert_eq!(records[0].status, CredentialStatus::Invalid);
        assert_eq!(records[0].failure_reason.as_deref(), Some("probe timed out"));
    }

    #[tokio::test]
    async fn mark_invalid_unknown_id_is_not_found() {
        let store = SqliteCredentialStore::in_memory().await.unwrap();
        let err = store.mark_invalid(Uuid::new_v4(), "x").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn record_validated_touches_timestamp() {
        let store = SqliteCredentialStore::in_memory().await.unwrap();
        let ids = seeded(&store, Platform::Xhs, 1).await;

        store.record_validated(ids[0]).await.unwrap();
        let records = store.list(Platform::Xhs).await.unwrap();
        assert!(records[0].last_validated_at.is_some());
    }

    #[tokio::test]
    async fn counts_split_by_status() {
        let store = SqliteCredentialStore::in_memory().await.unwrap();
        let ids = seeded(&store, Platform::Tieba, 4).await;
        store.mark_invalid(ids[0], "dead").await.unwrap();

        let (active, invalid) = store.counts(Platform::Tieba).await.unwrap();
        assert_eq!((active, invalid), (3, 1));
    }

    #[tokio::test]
    async fn concurrent_claims_on_shared_file_are_distinct() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.db");
        let store = Arc::new(SqliteCredentialStore::open(&path).await.unwrap());
        let n = 4;
        seeded(&store, Platform::Kuaishou, n).await;

        let mut handles = Vec::new();
        for _ in 0..n {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .select_active(Platform::Kuaishou, &[])
                    .await
                    .unwrap()
                    .unwrap()
                    .id
            }));
        }

        let mut claimed = Vec::new();
        for handle in handles {
            claimed.push(handle.await.unwrap());
        }
        claimed.sort_unstable();
        claimed.dedup();
        assert_eq!(claimed.len(), n, "each concurrent claim must be distinct");
    }

    #[tokio::test]
    async fn reopen_preserves_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.db");

        let ids = {
            let store = SqliteCredentialStore::open(&path).await.unwrap();
            let ids = seeded(&store, Platform::Xhs, 1).await;
            store.mark_invalid(ids[0], "login expired").await.unwrap();
            ids
        };

        let store = SqliteCredentialStore::open(&path).await.unwrap();
        let records = store.list(Platform::Xhs).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, ids[0]);
        assert_eq!(records[0].status, CredentialStatus::Invalid);
        assert_eq!(records[0].failure_reason.as_deref(), Some("login expired"));
    }
}
