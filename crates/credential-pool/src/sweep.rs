//! Background validation sweep
//!
//! Periodically probes every ACTIVE credential so dead sessions are
//! retired between acquisitions instead of burning a worker's retry
//! budget. The sweep runs independently of the request path and only ever
//! moves credentials ACTIVE → INVALID; it never reactivates anything.

use std::sync::Arc;
use std::time::Duration;

use common::Platform;
use platform_client::{ClientFactory, probe_with_timeout};
use tracing::{debug, info, warn};

use crate::pool::CredentialPool;

/// Spawn a task that sweeps the pool every `interval`.
///
/// Probe failures invalidate the credential with a sweep-prefixed reason;
/// build failures leave it untouched (a build failure is not evidence the
/// credential is bad). Returns the `JoinHandle` for the spawned task.
pub fn spawn_sweep_task(
    pool: Arc<CredentialPool>,
    factory: Arc<dyn ClientFactory>,
    interval: Duration,
    probe_timeout: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // Skip the immediate first tick — credentials were just loaded or
        // are being exercised by the request path already.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            sweep_cycle(&pool, factory.as_ref(), probe_timeout).await;
        }
    })
}

/// Run one sweep cycle over every platform.
async fn sweep_cycle(pool: &CredentialPool, factory: &dyn ClientFactory, probe_timeout: Duration) {
    for platform in Platform::ALL {
        let records = match pool.store().list(platform).await {
            Ok(records) => records,
            Err(e) => {
                warn!(platform = %platform, error = %e, "sweep could not list credentials");
                continue;
            }
        };

        let mut checked = 0usize;
        let mut retired = 0usize;

        for record in records.into_iter().filter(|r| r.is_active()) {
            checked += 1;
            let client = match factory.build(platform, &record.cookie_payload).await {
                Ok(client) => client,
                Err(e) => {
                    warn!(
                        platform = %platform,
                        id = %record.id,
                        error = %e,
                        "sweep build failed, leaving credential untouched"
                    );
                    continue;
                }
            };

            match probe_with_timeout(client.as_ref(), probe_timeout).await {
                Ok(true) => {
                    if let Err(e) = pool.record_validated(record.id).await {
                        warn!(platform = %platform, id = %record.id, error = %e, "failed to record validation");
                    }
                    debug!(platform = %platform, id = %record.id, "sweep probe passed");
                }
                Ok(false) => {
                    retired += 1;
                    if let Err(e) = pool
                        .mark_invalid(platform, record.id, "sweep: probe rejected credential")
                        .await
                    {
                        warn!(platform = %platform, id = %record.id, error = %e, "sweep invalidation failed");
                    }
                }
                Err(e) => {
                    retired += 1;
                    let reason = format!("sweep: probe failed: {e}");
                    if let Err(e) = pool.mark_invalid(platform, record.id, &reason).await {
                        warn!(platform = %platform, id = %record.id, error = %e, "sweep invalidation failed");
                    }
                }
            }
        }

        if checked > 0 {
            info!(platform = %platform, checked, retired, "sweep cycle finished");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;
    use std::pin::Pin;

    use common::CookiePayload;
    use credential_store::{
        CredentialRecord, CredentialStatus, CredentialStore, MemoryCredentialStore,
    };
    use platform_client::{BuildError, BuildResult, PlatformClient, ProbeResult};

    /// Factory scripted by cookie payload, as in the coordinator tests.
    struct ScriptedFactory;

    #[derive(Debug)]
    struct ScriptedClient {
        platform: Platform,
        directive: String,
    }

    impl PlatformClient for ScriptedClient {
        fn platform(&self) -> Platform {
            self.platform
        }

        fn probe(&self) -> Pin<Box<dyn Future<Output = ProbeResult> + Send + '_>> {
            Box::pin(async move { Ok(!self.directive.contains("probe:reject")) })
        }
    }

    impl ClientFactory for ScriptedFactory {
        fn id(&self) -> &str {
            "scripted"
        }

        fn build<'a>(
            &'a self,
            platform: Platform,
            cookies: &'a CookiePayload,
        ) -> Pin<Box<dyn Future<Output = BuildResult<Arc<dyn PlatformClient>>> + Send + 'a>>
        {
            let directive = cookies.expose().to_string();
            Box::pin(async move {
                if directive.contains("build:fail") {
                    return Err(BuildError::Construction("scripted build failure".into()));
                }
                Ok(Arc::new(ScriptedClient {
                    platform,
                    directive,
                }) as Arc<dyn PlatformClient>)
            })
        }
    }

    async fn seeded_pool(cookies: &[&str]) -> (Arc<CredentialPool>, Arc<MemoryCredentialStore>) {
        let store = Arc::new(MemoryCredentialStore::new());
        for cookie in cookies {
            store
                .insert(CredentialRecord::new(
                    Platform::Xhs,
                    CookiePayload::new(*cookie),
                ))
                .await
                .unwrap();
        }
        let pool = Arc::new(CredentialPool::new(
            store.clone() as Arc<dyn CredentialStore>
        ));
        (pool, store)
    }

    #[tokio::test]
    async fn sweep_retires_failing_and_touches_passing() {
        let (pool, store) = seeded_pool(&["good|probe:ok", "bad|probe:reject"]).await;

        sweep_cycle(&pool, &ScriptedFactory, Duration::from_secs(5)).await;

        let records = store.list(Platform::Xhs).await.unwrap();
        let good = records
            .iter()
            .find(|r| r.cookie_payload.expose().starts_with("good"))
            .unwrap();
        let bad = records
            .iter()
            .find(|r| r.cookie_payload.expose().starts_with("bad"))
            .unwrap();

        assert_eq!(good.status, CredentialStatus::Active);
        assert!(good.last_validated_at.is_some());
        assert_eq!(bad.status, CredentialStatus::Invalid);
        assert!(bad.failure_reason.as_deref().unwrap().starts_with("sweep:"));
    }

    #[tokio::test]
    async fn sweep_leaves_unbuildable_credentials_untouched() {
        let (pool, store) = seeded_pool(&["odd|build:fail"]).await;

        sweep_cycle(&pool, &ScriptedFactory, Duration::from_secs(5)).await;

        let records = store.list(Platform::Xhs).await.unwrap();
        assert_eq!(records[0].status, CredentialStatus::Active);
        assert!(records[0].failure_reason.is_none());
    }

    #[tokio::test]
    async fn sweep_skips_already_invalid_credentials() {
        let (pool, store) = seeded_pool(&[]).await;
        let mut dead = CredentialRecord::new(Platform::Xhs, CookiePayload::new("dead|probe:ok"));
        dead.status = CredentialStatus::Invalid;
        dead.failure_reason = Some("retired earlier".into());
        store.insert(dead).await.unwrap();

        sweep_cycle(&pool, &ScriptedFactory, Duration::from_secs(5)).await;

        let records = store.list(Platform::Xhs).await.unwrap();
        assert_eq!(
            records[0].failure_reason.as_deref(),
            Some("retired earlier"),
            "sweep must not probe or rewrite invalid records"
        );
        assert!(records[0].last_validated_at.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_sweep_waits_out_the_first_tick() {
        let (pool, store) = seeded_pool(&["bad|probe:reject"]).await;
        let handle = spawn_sweep_task(
            pool,
            Arc::new(ScriptedFactory),
            Duration::from_secs(60),
            Duration::from_secs(5),
        );

        // Let the task reach its first (skipped) tick.
        tokio::task::yield_now().await;
        let (active, _) = store.counts(Platform::Xhs).await.unwrap();
        assert_eq!(active, 1, "nothing swept before the first interval");

        tokio::time::sleep(Duration::from_secs(61)).await;
        tokio::task::yield_now().await;
        let (active, invalid) = store.counts(Platform::Xhs).await.unwrap();
        assert_eq!((active, invalid), (0, 1), "first interval sweep ran");

        handle.abort();
    }
}
