//! Client-factory contract for platform scraper clients
//!
//! Defines the two traits the credential pool consumes: `ClientFactory`
//! builds an opaque client from a platform + cookie payload, and the built
//! `PlatformClient` exposes exactly one capability this subsystem cares
//! about — `probe()`, a lightweight round-trip confirming the session still
//! authenticates. Everything else a client can do (queries, downloads)
//! belongs to the platform teams and is invisible here.
//!
//! Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
//! (`Arc<dyn ClientFactory>`, `Arc<dyn PlatformClient>`).

pub mod http;

pub use http::CookieHttpFactory;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use common::{CookiePayload, Platform};

/// Errors from constructing a client.
///
/// A build failure is not evidence the credential is bad — the pool never
/// invalidates on it. These abort the enclosing operation as-is.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("malformed cookie payload: {0}")]
    MalformedCookies(String),

    #[error("client construction failed: {0}")]
    Construction(String),
}

/// Errors raised during a probe round-trip.
///
/// The acquisition coordinator treats every variant the same as a `false`
/// probe result; the distinction only matters for logging and the recorded
/// failure reason.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("probe request failed: {0}")]
    Transport(String),

    #[error("probe endpoint returned unexpected status {0}")]
    Status(u16),

    #[error("probe timed out after {0:?}")]
    Timeout(Duration),
}

/// Result alias for client construction.
pub type BuildResult<T> = std::result::Result<T, BuildError>;

/// Result of one probe: `Ok(true)` authenticated, `Ok(false)` rejected.
pub type ProbeResult = std::result::Result<bool, ProbeError>;

/// A built platform client, opaque beyond its health probe.
pub trait PlatformClient: Send + Sync + std::fmt::Debug {
    /// Platform this client was built for.
    fn platform(&self) -> Platform;

    /// Round-trip check of the session: `true` means the cookie payload
    /// still authenticates against the platform.
    fn probe(&self) -> Pin<Box<dyn Future<Output = ProbeResult> + Send + '_>>;
}

/// Builds clients from a platform and a cookie payload.
pub trait ClientFactory: Send + Sync {
    /// Identifier for logging (e.g. "cookie-http").
    fn id(&self) -> &str;

    /// Construct a client holding the given session.
    fn build<'a>(
        &'a self,
        platform: Platform,
        cookies: &'a CookiePayload,
    ) -> Pin<Box<dyn Future<Output = BuildResult<Arc<dyn PlatformClient>>> + Send + 'a>>;
}

/// Run a probe under a deadline.
///
/// A probe that exceeds the deadline yields `ProbeError::Timeout` — callers
/// never stall on a hung probe.
pub async fn probe_with_timeout(client: &dyn PlatformClient, timeout: Duration) -> ProbeResult {
    match tokio::time::timeout(timeout, client.probe()).await {
        Ok(result) => result,
        Err(_) => Err(ProbeError::Timeout(timeout)),
    }
}
