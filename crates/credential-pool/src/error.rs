//! Error types for acquisition

use common::Platform;

/// Terminal failures of one logical acquire operation.
///
/// Only a probe failure mutates pool state, and probe failures are never
/// surfaced directly — they are consumed by the retry loop and show up
/// here only as the `last_failure` detail of `RetriesExhausted`.
#[derive(Debug, thiserror::Error)]
pub enum AcquireError {
    /// No ACTIVE credential at selection time, at start or mid-loop.
    #[error("credential pool exhausted for {platform} ({detail})")]
    PoolExhausted { platform: Platform, detail: String },

    /// `max_tries` build+probe attempts consumed, all failed.
    #[error("retries exhausted for {platform} after {attempts} attempts (last failure: {last_failure})")]
    RetriesExhausted {
        platform: Platform,
        attempts: u32,
        last_failure: String,
    },

    /// Client construction failed. The credential is not implicated and is
    /// never invalidated on this path.
    #[error("client build failed: {0}")]
    Build(#[from] platform_client::BuildError),

    /// The store underneath the pool failed.
    #[error("credential store error: {0}")]
    Store(#[from] credential_store::Error),
}

/// Result alias for acquisition operations.
pub type Result<T> = std::result::Result<T, AcquireError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_exhausted_names_the_platform() {
        let err = AcquireError::PoolExhausted {
            platform: Platform::Xhs,
            detail: "0 active, 3 invalid".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("xhs"));
        assert!(msg.contains("0 active"));
    }

    #[test]
    fn retries_exhausted_carries_last_failure() {
        let err = AcquireError::RetriesExhausted {
            platform: Platform::Douyin,
            attempts: 3,
            last_failure: "probe rejected credential".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("after 3 attempts"));
        assert!(msg.contains("probe rejected credential"));
    }
}
