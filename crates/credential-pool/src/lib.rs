//! Credential pool for scraper workers
//!
//! Hands concurrent workers a validated platform client without manual
//! account bookkeeping. The pool selects among ACTIVE credentials
//! (least-recently-selected, serialized per platform), the acquisition
//! coordinator drives one logical operation through selection → build →
//! probe, and a failed probe invalidates the credential and retries with
//! another, bounded by `max_tries`.
//!
//! Credential lifecycle as seen from here:
//! 1. Operator tooling imports a record → ACTIVE
//! 2. A coordinator claims it, builds a client, probes the session
//! 3. Probe success → client handed to the caller, `last_validated_at` touched
//! 4. Probe failure → ACTIVE → INVALID (one-directional; no reactivation
//!    here), next credential claimed
//! 5. No ACTIVE credential left → pool exhaustion, surfaced distinctly from
//!    retry exhaustion
//!
//! The background sweep re-validates ACTIVE credentials on an interval so
//! dead sessions are retired between acquisitions.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod pool;
pub mod sweep;

pub use config::PoolOptions;
pub use coordinator::{Acquired, AcquireRequest, AcquisitionCoordinator};
pub use error::{AcquireError, Result};
pub use pool::CredentialPool;
pub use sweep::spawn_sweep_task;
