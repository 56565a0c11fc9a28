//! Durable credential rows and the store contract
//!
//! A credential record is one platform login session (cookie payload) plus
//! its lifecycle status. The store is the single source of truth for that
//! state; the pool reads and transitions records exclusively through the
//! `CredentialStore` trait.
//!
//! Record lifecycle:
//! 1. Operator tooling inserts the record → status `Active`
//! 2. Selection atomically claims the least-recently-selected active row
//! 3. A failed probe transitions it `Active` → `Invalid` (one-directional;
//!    reactivation is an operator action outside this subsystem)
//! 4. A successful probe touches `last_validated_at`
//!
//! Two adapters ship: `MemoryCredentialStore` for single-instance
//! deployments and tests, `SqliteCredentialStore` for a shared database
//! where the claim must be atomic across processes.

pub mod error;
pub mod memory;
pub mod record;
pub mod sqlite;
pub mod store;

pub use error::{Error, Result};
pub use memory::MemoryCredentialStore;
pub use record::{CredentialRecord, CredentialStatus, now_ms};
pub use sqlite::SqliteCredentialStore;
pub use store::CredentialStore;
