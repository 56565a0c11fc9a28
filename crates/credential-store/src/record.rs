//! Credential record model

use std::time::{SystemTime, UNIX_EPOCH};

use common::{CookiePayload, Platform};
use uuid::Uuid;

/// Lifecycle status of a credential.
///
/// Transitions are one-directional within this subsystem: `Active` →
/// `Invalid` on a failed probe, never back. Reactivating a credential is an
/// external operator action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialStatus {
    Active,
    Invalid,
}

impl CredentialStatus {
    /// Database column form.
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialStatus::Active => "ACTIVE",
            CredentialStatus::Invalid => "INVALID",
        }
    }

    /// Parse the database column form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ACTIVE" => Some(CredentialStatus::Active),
            "INVALID" => Some(CredentialStatus::Invalid),
            _ => None,
        }
    }
}

/// One platform login-session artifact plus its lifecycle state.
///
/// The derived Debug is safe to log: `CookiePayload` redacts itself.
#[derive(Debug, Clone)]
pub struct CredentialRecord {
    pub id: Uuid,
    pub platform: Platform,
    pub cookie_payload: CookiePayload,
    pub status: CredentialStatus,
    /// Diagnostic from the probe failure that invalidated this record.
    pub failure_reason: Option<String>,
    /// Unix ms of the last successful probe, if any.
    pub last_validated_at: Option<u64>,
    /// Monotonic selection counter driving least-recently-selected
    /// rotation. A logical clock, not wall time, so rotation stays stable
    /// within a single millisecond.
    pub last_selected_seq: u64,
    /// Unix ms when the record was imported.
    pub created_at: u64,
}

impl CredentialRecord {
    /// A fresh active record, as operator import creates it.
    pub fn new(platform: Platform, cookie_payload: CookiePayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            platform,
            cookie_payload,
            status: CredentialStatus::Active,
            failure_reason: None,
            last_validated_at: None,
            last_selected_seq: 0,
            created_at: now_ms(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == CredentialStatus::Active
    }
}

/// Current unix time in milliseconds.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
