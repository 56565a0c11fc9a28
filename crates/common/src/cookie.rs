//! Cookie payload wrapper
//!
//! A cookie payload is a login-session artifact and must never appear in
//! logs, error messages, or debug output. Debug/Display render as
//! `[REDACTED]`; the inner value is zeroized on drop. `preview()` gives a
//! short non-sensitive prefix for correlating log lines with a record.

use std::fmt;

use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

/// An opaque cookie blob for one platform session.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CookiePayload(String);

impl CookiePayload {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Expose the raw cookie string (use sparingly — only at the point
    /// where it is handed to a client factory or persisted).
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Short non-sensitive prefix for log correlation, e.g. `"a1b2c3…"`.
    pub fn preview(&self) -> String {
        let prefix: String = self.0.chars().take(6).collect();
        format!("{prefix}\u{2026}")
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for CookiePayload {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for CookiePayload {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Debug for CookiePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl fmt::Display for CookiePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl Drop for CookiePayload {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_and_display_redact() {
        let cookie = CookiePayload::new("web_session=abc123; a1=xyz");
        assert_eq!(format!("{cookie:?}"), "[REDACTED]");
        assert_eq!(cookie.to_string(), "[REDACTED]");
    }

    #[test]
    fn expose_returns_raw_value() {
        let cookie = CookiePayload::new("web_session=abc123");
        assert_eq!(cookie.expose(), "web_session=abc123");
    }

    #[test]
    fn preview_is_a_short_prefix() {
        let cookie = CookiePayload::new("web_session=abc123");
        let preview = cookie.preview();
        assert!(preview.starts_with("web_se"));
        assert!(!preview.contains("abc123"));
    }

    #[test]
    fn preview_of_short_payload_does_not_panic() {
        let cookie = CookiePayload::new("ab");
        assert_eq!(cookie.preview(), "ab\u{2026}");
    }

    #[test]
    fn serde_is_transparent() {
        let cookie = CookiePayload::new("k=v");
        let json = serde_json::to_string(&cookie).unwrap();
        assert_eq!(json, "\"k=v\"");
        let back: CookiePayload = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cookie);
    }
}
