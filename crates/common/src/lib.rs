//! Shared vocabulary for the credential pool workspace

pub mod cookie;
pub mod error;
pub mod platform;

pub use cookie::CookiePayload;
pub use error::{Error, Result};
pub use platform::{Platform, UnknownPlatform};
