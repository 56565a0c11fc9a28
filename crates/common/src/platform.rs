//! Scraper platform enumeration
//!
//! The platform set is closed: every credential row, client factory, and
//! pool lock table is keyed by one of these variants. The string form is
//! the lowercase platform slug used in config files and the database.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A social-media platform the scraper fleet authenticates against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Xhs,
    Douyin,
    Kuaishou,
    Bilibili,
    Weibo,
    Tieba,
    Zhihu,
}

impl Platform {
    /// Every known platform, in a stable order (used for lock tables and
    /// health reporting).
    pub const ALL: [Platform; 7] = [
        Platform::Xhs,
        Platform::Douyin,
        Platform::Kuaishou,
        Platform::Bilibili,
        Platform::Weibo,
        Platform::Tieba,
        Platform::Zhihu,
    ];

    /// Lowercase slug, matching the serde form and the database column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Xhs => "xhs",
            Platform::Douyin => "douyin",
            Platform::Kuaishou => "kuaishou",
            Platform::Bilibili => "bilibili",
            Platform::Weibo => "weibo",
            Platform::Tieba => "tieba",
            Platform::Zhihu => "zhihu",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for a platform slug outside the known set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown platform: {0}")]
pub struct UnknownPlatform(pub String);

impl FromStr for Platform {
    type Err = UnknownPlatform;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "xhs" => Ok(Platform::Xhs),
            "douyin" => Ok(Platform::Douyin),
            "kuaishou" => Ok(Platform::Kuaishou),
            "bilibili" => Ok(Platform::Bilibili),
            "weibo" => Ok(Platform::Weibo),
            "tieba" => Ok(Platform::Tieba),
            "zhihu" => Ok(Platform::Zhihu),
            other => Err(UnknownPlatform(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_round_trips_through_from_str() {
        for platform in Platform::ALL {
            let parsed: Platform = platform.as_str().parse().unwrap();
            assert_eq!(parsed, platform);
        }
    }

    #[test]
    fn unknown_slug_is_rejected() {
        let err = "myspace".parse::<Platform>().unwrap_err();
        assert_eq!(err, UnknownPlatform("myspace".into()));
        assert!(err.to_string().contains("myspace"));
    }

    #[test]
    fn serde_uses_lowercase_slug() {
        let json = serde_json::to_string(&Platform::Xhs).unwrap();
        assert_eq!(json, "\"xhs\"");
        let parsed: Platform = serde_json::from_str("\"bilibili\"").unwrap();
        assert_eq!(parsed, Platform::Bilibili);
    }

    #[test]
    fn all_lists_each_platform_once() {
        let mut slugs: Vec<&str> = Platform::ALL.iter().map(|p| p.as_str()).collect();
        slugs.sort_unstable();
        slugs.dedup();
        assert_eq!(slugs.len(), Platform::ALL.len());
    }

    #[test]
    fn display_matches_as_str() {
        assert_eq!(Platform::Kuaishou.to_string(), "kuaishou");
    }
}
