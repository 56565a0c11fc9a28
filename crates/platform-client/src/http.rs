//! Reqwest-backed reference factory
//!
//! Builds clients that probe a per-platform session endpoint with the
//! cookie payload attached and classify the HTTP status: 2xx means the
//! session authenticates, 401/403 or a redirect (login bounce) means it
//! does not, anything else is a probe error. Body-aware login checks belong
//! to the platform wire-protocol implementations, which supply their own
//! `ClientFactory` — this one exists so the pool is usable end-to-end
//! without them.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use reqwest::header::{COOKIE, HeaderValue};
use tracing::debug;

use common::{CookiePayload, Platform};

use crate::{BuildError, BuildResult, ClientFactory, PlatformClient, ProbeError, ProbeResult};

/// Session endpoint probed for each platform. A request with a live cookie
/// returns 2xx; a dead cookie gets 401/403 or a bounce to the login page.
fn default_probe_url(platform: Platform) -> &'static str {
    match platform {
        Platform::Xhs => "https://edith.xiaohongshu.com/api/sns/web/v2/user/me",
        Platform::Douyin => "https://www.douyin.com/aweme/v1/web/query/user/",
        Platform::Kuaishou => "https://www.kuaishou.com/profile",
        Platform::Bilibili => "https://api.bilibili.com/x/web-interface/nav",
        Platform::Weibo => "https://m.weibo.cn/api/config",
        Platform::Tieba => "https://tieba.baidu.com/dc/common/tbs",
        Platform::Zhihu => "https://www.zhihu.com/api/v4/me",
    }
}

/// Reference `ClientFactory` over a shared reqwest client.
///
/// Redirects are not followed: a 3xx from a session endpoint is a login
/// bounce and must be classified, not chased.
pub struct CookieHttpFactory {
    http: reqwest::Client,
    probe_url_override: Option<String>,
}

impl CookieHttpFactory {
    pub fn new() -> BuildResult<Self> {
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| BuildError::Construction(format!("http client: {e}")))?;
        Ok(Self {
            http,
            probe_url_override: None,
        })
    }

    /// Probe every platform against one fixed URL instead of the
    /// per-platform defaults. Used by tests and staging environments.
    pub fn with_probe_url(mut self, url: impl Into<String>) -> Self {
        self.probe_url_override = Some(url.into());
        self
    }

    fn probe_url(&self, platform: Platform) -> String {
        match &self.probe_url_override {
            Some(url) => url.clone(),
            None => default_probe_url(platform).to_string(),
        }
    }
}

impl ClientFactory for CookieHttpFactory {
    fn id(&self) -> &str {
        "cookie-http"
    }

    fn build<'a>(
        &'a self,
        platform: Platform,
        cookies: &'a CookiePayload,
    ) -> Pin<Box<dyn Future<Output = BuildResult<Arc<dyn PlatformClient>>> + Send + 'a>> {
        Box::pin(async move {
            if cookies.expose().trim().is_empty() {
                return Err(BuildError::MalformedCookies("empty cookie payload".into()));
            }
            // Header values reject control characters; a payload that can't
            // be a Cookie header can't authenticate anything.
            let cookie_header = HeaderValue::from_str(cookies.expose())
                .map_err(|_| BuildError::MalformedCookies("not a valid Cookie header".into()))?;

            let client = HttpSessionClient {
                platform,
                http: self.http.clone(),
                probe_url: self.probe_url(platform),
                cookie_header,
            };
            Ok(Arc::new(client) as Arc<dyn PlatformClient>)
        })
    }
}

/// One built session: a platform, a probe URL, and the Cookie header.
#[derive(Debug)]
struct HttpSessionClient {
    platform: Platform,
    http: reqwest::Client,
    probe_url: String,
    cookie_header: HeaderValue,
}

impl PlatformClient for HttpSessionClient {
    fn platform(&self) -> Platform {
        self.platform
    }

    fn probe(&self) -> Pin<Box<dyn Future<Output = ProbeResult> + Send + '_>> {
        Box::pin(async move {
            let response = self
                .http
                .get(&self.probe_url)
                .header(COOKIE, self.cookie_header.clone())
                .send()
                .await
                .map_err(|e| ProbeError::Transport(e.to_string()))?;

            let status = response.status();
            debug!(platform = %self.platform, status = status.as_u16(), "probe completed");

            if status.is_success() {
                Ok(true)
            } else if status == reqwest::StatusCode::UNAUTHORIZED
                || status == reqwest::StatusCode::FORBIDDEN
                || status.is_redirection()
            {
                Ok(false)
            } else {
                Err(ProbeError::Status(status.as_u16()))
            }
        })
    }
}
