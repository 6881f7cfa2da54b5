//! Authenticated HTTP session
//!
//! Folder listings and recordings sit behind a browser login. Capturing that
//! login is someone else's job; this module only replays the result: a cookie
//! file exported from the browser (a JSON array of objects with `name`,
//! `value` and `domain`) is loaded into the cookie jar of a shared
//! [`reqwest::Client`]. Each cookie is only sent to the host it was
//! exported for, never to CDNs or scraped links on other hosts.

use crate::config::Config;
use crate::error::{Error, Result};
use reqwest::cookie::Jar;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use url::Url;

/// One cookie as exported by the browser
///
/// Extra fields (`expires`, `httpOnly`, ...) are accepted and ignored.
#[derive(Clone, Debug, Deserialize)]
pub struct SessionCookie {
    /// Cookie name
    pub name: String,
    /// Cookie value
    pub value: String,
    /// Domain the cookie was set for; a leading `.` also covers subdomains
    #[serde(default)]
    pub domain: Option<String>,
    /// Path the cookie was set for
    #[serde(default)]
    pub path: Option<String>,
}

impl SessionCookie {
    /// The `Set-Cookie` line and the URL it is scoped to
    ///
    /// `None` when the cookie cannot be sent safely: no domain to scope it
    /// to, or characters that cannot appear in a header.
    fn scoped(&self) -> Option<(String, Url)> {
        if self.name.is_empty() || !is_header_safe(&self.name) || !is_header_safe(&self.value) {
            tracing::warn!(cookie = %self.name, "Skipping cookie with invalid characters");
            return None;
        }
        let Some(domain) = self.domain.as_deref().filter(|d| !d.is_empty()) else {
            tracing::warn!(cookie = %self.name, "Skipping cookie without a domain");
            return None;
        };
        let host = domain.trim_start_matches('.');
        let path = self.path.as_deref().unwrap_or("/");
        let url = match Url::parse(&format!("https://{host}{path}")) {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!(cookie = %self.name, domain, error = %e, "Skipping cookie with unusable domain");
                return None;
            }
        };

        let mut line = format!("{}={}; Path={path}", self.name, self.value);
        // Without a Domain attribute the cookie stays host-only
        if domain.starts_with('.') {
            line.push_str(&format!("; Domain={host}"));
        }
        Some((line, url))
    }
}

/// The cookies of one browser session
#[derive(Clone, Debug, Default)]
pub struct SessionCookies {
    cookies: Vec<SessionCookie>,
}

impl SessionCookies {
    /// Load cookies from a browser-exported JSON file
    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read(path).await.map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to read cookie file '{}': {}", path.display(), e),
            ))
        })?;
        Self::parse(&content)
    }

    /// Parse cookies from JSON bytes
    pub fn parse(content: &[u8]) -> Result<Self> {
        let cookies: Vec<SessionCookie> = serde_json::from_slice(content)?;
        Ok(Self { cookies })
    }

    /// Number of cookies loaded
    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    /// Whether no cookies were loaded
    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    /// Build a cookie jar that scopes every usable cookie to its domain and path
    ///
    /// Returns the jar and the number of cookies it holds.
    pub fn jar(&self) -> (Jar, usize) {
        let jar = Jar::default();
        let mut added = 0;
        for (line, url) in self.cookies.iter().filter_map(SessionCookie::scoped) {
            jar.add_cookie_str(&line, &url);
            added += 1;
        }
        (jar, added)
    }
}

fn is_header_safe(s: &str) -> bool {
    s.bytes()
        .all(|b| b.is_ascii_graphic() && b != b';' && b != b',')
}

/// Build the HTTP client shared by resolvers and fetchers
///
/// Applies the configured user agent, connect timeout and, when
/// `session.cookies_file` is set, the session cookies. Per-request timeouts
/// are set by the callers since listings and video downloads need very
/// different limits.
pub async fn build_client(config: &Config) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .user_agent(config.session.user_agent.clone())
        .connect_timeout(config.download.connect_timeout);

    if let Some(path) = &config.session.cookies_file {
        let cookies = SessionCookies::load(path).await?;
        let (jar, added) = cookies.jar();
        tracing::info!(
            cookies = added,
            skipped = cookies.len() - added,
            path = %path.display(),
            "Loaded session cookies"
        );
        builder = builder.cookie_provider(Arc::new(jar));
    } else {
        tracing::debug!("No cookie file configured, requests are unauthenticated");
    }

    builder.build().map_err(Error::Network)
}
