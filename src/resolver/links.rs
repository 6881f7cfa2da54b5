//! Resolver that scrapes video links out of a folder page

use super::non_empty;
use super::traits::SourceResolver;
use crate::config::ResolverConfig;
use crate::error::ResolutionError;
use crate::types::{FolderReference, SourceUrl};
use async_trait::async_trait;
use regex::Regex;
use std::sync::LazyLock;
use url::Url;

#[allow(clippy::expect_used)]
static ANCHOR_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<a\s([^>]*)>").expect("valid anchor regex"));

#[allow(clippy::expect_used)]
static ATTRIBUTE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)([a-z_:][-a-z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)
        .expect("valid attribute regex")
});

/// Resolver for folder pages that render each video as a styled link
///
/// Every `<a>` element whose `class` list contains the configured link class
/// contributes its `href`, in document order. Relative links are resolved
/// against the page URL.
pub struct LinkResolver {
    client: reqwest::Client,
    config: ResolverConfig,
}

impl LinkResolver {
    /// Create a resolver using an (authenticated) HTTP client
    pub fn new(client: reqwest::Client, config: ResolverConfig) -> Self {
        Self { client, config }
    }

    async fn load_page(&self, folder: &FolderReference, page: &Url) -> Result<String, ResolutionError> {
        let response = self
            .client
            .get(page.clone())
            .timeout(self.config.request_timeout)
            .send()
            .await
            .map_err(|e| ResolutionError::from_request(folder.as_str(), &e))?;

        if !response.status().is_success() {
            return Err(ResolutionError::LoadFailed {
                folder: folder.to_string(),
                reason: format!("HTTP status {}", response.status()),
            });
        }

        response
            .text()
            .await
            .map_err(|e| ResolutionError::from_request(folder.as_str(), &e))
    }
}

/// Extract `href`s of anchors carrying `class_name`, in document order
fn extract_links(html: &str, class_name: &str, page: &Url) -> Vec<String> {
    let mut links = Vec::new();

    for anchor in ANCHOR_REGEX.captures_iter(html) {
        let Some(attributes) = anchor.get(1) else {
            continue;
        };

        let mut class = None;
        let mut href = None;
        for attribute in ATTRIBUTE_REGEX.captures_iter(attributes.as_str()) {
            let value = attribute
                .get(2)
                .or_else(|| attribute.get(3))
                .or_else(|| attribute.get(4))
                .map(|m| m.as_str());
            match attribute.get(1).map(|m| m.as_str().to_ascii_lowercase()).as_deref() {
                Some("class") => class = value,
                Some("href") => href = value,
                _ => {}
            }
        }

        let has_class = class.is_some_and(|c| c.split_whitespace().any(|c| c == class_name));
        let Some(href) = href.filter(|_| has_class) else {
            continue;
        };

        let href = decode_entities(href.trim());
        if href.is_empty() {
            continue;
        }
        match page.join(&href) {
            Ok(url) => links.push(url.to_string()),
            Err(e) => tracing::warn!(href = %href, error = %e, "Skipping unparseable video link"),
        }
    }

    links
}

/// Undo the HTML entity escaping that is legal inside attribute values
fn decode_entities(value: &str) -> String {
    value
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

#[async_trait]
impl SourceResolver for LinkResolver {
    async fn resolve(
        &self,
        folder: &FolderReference,
    ) -> Result<Vec<SourceUrl>, ResolutionError> {
        let page = Url::parse(folder.as_str()).map_err(|e| ResolutionError::InvalidFolder {
            folder: folder.to_string(),
            reason: e.to_string(),
        })?;

        let html = self.load_page(folder, &page).await?;
        let links = extract_links(&html, &self.config.link_class, &page);
        tracing::info!(
            folder = %folder,
            links = links.len(),
            class = %self.config.link_class,
            "Scraped folder page"
        );

        let sources = links
            .into_iter()
            .enumerate()
            .map(|(position, url)| SourceUrl::new(position, url))
            .collect();
        non_empty(folder, sources)
    }

    fn name(&self) -> &'static str {
        "links"
    }
}
