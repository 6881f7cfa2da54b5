//! Resolver over a caller-supplied URL list

use super::non_empty;
use super::traits::SourceResolver;
use crate::error::{Error, ResolutionError, Result};
use crate::types::{FolderReference, SourceUrl};
use async_trait::async_trait;
use std::path::Path;

/// Resolver that returns the same URLs for every folder
///
/// Useful when the video URLs are already known, e.g. from a previous run
/// or a hand-written list, and for driving the pipeline in tests.
#[derive(Clone, Debug, Default)]
pub struct StaticResolver {
    urls: Vec<String>,
}

impl StaticResolver {
    /// Resolve to `urls`, in the given order
    pub fn new<I, S>(urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            urls: urls.into_iter().map(Into::into).collect(),
        }
    }

    /// Parse a URL list: one URL per line, blank lines and `#` comments ignored
    pub fn from_lines(content: &str) -> Self {
        Self::new(
            content
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#')),
        )
    }

    /// Read a URL list file (see [`StaticResolver::from_lines`])
    pub async fn from_file(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to read URL list '{}': {}", path.display(), e),
            ))
        })?;
        let resolver = Self::from_lines(&content);
        tracing::debug!(path = %path.display(), urls = resolver.len(), "Loaded URL list");
        Ok(resolver)
    }

    /// Number of URLs
    pub fn len(&self) -> usize {
        self.urls.len()
    }

    /// Whether the list is empty
    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }
}

#[async_trait]
impl SourceResolver for StaticResolver {
    async fn resolve(
        &self,
        folder: &FolderReference,
    ) -> std::result::Result<Vec<SourceUrl>, ResolutionError> {
        let sources = self
            .urls
            .iter()
            .enumerate()
            .map(|(position, url)| SourceUrl::new(position, url.clone()))
            .collect();
        non_empty(folder, sources)
    }

    fn name(&self) -> &'static str {
        "static"
    }
}
