//! Trait for source resolvers

use crate::error::ResolutionError;
use crate::types::{FolderReference, SourceUrl};
use async_trait::async_trait;

/// Trait for turning a folder into an ordered list of fetchable URLs
///
/// Implementations perform network reads only and never touch the disk.
#[async_trait]
pub trait SourceResolver: Send + Sync {
    /// Resolve `folder` into its videos, in presentation order
    ///
    /// Positions in the returned list are dense and start at zero; the list
    /// order is the merge order and must be deterministic for a given remote
    /// state.
    ///
    /// # Errors
    ///
    /// Returns a [`ResolutionError`] if the listing cannot be loaded, times
    /// out, cannot be understood, or contains no videos. An empty result is
    /// always an error.
    async fn resolve(&self, folder: &FolderReference)
    -> Result<Vec<SourceUrl>, ResolutionError>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}
