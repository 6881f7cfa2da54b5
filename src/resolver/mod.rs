//! Source resolution
//!
//! A resolver turns a [`FolderReference`](crate::types::FolderReference) into
//! the ordered list of video URLs that make up the folder. The order it
//! returns is the order the videos are merged in.
//!
//! ## Implementations
//!
//! - [`PanoptoResolver`]: asks the Panopto session listing service for the
//!   folder's sessions and looks up each session's MP4 stream
//! - [`LinkResolver`]: scrapes video links out of a folder page
//! - [`StaticResolver`]: returns a fixed list supplied by the caller
//!
//! ## Usage
//!
//! ```no_run
//! use panopto_dl::config::Config;
//! use panopto_dl::resolver::{PanoptoResolver, SourceResolver};
//! use panopto_dl::types::FolderReference;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let client = panopto_dl::session::build_client(&config).await?;
//!     let resolver = PanoptoResolver::new(client, config.resolver.clone());
//!
//!     let folder = FolderReference::new(
//!         "https://uw.hosted.panopto.com/Panopto/Pages/Sessions/List.aspx#folderID=%22d1a0c6f4-8a2b-4c3e-9f10-1234567890ab%22",
//!     );
//!     for source in resolver.resolve(&folder).await? {
//!         println!("{}: {}", source.position, source.url);
//!     }
//!     Ok(())
//! }
//! ```

mod fixed;
mod links;
mod panopto;
mod traits;

pub use fixed::StaticResolver;
pub use links::LinkResolver;
pub use panopto::{PanoptoResolver, extract_folder_id};
pub use traits::SourceResolver;

use crate::error::ResolutionError;
use crate::types::{FolderReference, SourceUrl};

/// Reject an empty listing; a merge of zero inputs is meaningless
pub(crate) fn non_empty(
    folder: &FolderReference,
    sources: Vec<SourceUrl>,
) -> Result<Vec<SourceUrl>, ResolutionError> {
    if sources.is_empty() {
        return Err(ResolutionError::Empty {
            folder: folder.to_string(),
        });
    }
    Ok(sources)
}
