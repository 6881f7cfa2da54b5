//! # panopto-dl
//!
//! Turn a Panopto folder into one merged video: resolve the folder's
//! recordings, fetch them concurrently, concatenate them in listing order
//! with ffmpeg and clean up the intermediate files.
//!
//! ## Components
//!
//! - [`resolver`] - folder → ordered source URLs
//! - [`fetcher`] - source URL → local file
//! - [`assembler`] - ordered local files → merged output
//! - [`pipeline`] - the state machine tying them together
//!
//! ## Quick Start
//!
//! ```no_run
//! use panopto_dl::assembler::{Assembler, CliEncoder};
//! use panopto_dl::fetcher::HttpFetcher;
//! use panopto_dl::resolver::PanoptoResolver;
//! use panopto_dl::{Config, MergeOptions, Pipeline};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let client = panopto_dl::session::build_client(&config).await?;
//!
//!     let pipeline = Pipeline::new(
//!         config.clone(),
//!         Arc::new(PanoptoResolver::new(client.clone(), config.resolver.clone())),
//!         Arc::new(HttpFetcher::new(client, &config)),
//!         Assembler::new(Arc::new(CliEncoder::from_config(&config.tools)?)),
//!     )?;
//!
//!     // Subscribe to events
//!     let mut events = pipeline.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     tokio::spawn(panopto_dl::cancel_on_signal(pipeline.cancel_token()));
//!
//!     let folder = "https://uw.hosted.panopto.com/Panopto/Pages/Sessions/List.aspx#folderID=%22d1a0c6f4-8a2b-4c3e-9f10-1234567890ab%22";
//!     let outcome = pipeline.run(folder.into(), MergeOptions::new("lectures.mp4")).await?;
//!     println!("wrote {}", outcome.output.display());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Merging fetched videos with an external encoder
pub mod assembler;
mod cleanup;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Downloading sources to disk
pub mod fetcher;
/// Run orchestration
pub mod pipeline;
/// Folder → source URL resolution
pub mod resolver;
/// Retry logic with exponential backoff
pub mod retry;
/// Authenticated HTTP session
pub mod session;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use assembler::{Assembler, CliEncoder, Encoder, EncoderOutput, MergeReport};
pub use config::Config;
pub use error::{CleanupWarning, Error, FetchError, MergeError, ResolutionError, Result};
pub use fetcher::{Fetcher, HttpFetcher};
pub use pipeline::Pipeline;
pub use resolver::{LinkResolver, PanoptoResolver, SourceResolver, StaticResolver};
pub use types::{
    Codec, Event, FolderReference, LocalAsset, MergeOptions, RunId, RunOutcome, SourceUrl, Stage,
};

use tokio_util::sync::CancellationToken;

/// Cancel `token` when the process receives a termination signal
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// Returns early, without cancelling, when the token is cancelled elsewhere.
///
/// # Example
///
/// ```no_run
/// use tokio_util::sync::CancellationToken;
///
/// # #[tokio::main]
/// # async fn main() {
/// let token = CancellationToken::new();
/// tokio::spawn(panopto_dl::cancel_on_signal(token.clone()));
/// token.cancelled().await;
/// # }
/// ```
pub async fn cancel_on_signal(token: CancellationToken) {
    tokio::select! {
        _ = token.cancelled() => {}
        _ = wait_for_signal() => {
            tracing::warn!("Cancelling run, cleaning up");
            token.cancel();
        }
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
            // Never resolve: without a signal source only the token can end the wait
            std::future::pending::<()>().await;
        }
    }
}
