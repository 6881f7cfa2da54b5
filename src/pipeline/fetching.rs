//! Bounded concurrent fetch phase

use super::state::RunState;
use crate::error::{Error, Result};
use crate::fetcher::Fetcher;
use crate::types::{Event, LocalAsset, RunId, SourceUrl, Stage};
use futures::stream::{self, StreamExt};
use std::path::Path;
use tokio_util::sync::CancellationToken;

/// Fetch every source into `workspace` with at most `concurrency` in flight
///
/// Returns the assets sorted back into source order. The first failure, or a
/// cancellation, drops every fetch still in flight and starts no new ones;
/// files they leave behind are swept together with the workspace.
pub(super) async fn fetch_all(
    state: &RunState,
    run: RunId,
    fetcher: &dyn Fetcher,
    sources: Vec<SourceUrl>,
    workspace: &Path,
    concurrency: usize,
    cancel_token: &CancellationToken,
) -> Result<Vec<LocalAsset>> {
    let total = sources.len();
    let mut fetches = stream::iter(sources)
        .map(|source| async move {
            state.emit(Event::FetchStarted {
                run,
                position: source.position,
                url: source.url.clone(),
            });
            fetcher.fetch(&source, workspace).await
        })
        .buffer_unordered(concurrency.max(1));

    let mut assets = Vec::with_capacity(total);
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel_token.cancelled() => {
                tracing::info!(
                    run = %run,
                    completed = assets.len(),
                    total,
                    "Fetching cancelled"
                );
                return Err(Error::Cancelled { stage: Stage::Fetching });
            }
            next = fetches.next() => next,
        };

        match next {
            None => break,
            Some(Ok(asset)) => {
                tracing::info!(
                    run = %run,
                    position = asset.position(),
                    completed = assets.len() + 1,
                    total,
                    "Fetched source"
                );
                state.emit(Event::FetchComplete {
                    run,
                    position: asset.position(),
                    path: asset.local_path.clone(),
                    size_bytes: asset.size_bytes,
                    completed: assets.len() + 1,
                    total,
                });
                assets.push(asset);
            }
            Some(Err(e)) => {
                tracing::error!(
                    run = %run,
                    position = e.position,
                    url = %e.url,
                    error = %e,
                    "Fetch failed, aborting run"
                );
                return Err(e.into());
            }
        }
    }

    assets.sort_by_key(LocalAsset::position);
    Ok(assets)
}
