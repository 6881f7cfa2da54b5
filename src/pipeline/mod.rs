//! Run orchestration
//!
//! A [`Pipeline`] drives one run through
//! `Idle → Resolving → Fetching → Merging → Cleaning → {Succeeded | Failed}`:
//!
//! 1. **Resolving** - the resolver turns the folder into ordered sources.
//!    Failure ends the run before any workspace exists.
//! 2. **Fetching** - a fresh workspace is created and every source is fetched
//!    with bounded concurrency. The first failure aborts the run.
//! 3. **Merging** - only when every fetch succeeded, with the assets in
//!    resolved order.
//! 4. **Cleaning** - always entered once a workspace exists; removes the
//!    workspace unless fetched files are being kept.
//!
//! Cancellation is honoured in every stage before `Cleaning`.
//!
//! A pipeline is consumed by [`Pipeline::run`]; every transition is announced
//! as [`Event::StageChanged`] on the channel returned by
//! [`Pipeline::subscribe`].

mod fetching;
mod state;


use crate::assembler::Assembler;
use crate::cleanup::remove_workspace;
use crate::config::Config;
use crate::error::{CleanupWarning, Error, Result};
use crate::fetcher::Fetcher;
use crate::resolver::SourceResolver;
use crate::types::{Event, FolderReference, MergeOptions, RunId, RunOutcome, Stage};
use state::RunState;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Capacity of the event channel; slow subscribers lag rather than block a run
const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// One folder-to-video run
pub struct Pipeline {
    run: RunId,
    resolver: Arc<dyn SourceResolver>,
    fetcher: Arc<dyn Fetcher>,
    assembler: Assembler,
    config: Config,
    event_tx: broadcast::Sender<Event>,
    cancel_token: CancellationToken,
}

impl Pipeline {
    /// Assemble a pipeline from its components
    ///
    /// Fails when `config` does not validate.
    pub fn new(
        config: Config,
        resolver: Arc<dyn SourceResolver>,
        fetcher: Arc<dyn Fetcher>,
        assembler: Assembler,
    ) -> Result<Self> {
        config.validate()?;
        let (event_tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Self {
            run: RunId::random(),
            resolver,
            fetcher,
            assembler,
            config,
            event_tx,
            cancel_token: CancellationToken::new(),
        })
    }

    /// Identifier of the run this pipeline will perform
    pub fn run_id(&self) -> RunId {
        self.run
    }

    /// Directory the run fetches into
    pub fn workspace(&self) -> PathBuf {
        self.config
            .download
            .workspace_root
            .join(self.run.workspace_name())
    }

    /// Subscribe to run events
    ///
    /// Subscribe before calling [`Pipeline::run`]; events sent earlier are
    /// not replayed.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Token that cancels the run when triggered
    ///
    /// Cancelling stops new fetches and drops the ones in flight. A running
    /// merge is abandoned, which kills the encoder and removes its partial
    /// output. Either way the workspace is removed and the run fails with
    /// [`Error::Cancelled`].
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Run the pipeline for `folder`, writing the merged video per `options`
    pub async fn run(self, folder: FolderReference, options: MergeOptions) -> Result<RunOutcome> {
        options.validate()?;

        let mut state = RunState::new(self.run, self.event_tx.clone());
        tracing::info!(
            run = %self.run,
            folder = %folder,
            resolver = self.resolver.name(),
            "Starting run"
        );

        state.advance(Stage::Resolving);
        let sources = tokio::select! {
            biased;
            _ = self.cancel_token.cancelled() => {
                let err = Error::Cancelled { stage: Stage::Resolving };
                return Err(self.fail(&mut state, Stage::Resolving, err));
            }
            resolved = self.resolver.resolve(&folder) => match resolved {
                Ok(sources) => sources,
                Err(e) => return Err(self.fail(&mut state, Stage::Resolving, e.into())),
            },
        };
        tracing::info!(run = %self.run, count = sources.len(), "Resolved sources");
        state.emit(Event::Resolved {
            run: self.run,
            count: sources.len(),
        });

        state.advance(Stage::Fetching);
        let workspace = self.workspace();
        if let Err(e) = create_workspace(&workspace).await {
            // The path may belong to someone else; nothing to remove
            state.advance(Stage::Cleaning);
            return Err(self.fail(&mut state, Stage::Fetching, e));
        }
        tracing::debug!(run = %self.run, workspace = %workspace.display(), "Created workspace");

        let fetched = fetching::fetch_all(
            &state,
            self.run,
            self.fetcher.as_ref(),
            sources,
            &workspace,
            self.config.download.max_concurrent_fetches,
            &self.cancel_token,
        )
        .await;
        let assets = match fetched {
            Ok(assets) => assets,
            Err(e) => {
                // Fetch failures discard everything fetched so far
                self.clean(&mut state, &workspace, false).await;
                return Err(self.fail(&mut state, Stage::Fetching, e));
            }
        };

        if self.cancel_token.is_cancelled() {
            self.clean(&mut state, &workspace, false).await;
            let err = Error::Cancelled {
                stage: Stage::Fetching,
            };
            return Err(self.fail(&mut state, Stage::Fetching, err));
        }

        state.advance(Stage::Merging);
        let merged = tokio::select! {
            biased;
            _ = self.cancel_token.cancelled() => None,
            merged = self.assembler.merge(&assets, &options) => Some(merged),
        };
        let report = match merged {
            Some(Ok(report)) => report,
            Some(Err(e)) => {
                self.clean(&mut state, &workspace, options.keep_originals)
                    .await;
                return Err(self.fail(&mut state, Stage::Merging, e.into()));
            }
            None => {
                // The dropped merge kills the encoder; its output is unusable
                self.assembler.discard_partial_output(&options).await;
                self.clean(&mut state, &workspace, false).await;
                let err = Error::Cancelled {
                    stage: Stage::Merging,
                };
                return Err(self.fail(&mut state, Stage::Merging, err));
            }
        };
        state.emit(Event::MergeComplete {
            run: self.run,
            output: report.output.clone(),
        });

        let mut warnings = report.warnings;
        for warning in &warnings {
            self.warn(&state, warning);
        }
        warnings.extend(
            self.clean(&mut state, &workspace, options.keep_originals)
                .await,
        );

        let workspace_kept = options.keep_originals && dir_exists(&workspace).await;
        state.advance(Stage::Succeeded);
        state.emit(Event::Succeeded {
            run: self.run,
            output: report.output.clone(),
        });
        tracing::info!(
            run = %self.run,
            output = %report.output.display(),
            inputs = assets.len(),
            warnings = warnings.len(),
            "Run succeeded"
        );

        Ok(RunOutcome {
            run: self.run,
            output: report.output,
            assets,
            workspace: workspace_kept.then_some(workspace),
            warnings,
        })
    }

    /// Enter `Cleaning` and remove the workspace; returns the warnings
    async fn clean(
        &self,
        state: &mut RunState,
        workspace: &Path,
        keep_files: bool,
    ) -> Vec<CleanupWarning> {
        state.advance(Stage::Cleaning);
        let warnings = remove_workspace(workspace, keep_files).await;
        for warning in &warnings {
            self.warn(state, warning);
        }
        warnings
    }

    fn warn(&self, state: &RunState, warning: &CleanupWarning) {
        state.emit(Event::CleanupWarning {
            run: self.run,
            warning: warning.clone(),
        });
    }

    /// Move to `Failed`, announce it and hand the error back
    fn fail(&self, state: &mut RunState, failed_in: Stage, error: Error) -> Error {
        tracing::error!(
            run = %self.run,
            stage = %failed_in,
            error = %error,
            "Run failed"
        );
        state.advance(Stage::Failed);
        state.emit(Event::Failed {
            run: self.run,
            stage: failed_in,
            error: error.to_string(),
        });
        error
    }
}

/// Create the run workspace; an existing directory is never reused
async fn create_workspace(workspace: &Path) -> Result<()> {
    if let Some(root) = workspace.parent()
        && !root.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(root).await.map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!(
                    "Failed to create workspace root '{}': {}",
                    root.display(),
                    e
                ),
            ))
        })?;
    }
    tokio::fs::create_dir(workspace).await.map_err(|e| {
        Error::Io(std::io::Error::new(
            e.kind(),
            format!("Failed to create workspace '{}': {}", workspace.display(), e),
        ))
    })
}

async fn dir_exists(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
}
