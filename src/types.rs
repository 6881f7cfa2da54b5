//! Core types for panopto-dl

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{CleanupWarning, MergeError};

/// Opaque reference to a remote folder (usually its URL)
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FolderReference(String);

impl FolderReference {
    /// Wrap a folder URL or identifier
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    /// The reference as supplied
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for FolderReference {
    fn from(reference: &str) -> Self {
        Self::new(reference)
    }
}

impl From<String> for FolderReference {
    fn from(reference: String) -> Self {
        Self(reference)
    }
}

impl std::fmt::Display for FolderReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A resolved, fetchable video URL and its place in the merge order
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceUrl {
    /// Zero-based position; determines the merge order
    pub position: usize,
    /// Direct URL of the video stream
    pub url: String,
    /// Session name from the listing, if known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Recording start time from the listing, if known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recorded_at: Option<DateTime<Utc>>,
}

impl SourceUrl {
    /// Create a source with no listing metadata
    pub fn new(position: usize, url: impl Into<String>) -> Self {
        Self {
            position,
            url: url.into(),
            title: None,
            recorded_at: None,
        }
    }

    /// Attach a session title
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

/// A fully downloaded source on local disk
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalAsset {
    /// The source this file was downloaded from
    pub source: SourceUrl,
    /// Where the file was written
    pub local_path: PathBuf,
    /// Number of bytes written, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
}

impl LocalAsset {
    /// Position of the underlying source in the merge order
    pub fn position(&self) -> usize {
        self.source.position
    }
}

/// Video codec used for the merged output
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Codec {
    /// H.264, plays nearly everywhere
    #[default]
    Compatible,
    /// H.265, smaller files at the same quality
    HighCompression,
}

impl Codec {
    /// Encoder name passed to `-vcodec`
    pub fn encoder_name(&self) -> &'static str {
        match self {
            Codec::Compatible => "libx264",
            Codec::HighCompression => "libx265",
        }
    }
}

/// Default constant rate factor
pub const DEFAULT_CRF: u8 = 23;

/// Highest constant rate factor the encoders accept
pub const MAX_CRF: u8 = 51;

/// Options for one merge, fixed for the whole run
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeOptions {
    /// Path of the merged output file
    pub output_path: PathBuf,
    /// Output video codec
    #[serde(default)]
    pub codec: Codec,
    /// Constant rate factor (0 = lossless, 51 = worst)
    #[serde(default = "default_crf")]
    pub crf: u8,
    /// Keep the downloaded files after a successful merge
    #[serde(default)]
    pub keep_originals: bool,
    /// Concatenate audio streams alongside video
    #[serde(default = "default_true")]
    pub include_audio: bool,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            output_path: PathBuf::from("output.mp4"),
            codec: Codec::default(),
            crf: DEFAULT_CRF,
            keep_originals: false,
            include_audio: true,
        }
    }
}

impl MergeOptions {
    /// Options writing to `output_path` with every other setting at its default
    pub fn new(output_path: impl Into<PathBuf>) -> Self {
        Self {
            output_path: output_path.into(),
            ..Default::default()
        }
    }

    /// Reject options the encoder cannot honour
    pub fn validate(&self) -> std::result::Result<(), MergeError> {
        if self.crf > MAX_CRF {
            return Err(MergeError::InvalidOptions {
                reason: format!("crf must be between 0 and {MAX_CRF}, got {}", self.crf),
            });
        }
        if self.output_path.as_os_str().is_empty() {
            return Err(MergeError::InvalidOptions {
                reason: "output path is empty".to_string(),
            });
        }
        Ok(())
    }
}

fn default_crf() -> u8 {
    DEFAULT_CRF
}

fn default_true() -> bool {
    true
}

/// Pipeline stage
///
/// A run moves `Idle → Resolving → Fetching → Merging → Cleaning` and ends in
/// `Succeeded` or `Failed`. Failures before `Fetching` skip straight to the
/// terminal state because no workspace exists yet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Created, nothing started
    Idle,
    /// Listing the folder
    Resolving,
    /// Downloading sources into the workspace
    Fetching,
    /// Running the encoder
    Merging,
    /// Removing intermediate files
    Cleaning,
    /// Output written
    Succeeded,
    /// Ended without output
    Failed,
}

impl Stage {
    /// Whether the run has ended
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Succeeded | Stage::Failed)
    }

    /// Whether moving from `self` to `next` is a legal transition
    pub fn can_transition_to(&self, next: Stage) -> bool {
        use Stage::*;
        matches!(
            (self, next),
            (Idle, Resolving)
                | (Resolving, Fetching)
                | (Resolving, Failed)
                | (Fetching, Merging)
                | (Fetching, Cleaning)
                | (Merging, Cleaning)
                | (Cleaning, Succeeded)
                | (Cleaning, Failed)
        )
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Idle => "idle",
            Stage::Resolving => "resolving",
            Stage::Fetching => "fetching",
            Stage::Merging => "merging",
            Stage::Cleaning => "cleaning",
            Stage::Succeeded => "succeeded",
            Stage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Unique identifier for one pipeline run
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub u64);

impl RunId {
    /// A fresh random run id
    pub fn random() -> Self {
        Self(rand::random())
    }

    /// Name of this run's workspace directory
    pub fn workspace_name(&self) -> String {
        format!("run_{:016x}", self.0)
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Event emitted during a pipeline run
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// The run moved to a new stage
    StageChanged {
        /// Run ID
        run: RunId,
        /// Stage entered
        stage: Stage,
    },

    /// The folder listing produced sources
    Resolved {
        /// Run ID
        run: RunId,
        /// Number of sources to fetch
        count: usize,
    },

    /// A fetch started
    FetchStarted {
        /// Run ID
        run: RunId,
        /// Position of the source
        position: usize,
        /// Source URL
        url: String,
    },

    /// A fetch finished
    FetchComplete {
        /// Run ID
        run: RunId,
        /// Position of the source
        position: usize,
        /// File written
        path: PathBuf,
        /// Bytes written
        #[serde(skip_serializing_if = "Option::is_none")]
        size_bytes: Option<u64>,
        /// Fetches finished so far, including this one
        completed: usize,
        /// Total number of fetches in the run
        total: usize,
    },

    /// The encoder finished and the output is in place
    MergeComplete {
        /// Run ID
        run: RunId,
        /// Output file
        output: PathBuf,
    },

    /// A file could not be removed during cleanup
    CleanupWarning {
        /// Run ID
        run: RunId,
        /// The warning
        warning: CleanupWarning,
    },

    /// The run succeeded
    Succeeded {
        /// Run ID
        run: RunId,
        /// Output file
        output: PathBuf,
    },

    /// The run failed
    Failed {
        /// Run ID
        run: RunId,
        /// Stage the failure happened in
        stage: Stage,
        /// Error message
        error: String,
    },
}

/// Result of a successful run
#[must_use]
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunOutcome {
    /// Run ID
    pub run: RunId,
    /// The merged output file
    pub output: PathBuf,
    /// The assets that went into the merge, in merge order
    pub assets: Vec<LocalAsset>,
    /// The workspace, if it was kept (only with `keep_originals`)
    pub workspace: Option<PathBuf>,
    /// Non-fatal cleanup problems
    pub warnings: Vec<CleanupWarning>,
}
