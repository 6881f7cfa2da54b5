//! Error types for panopto-dl
//!
//! The pipeline distinguishes three run-fatal failure families, one per
//! component, plus a non-fatal cleanup warning:
//! - [`ResolutionError`] - the folder could not be turned into source URLs
//! - [`FetchError`] - a single source could not be downloaded
//! - [`MergeError`] - the external encoder could not produce the output
//! - [`CleanupWarning`] - a leftover file could not be removed (never fatal)

use crate::types::Stage;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for panopto-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for panopto-dl
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "max_concurrent_fetches")
        key: Option<String>,
    },

    /// Source resolution failed
    #[error("resolution error: {0}")]
    Resolution(#[from] ResolutionError),

    /// Fetching a source failed
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Merging the fetched assets failed
    #[error("merge error: {0}")]
    Merge(#[from] MergeError),

    /// The run was cancelled before it could finish
    #[error("run cancelled during {stage}")]
    Cancelled {
        /// Stage that was active when cancellation was observed
        stage: Stage,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// External tool execution failed (ffmpeg)
    #[error("external tool error: {0}")]
    ExternalTool(String),

    /// Operation not supported (missing binary, not implemented, etc.)
    #[error("not supported: {0}")]
    NotSupported(String),
}

impl Error {
    /// The pipeline stage a run was in when it failed with this error
    pub fn stage(&self) -> Stage {
        match self {
            Error::Resolution(_) => Stage::Resolving,
            Error::Fetch(_) => Stage::Fetching,
            Error::Merge(_) | Error::ExternalTool(_) => Stage::Merging,
            Error::Cancelled { stage } => *stage,
            Error::Config { .. }
            | Error::Io(_)
            | Error::Network(_)
            | Error::Serialization(_)
            | Error::NotSupported(_) => Stage::Idle,
        }
    }

    /// Shorthand for a configuration error tied to a specific key
    pub(crate) fn config(key: &str, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }
}

/// Errors raised while turning a folder reference into source URLs
#[derive(Debug, Error)]
pub enum ResolutionError {
    /// The folder reference does not identify a folder
    #[error("cannot resolve folder {folder}: {reason}")]
    InvalidFolder {
        /// The folder reference as supplied by the caller
        folder: String,
        /// Why the reference was rejected
        reason: String,
    },

    /// The folder listing could not be loaded
    #[error("failed to load folder {folder}: {reason}")]
    LoadFailed {
        /// The folder reference as supplied by the caller
        folder: String,
        /// The underlying HTTP or connection failure
        reason: String,
    },

    /// The folder listing did not answer in time
    #[error("timed out loading folder {folder}")]
    Timeout {
        /// The folder reference as supplied by the caller
        folder: String,
    },

    /// The folder listing was loaded but could not be understood
    #[error("unexpected folder listing for {folder}: {reason}")]
    Malformed {
        /// The folder reference as supplied by the caller
        folder: String,
        /// What was wrong with the listing
        reason: String,
    },

    /// The folder listing contained no fetchable videos
    #[error("no video URLs found in folder {folder}")]
    Empty {
        /// The folder reference as supplied by the caller
        folder: String,
    },
}

impl ResolutionError {
    /// Classify a transport error raised while loading `folder`
    pub(crate) fn from_request(folder: &str, e: &reqwest::Error) -> Self {
        if e.is_timeout() {
            ResolutionError::Timeout {
                folder: folder.to_string(),
            }
        } else if e.is_decode() {
            ResolutionError::Malformed {
                folder: folder.to_string(),
                reason: e.to_string(),
            }
        } else {
            ResolutionError::LoadFailed {
                folder: folder.to_string(),
                reason: e.to_string(),
            }
        }
    }
}

/// A failed download of one source item
///
/// Always names the position and URL of the item so a failed run can be
/// diagnosed without re-running resolution.
#[derive(Debug, Error)]
#[error("item {position} ({url}): {kind}")]
pub struct FetchError {
    /// Zero-based position of the item in the resolved order
    pub position: usize,
    /// The URL that was being fetched
    pub url: String,
    /// What went wrong
    pub kind: FetchErrorKind,
}

/// The failure classes a fetch can end in
#[derive(Debug, Error)]
pub enum FetchErrorKind {
    /// The server answered with a non-success status
    #[error("HTTP status {status}")]
    Status {
        /// The HTTP status code returned
        status: u16,
    },

    /// The request timed out
    #[error("request timed out")]
    Timeout,

    /// The connection failed or the body stream broke
    #[error("connection failed: {reason}")]
    Connection {
        /// The underlying transport error
        reason: String,
    },

    /// Writing the destination file failed
    #[error("failed to write {path}: {reason}")]
    Write {
        /// The destination file
        path: PathBuf,
        /// The underlying I/O error
        reason: String,
    },
}

impl FetchError {
    /// Build a fetch error for the item at `position`
    pub fn new(position: usize, url: impl Into<String>, kind: FetchErrorKind) -> Self {
        Self {
            position,
            url: url.into(),
            kind,
        }
    }

    /// Classify a transport error raised while fetching the item
    pub(crate) fn from_request(position: usize, url: &str, e: &reqwest::Error) -> Self {
        let kind = if e.is_timeout() {
            FetchErrorKind::Timeout
        } else if let Some(status) = e.status() {
            FetchErrorKind::Status {
                status: status.as_u16(),
            }
        } else {
            FetchErrorKind::Connection {
                reason: e.to_string(),
            }
        };
        Self::new(position, url, kind)
    }
}

/// Errors raised while merging fetched assets into the output file
#[derive(Debug, Error)]
pub enum MergeError {
    /// There was nothing to merge
    #[error("no input files to merge")]
    NoInputs,

    /// The merge options are unusable
    #[error("invalid merge options: {reason}")]
    InvalidOptions {
        /// Which option was rejected and why
        reason: String,
    },

    /// The encoder process could not be started
    #[error("failed to start encoder {encoder}: {reason}")]
    Spawn {
        /// Name of the encoder capability
        encoder: String,
        /// The underlying spawn failure
        reason: String,
    },

    /// The encoder exited unsuccessfully
    #[error("encoder {encoder} failed on {} inputs (exit code {}): {stderr_tail}", .inputs.len(), exit_label(.exit_code))]
    EncoderFailed {
        /// Name of the encoder capability
        encoder: String,
        /// Process exit code, `None` when killed by a signal
        exit_code: Option<i32>,
        /// Last lines the encoder wrote to stderr
        stderr_tail: String,
        /// The inputs of the failed merge, in merge order
        inputs: Vec<PathBuf>,
    },

    /// The encoder exited successfully but produced no usable output
    #[error("encoder reported success but {path} is missing or empty")]
    MissingOutput {
        /// The expected output file
        path: PathBuf,
    },

    /// Preparing the output location failed
    #[error("failed to prepare output {path}: {reason}")]
    Io {
        /// The output path being prepared
        path: PathBuf,
        /// The underlying I/O error
        reason: String,
    },
}

fn exit_label(code: &Option<i32>) -> String {
    code.map_or_else(|| "none".to_string(), |c| c.to_string())
}

/// A non-fatal cleanup problem
///
/// Recorded for observability only: it is logged, emitted as an event and
/// listed in the run outcome, but it never fails a run.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
#[error("failed to remove {path}: {reason}")]
pub struct CleanupWarning {
    /// The file or directory that could not be removed
    pub path: PathBuf,
    /// The underlying I/O error
    pub reason: String,
}

impl CleanupWarning {
    /// Record a removal failure for `path`
    pub fn new(path: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
        Self {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
