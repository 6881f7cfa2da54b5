//! Encoder backed by an external ffmpeg binary

use super::traits::{Encoder, EncoderOutput};
use crate::config::ToolsConfig;
use crate::error::{Error, MergeError, Result};
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;

/// Encoder that executes an ffmpeg-compatible binary
///
/// stdin is closed so the process can never block on a prompt, and the child
/// is killed if the merge future is dropped.
pub struct CliEncoder {
    binary_path: PathBuf,
}

impl CliEncoder {
    /// Create an encoder with an explicit binary path
    pub fn new(binary_path: PathBuf) -> Self {
        Self { binary_path }
    }

    /// Attempt to find `ffmpeg` in PATH
    pub fn from_path() -> Option<Self> {
        which::which("ffmpeg").ok().map(Self::new)
    }

    /// Pick the binary from the tools configuration
    ///
    /// An explicit `ffmpeg_path` wins; otherwise PATH is searched when
    /// `search_path` allows it.
    pub fn from_config(tools: &ToolsConfig) -> Result<Self> {
        if let Some(path) = &tools.ffmpeg_path {
            return Ok(Self::new(path.clone()));
        }
        if tools.search_path
            && let Some(encoder) = Self::from_path()
        {
            tracing::debug!(path = %encoder.binary_path.display(), "Found ffmpeg in PATH");
            return Ok(encoder);
        }
        Err(Error::NotSupported(
            "ffmpeg not found: install it or set tools.ffmpeg_path".to_string(),
        ))
    }

    /// The binary this encoder runs
    pub fn binary_path(&self) -> &std::path::Path {
        &self.binary_path
    }
}

#[async_trait]
impl Encoder for CliEncoder {
    async fn run(&self, args: &[OsString]) -> std::result::Result<EncoderOutput, MergeError> {
        let output = Command::new(&self.binary_path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| MergeError::Spawn {
                encoder: self.name().to_string(),
                reason: format!("{}: {}", self.binary_path.display(), e),
            })?;

        Ok(EncoderOutput {
            exit_code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    fn name(&self) -> &'static str {
        "cli-ffmpeg"
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_path_agrees_with_which() {
        assert_eq!(
            which::which("ffmpeg").is_ok(),
            CliEncoder::from_path().is_some(),
            "from_path() should return Some if and only if which::which() succeeds"
        );
    }

    #[test]
    fn explicit_path_wins_over_search() {
        let tools = ToolsConfig {
            ffmpeg_path: Some(PathBuf::from("/opt/ffmpeg/bin/ffmpeg")),
            search_path: true,
        };
        let encoder = CliEncoder::from_config(&tools).unwrap();
        assert_eq!(encoder.binary_path(), std::path::Path::new("/opt/ffmpeg/bin/ffmpeg"));
    }

    #[test]
    fn no_path_and_no_search_is_not_supported() {
        let tools = ToolsConfig {
            ffmpeg_path: None,
            search_path: false,
        };
        assert!(matches!(
            CliEncoder::from_config(&tools),
            Err(Error::NotSupported(_))
        ));
    }

    #[tokio::test]
    async fn missing_binary_is_a_spawn_error() {
        let encoder = CliEncoder::new(PathBuf::from("/nonexistent/ffmpeg-xyz"));
        let err = encoder.run(&[]).await.unwrap_err();
        match err {
            MergeError::Spawn { encoder, reason } => {
                assert_eq!(encoder, "cli-ffmpeg");
                assert!(reason.contains("/nonexistent/ffmpeg-xyz"));
            }
            other => panic!("expected Spawn, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn reports_exit_code_and_stderr() {
        let encoder = CliEncoder::new(PathBuf::from("/bin/sh"));
        let output = encoder
            .run(&["-c".into(), "echo first >&2; echo second >&2; exit 4".into()])
            .await
            .unwrap();
        assert_eq!(output.exit_code, Some(4));
        assert!(!output.success());
        assert_eq!(output.stderr, "first\nsecond\n");
    }
}
