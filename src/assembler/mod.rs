//! Merging fetched assets into one output video
//!
//! The [`Assembler`] owns the merge policy: it checks the options, builds the
//! encoder invocation, supervises the encoder through the [`Encoder`]
//! capability, verifies the output and, unless originals are kept, deletes
//! the inputs.
//!
//! The encoder writes to a sibling `*.partial.*` file which is renamed over
//! the output path only after the encoder succeeded, so a failed merge never
//! leaves (or clobbers) a file at the output path.
//!
//! ## Usage
//!
//! ```no_run
//! use panopto_dl::assembler::{Assembler, CliEncoder};
//! use panopto_dl::types::{LocalAsset, MergeOptions};
//! use std::sync::Arc;
//!
//! # async fn example(assets: Vec<LocalAsset>) -> Result<(), Box<dyn std::error::Error>> {
//! let encoder = CliEncoder::from_path().ok_or("ffmpeg not found")?;
//! let assembler = Assembler::new(Arc::new(encoder));
//!
//! let merged = assembler.merge(&assets, &MergeOptions::new("lectures.mp4")).await?;
//! println!("wrote {}", merged.output.display());
//! # Ok(())
//! # }
//! ```

mod cli;
mod traits;

pub use cli::CliEncoder;
pub use traits::{Encoder, EncoderOutput};

use crate::cleanup::remove_files;
use crate::error::{CleanupWarning, MergeError};
use crate::types::{LocalAsset, MergeOptions};
use crate::utils::is_non_empty_file;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Number of stderr lines kept in [`MergeError::EncoderFailed`]
const STDERR_TAIL_LINES: usize = 20;

/// Result of a successful merge
#[must_use]
#[derive(Debug, Clone)]
pub struct MergeReport {
    /// The merged output file
    pub output: PathBuf,
    /// Number of input files deleted after the merge
    pub removed_inputs: usize,
    /// Inputs that should have been deleted but could not be
    pub warnings: Vec<CleanupWarning>,
}

/// Merges ordered local assets with an external encoder
#[derive(Clone)]
pub struct Assembler {
    encoder: Arc<dyn Encoder>,
}

impl Assembler {
    /// Create an assembler that runs `encoder`
    pub fn new(encoder: Arc<dyn Encoder>) -> Self {
        Self { encoder }
    }

    /// Name of the encoder in use
    pub fn encoder_name(&self) -> &'static str {
        self.encoder.name()
    }

    /// Merge `assets`, in the given order, into `options.output_path`
    ///
    /// Zero assets fail with [`MergeError::NoInputs`] before anything is
    /// spawned. Input deletion problems after a successful merge are returned
    /// in [`MergeReport::warnings`] and never fail the merge.
    pub async fn merge(
        &self,
        assets: &[LocalAsset],
        options: &MergeOptions,
    ) -> Result<MergeReport, MergeError> {
        if assets.is_empty() {
            return Err(MergeError::NoInputs);
        }
        options.validate()?;

        let inputs: Vec<PathBuf> = assets.iter().map(|a| a.local_path.clone()).collect();
        let output = &options.output_path;
        let partial = partial_path(output);

        if let Some(parent) = output.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| MergeError::Io {
                    path: output.clone(),
                    reason: e.to_string(),
                })?;
        }

        let args = build_args(&inputs, options, &partial);
        tracing::info!(
            encoder = self.encoder.name(),
            inputs = inputs.len(),
            codec = options.codec.encoder_name(),
            crf = options.crf,
            output = %output.display(),
            "Merging videos"
        );
        tracing::debug!(?args, "Encoder arguments");

        let result = self.encoder.run(&args).await;
        let encoder_output = match result {
            Ok(out) => out,
            Err(e) => {
                discard_partial(&partial).await;
                return Err(e);
            }
        };

        if !encoder_output.success() {
            discard_partial(&partial).await;
            return Err(MergeError::EncoderFailed {
                encoder: self.encoder.name().to_string(),
                exit_code: encoder_output.exit_code,
                stderr_tail: stderr_tail(&encoder_output.stderr, STDERR_TAIL_LINES),
                inputs,
            });
        }

        if !is_non_empty_file(&partial).await {
            discard_partial(&partial).await;
            return Err(MergeError::MissingOutput {
                path: output.clone(),
            });
        }

        if let Err(e) = tokio::fs::rename(&partial, output).await {
            discard_partial(&partial).await;
            return Err(MergeError::Io {
                path: output.clone(),
                reason: e.to_string(),
            });
        }

        tracing::info!(output = %output.display(), "Merge complete");

        let (removed_inputs, warnings) = if options.keep_originals {
            (0, Vec::new())
        } else {
            let warnings = remove_files(inputs.iter().map(PathBuf::as_path)).await;
            (inputs.len() - warnings.len(), warnings)
        };

        Ok(MergeReport {
            output: output.clone(),
            removed_inputs,
            warnings,
        })
    }

    /// Remove whatever an interrupted merge to `options.output_path` left behind
    pub(crate) async fn discard_partial_output(&self, options: &MergeOptions) {
        discard_partial(&partial_path(&options.output_path)).await;
    }
}

/// Encoder arguments for merging `inputs` into `output`
///
/// One `-i` per input in order, a concat filter over the inputs in the same
/// order, the video codec and CRF, and the output path last.
pub fn build_args(inputs: &[PathBuf], options: &MergeOptions, output: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["-hide_banner".into(), "-y".into()];

    for input in inputs {
        args.push("-i".into());
        args.push(input.as_os_str().to_owned());
    }

    args.push("-filter_complex".into());
    args.push(concat_filter(inputs.len(), options.include_audio).into());
    args.push("-map".into());
    args.push("[v]".into());
    if options.include_audio {
        args.push("-map".into());
        args.push("[a]".into());
    }

    args.push("-vcodec".into());
    args.push(options.codec.encoder_name().into());
    args.push("-crf".into());
    args.push(options.crf.to_string().into());
    args.push(output.as_os_str().to_owned());
    args
}

/// `[0:v][0:a][1:v][1:a]concat=n=2:v=1:a=1[v][a]`, or video-only without audio
fn concat_filter(count: usize, include_audio: bool) -> String {
    let mut filter = String::new();
    for i in 0..count {
        filter.push_str(&format!("[{i}:v]"));
        if include_audio {
            filter.push_str(&format!("[{i}:a]"));
        }
    }
    if include_audio {
        filter.push_str(&format!("concat=n={count}:v=1:a=1[v][a]"));
    } else {
        filter.push_str(&format!("concat=n={count}:v=1:a=0[v]"));
    }
    filter
}

/// `dir/name.partial.ext` next to `output`, keeping the extension the encoder
/// uses to pick the container
fn partial_path(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .unwrap_or_else(|| OsStr::new("output"))
        .to_owned();
    let extension = output.extension().unwrap_or_else(|| OsStr::new("mp4"));

    let mut name = stem;
    name.push(".partial.");
    name.push(extension);
    output.with_file_name(name)
}

async fn discard_partial(partial: &Path) {
    match tokio::fs::remove_file(partial).await {
        Ok(()) => tracing::debug!(path = %partial.display(), "Removed partial output"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(
            path = %partial.display(),
            error = %e,
            "Failed to remove partial output"
        ),
    }
}

/// Last `lines` non-empty lines of `stderr`
fn stderr_tail(stderr: &str, lines: usize) -> String {
    let kept: Vec<&str> = stderr
        .lines()
        .map(str::trim_end)
        .filter(|l| !l.is_empty())
        .collect();
    let start = kept.len().saturating_sub(lines);
    kept[start..].join("\n")
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Codec, SourceUrl};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Encoder stand-in that records its arguments and writes the output
    struct RecordingEncoder {
        calls: Mutex<Vec<Vec<OsString>>>,
        exit_code: Option<i32>,
        output_bytes: &'static [u8],
        stderr: String,
    }

    impl RecordingEncoder {
        fn succeeding() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                exit_code: Some(0),
                output_bytes: b"merged",
                stderr: String::new(),
            }
        }

        fn failing(exit_code: i32, stderr: &str) -> Self {
            Self {
                exit_code: Some(exit_code),
                stderr: stderr.to_string(),
                ..Self::succeeding()
            }
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        fn last_args(&self) -> Vec<OsString> {
            self.calls.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl Encoder for RecordingEncoder {
        async fn run(&self, args: &[OsString]) -> Result<EncoderOutput, MergeError> {
            self.calls.lock().unwrap().push(args.to_vec());
            // Like ffmpeg, the output is written before the process reports failure
            let output = PathBuf::from(args.last().unwrap());
            tokio::fs::write(&output, self.output_bytes).await.unwrap();
            Ok(EncoderOutput {
                exit_code: self.exit_code,
                stderr: self.stderr.clone(),
            })
        }

        fn name(&self) -> &'static str {
            "recording"
        }
    }

    async fn assets_in(dir: &Path, names: &[&str]) -> Vec<LocalAsset> {
        let mut assets = Vec::new();
        for (position, name) in names.iter().enumerate() {
            let path = dir.join(name);
            tokio::fs::write(&path, b"video").await.unwrap();
            assets.push(LocalAsset {
                source: SourceUrl::new(position, format!("https://cdn.example.com/{name}")),
                local_path: path,
                size_bytes: Some(5),
            });
        }
        assets
    }

    fn input_paths(args: &[OsString]) -> Vec<OsString> {
        args.windows(2)
            .filter(|w| w[0] == "-i")
            .map(|w| w[1].clone())
            .collect()
    }

    fn value_after(args: &[OsString], flag: &str) -> OsString {
        let idx = args.iter().position(|a| a == flag).unwrap();
        args[idx + 1].clone()
    }

    #[tokio::test]
    async fn merges_inputs_in_order_with_codec_and_crf() {
        let dir = tempfile::tempdir().unwrap();
        let assets = assets_in(dir.path(), &["a.mp4", "b.mp4"]).await;
        let output = dir.path().join("out.mp4");
        let encoder = Arc::new(RecordingEncoder::succeeding());
        let assembler = Assembler::new(encoder.clone());

        let report = assembler
            .merge(&assets, &MergeOptions::new(&output))
            .await
            .unwrap();

        assert_eq!(report.output, output);
        assert_eq!(tokio::fs::read(&output).await.unwrap(), b"merged");
        let args = encoder.last_args();
        assert_eq!(
            input_paths(&args),
            vec![
                dir.path().join("a.mp4").into_os_string(),
                dir.path().join("b.mp4").into_os_string()
            ]
        );
        assert_eq!(value_after(&args, "-vcodec"), "libx264");
        assert_eq!(value_after(&args, "-crf"), "23");
        assert_eq!(
            value_after(&args, "-filter_complex"),
            "[0:v][0:a][1:v][1:a]concat=n=2:v=1:a=1[v][a]"
        );
    }

    #[tokio::test]
    async fn successful_merge_deletes_inputs_unless_kept() {
        let dir = tempfile::tempdir().unwrap();
        let assets = assets_in(dir.path(), &["a.mp4", "b.mp4"]).await;
        let assembler = Assembler::new(Arc::new(RecordingEncoder::succeeding()));

        let report = assembler
            .merge(&assets, &MergeOptions::new(dir.path().join("out.mp4")))
            .await
            .unwrap();

        assert_eq!(report.removed_inputs, 2);
        assert!(report.warnings.is_empty());
        assert!(assets.iter().all(|a| !a.local_path.exists()));

        let kept = assets_in(dir.path(), &["c.mp4"]).await;
        let options = MergeOptions {
            keep_originals: true,
            ..MergeOptions::new(dir.path().join("out2.mp4"))
        };
        let report = assembler.merge(&kept, &options).await.unwrap();
        assert_eq!(report.removed_inputs, 0);
        assert!(kept[0].local_path.exists());
    }

    #[tokio::test]
    async fn no_inputs_never_spawns_encoder() {
        let encoder = Arc::new(RecordingEncoder::succeeding());
        let assembler = Assembler::new(encoder.clone());

        let err = assembler
            .merge(&[], &MergeOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, MergeError::NoInputs));
        assert_eq!(encoder.call_count(), 0);
    }

    #[tokio::test]
    async fn invalid_crf_is_rejected_before_spawning() {
        let dir = tempfile::tempdir().unwrap();
        let assets = assets_in(dir.path(), &["a.mp4"]).await;
        let encoder = Arc::new(RecordingEncoder::succeeding());
        let assembler = Assembler::new(encoder.clone());
        let options = MergeOptions {
            crf: 60,
            ..MergeOptions::new(dir.path().join("out.mp4"))
        };

        let err = assembler.merge(&assets, &options).await.unwrap_err();

        assert!(matches!(err, MergeError::InvalidOptions { .. }));
        assert_eq!(encoder.call_count(), 0);
    }

    #[tokio::test]
    async fn encoder_failure_keeps_inputs_and_leaves_no_output() {
        let dir = tempfile::tempdir().unwrap();
        let assets = assets_in(dir.path(), &["a.mp4", "b.mp4"]).await;
        let output = dir.path().join("out.mp4");
        let stderr: String = (1..=30).map(|i| format!("line {i}\n")).collect();
        let assembler = Assembler::new(Arc::new(RecordingEncoder::failing(1, &stderr)));

        let err = assembler
            .merge(&assets, &MergeOptions::new(&output))
            .await
            .unwrap_err();

        match err {
            MergeError::EncoderFailed {
                exit_code,
                stderr_tail,
                inputs,
                ..
            } => {
                assert_eq!(exit_code, Some(1));
                assert_eq!(inputs.len(), 2);
                assert_eq!(stderr_tail.lines().count(), STDERR_TAIL_LINES);
                assert!(stderr_tail.starts_with("line 11"));
                assert!(stderr_tail.ends_with("line 30"));
            }
            other => panic!("expected EncoderFailed, got {other:?}"),
        }
        assert!(!output.exists());
        assert!(!partial_path(&output).exists(), "partial output must be removed");
        assert!(assets.iter().all(|a| a.local_path.exists()));
    }

    #[tokio::test]
    async fn failed_merge_does_not_clobber_existing_output() {
        let dir = tempfile::tempdir().unwrap();
        let assets = assets_in(dir.path(), &["a.mp4"]).await;
        let output = dir.path().join("out.mp4");
        tokio::fs::write(&output, b"previous run").await.unwrap();
        let assembler = Assembler::new(Arc::new(RecordingEncoder::failing(1, "boom")));

        assembler
            .merge(&assets, &MergeOptions::new(&output))
            .await
            .unwrap_err();

        assert_eq!(tokio::fs::read(&output).await.unwrap(), b"previous run");
    }

    #[tokio::test]
    async fn empty_output_is_missing_output() {
        let dir = tempfile::tempdir().unwrap();
        let assets = assets_in(dir.path(), &["a.mp4"]).await;
        let output = dir.path().join("out.mp4");
        let encoder = RecordingEncoder {
            output_bytes: b"",
            ..RecordingEncoder::succeeding()
        };
        let assembler = Assembler::new(Arc::new(encoder));

        let err = assembler
            .merge(&assets, &MergeOptions::new(&output))
            .await
            .unwrap_err();

        assert!(matches!(err, MergeError::MissingOutput { .. }), "got {err:?}");
        assert!(!output.exists());
        assert!(assets[0].local_path.exists());
    }

    #[tokio::test]
    async fn failed_rename_into_place_removes_partial_output() {
        let dir = tempfile::tempdir().unwrap();
        let assets = assets_in(dir.path(), &["a.mp4"]).await;
        // A non-empty directory at the output path cannot be replaced by a file
        let output = dir.path().join("out.mp4");
        tokio::fs::create_dir(&output).await.unwrap();
        tokio::fs::write(output.join("keep"), b"x").await.unwrap();
        let assembler = Assembler::new(Arc::new(RecordingEncoder::succeeding()));

        let err = assembler
            .merge(&assets, &MergeOptions::new(&output))
            .await
            .unwrap_err();

        assert!(matches!(err, MergeError::Io { .. }), "got {err:?}");
        assert!(!partial_path(&output).exists(), "partial output must be removed");
        assert!(output.join("keep").exists());
        assert!(assets[0].local_path.exists());
    }

    #[test]
    fn build_args_for_video_only_high_compression() {
        let inputs = vec![PathBuf::from("x.mp4"), PathBuf::from("y.mp4"), PathBuf::from("z.mp4")];
        let options = MergeOptions {
            codec: Codec::HighCompression,
            crf: 28,
            include_audio: false,
            ..MergeOptions::default()
        };

        let args = build_args(&inputs, &options, Path::new("out.mp4"));

        assert_eq!(
            value_after(&args, "-filter_complex"),
            "[0:v][1:v][2:v]concat=n=3:v=1:a=0[v]"
        );
        assert_eq!(value_after(&args, "-vcodec"), "libx265");
        assert_eq!(value_after(&args, "-crf"), "28");
        assert_eq!(args.iter().filter(|a| *a == "-map").count(), 1);
        assert_eq!(args.last().unwrap(), "out.mp4");
    }

    #[test]
    fn partial_path_keeps_container_extension() {
        assert_eq!(
            partial_path(Path::new("/videos/lectures.mkv")),
            PathBuf::from("/videos/lectures.partial.mkv")
        );
        assert_eq!(
            partial_path(Path::new("merged")),
            PathBuf::from("merged.partial.mp4")
        );
    }

    #[test]
    fn stderr_tail_skips_blank_lines() {
        assert_eq!(stderr_tail("a\n\nb\n  \nc\n", 2), "b\nc");
        assert_eq!(stderr_tail("", 20), "");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn shell_script_encoder_end_to_end() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake-ffmpeg");
        tokio::fs::write(
            &script,
            "#!/bin/sh\nfor last; do :; done\nprintf merged > \"$last\"\n",
        )
        .await
        .unwrap();
        tokio::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755))
            .await
            .unwrap();

        let assets = assets_in(dir.path(), &["a.mp4", "b.mp4"]).await;
        let output = dir.path().join("out").join("lecture.mp4");
        let assembler = Assembler::new(Arc::new(CliEncoder::new(script)));

        let report = assembler
            .merge(&assets, &MergeOptions::new(&output))
            .await
            .unwrap();

        assert_eq!(report.output, output);
        assert_eq!(tokio::fs::read(&output).await.unwrap(), b"merged");
        assert_eq!(assembler.encoder_name(), "cli-ffmpeg");
    }
}
