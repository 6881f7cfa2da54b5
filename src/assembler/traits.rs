//! Traits and types for the external encoder

use crate::error::MergeError;
use async_trait::async_trait;
use std::ffi::OsString;

/// What a finished encoder process reported
#[must_use]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderOutput {
    /// Process exit code, `None` when terminated by a signal
    pub exit_code: Option<i32>,
    /// Everything the process wrote to stderr
    pub stderr: String,
}

impl EncoderOutput {
    /// Whether the process exited with code 0
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Capability that runs the video encoder
///
/// The assembler builds the full argument list; an encoder only runs it to
/// completion and reports the exit status. Implementations can wrap an
/// external binary or, in tests, record the arguments and fake the output.
///
/// # Examples
///
/// ```no_run
/// use panopto_dl::assembler::{CliEncoder, Encoder};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let encoder = CliEncoder::from_path().expect("ffmpeg not found");
/// let output = encoder.run(&["-version".into()]).await?;
/// println!("{} exited with {:?}", encoder.name(), output.exit_code);
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait Encoder: Send + Sync {
    /// Run the encoder with `args` and wait for it to exit
    ///
    /// Returns [`MergeError::Spawn`] only when the process could not be
    /// started; a process that starts and fails is reported through
    /// [`EncoderOutput::exit_code`].
    async fn run(&self, args: &[OsString]) -> Result<EncoderOutput, MergeError>;

    /// Name of the implementation, for logs and errors
    fn name(&self) -> &'static str;
}
