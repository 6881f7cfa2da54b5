//! Configuration types for panopto-dl

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{path::Path, path::PathBuf, time::Duration};

/// Fetch behavior configuration (workspace location, concurrency, timeouts)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Directory under which each run creates its own workspace (default: "temp")
    #[serde(default = "default_workspace_root")]
    pub workspace_root: PathBuf,

    /// Maximum number of fetches in flight at once (default: 3)
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_fetches: usize,

    /// Longest wait for the response head or the next body chunk of a
    /// download (default: 60 seconds); a download that keeps receiving data
    /// never times out
    #[serde(default = "default_read_timeout", with = "duration_serde")]
    pub read_timeout: Duration,

    /// TCP connect timeout (default: 30 seconds)
    #[serde(default = "default_connect_timeout", with = "duration_serde")]
    pub connect_timeout: Duration,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            workspace_root: default_workspace_root(),
            max_concurrent_fetches: default_max_concurrent(),
            read_timeout: default_read_timeout(),
            connect_timeout: default_connect_timeout(),
        }
    }
}

/// External tool paths
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Path to ffmpeg executable (auto-detected if None)
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,

    /// Whether to search PATH for ffmpeg if no explicit path is set (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: None,
            search_path: true,
        }
    }
}

/// Folder listing settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Maximum number of sessions requested from the folder listing (default: 999)
    #[serde(default = "default_max_results")]
    pub max_results: u32,

    /// Timeout for listing and delivery-info requests (default: 30 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// CSS class marking video links when scraping a folder page (default: "video-link")
    #[serde(default = "default_link_class")]
    pub link_class: String,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_results: default_max_results(),
            request_timeout: default_request_timeout(),
            link_class: default_link_class(),
        }
    }
}

/// Authenticated session settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Browser-exported cookie file (JSON array of `{name, value}` objects)
    #[serde(default)]
    pub cookies_file: Option<PathBuf>,

    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookies_file: None,
            user_agent: default_user_agent(),
        }
    }
}

/// Retry configuration for transient fetch failures
///
/// The default performs a single attempt per source; raise `max_retries` to
/// retry timeouts, connection failures and 5xx/429 answers with backoff.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt (default: 0)
    #[serde(default)]
    pub max_retries: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// Main configuration for a [`Pipeline`](crate::Pipeline)
///
/// Every section has defaults, so an empty JSON object is a valid config file.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Workspace, concurrency and timeouts
    #[serde(default)]
    pub download: DownloadConfig,

    /// External tool paths
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Folder listing settings
    #[serde(default)]
    pub resolver: ResolverConfig,

    /// Cookies and headers for the authenticated session
    #[serde(default)]
    pub session: SessionConfig,

    /// Retry policy for fetches
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Config {
    /// Load a JSON config file
    pub async fn from_file(path: &Path) -> Result<Self> {
        let content = tokio::fs::read(path).await.map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to read config file '{}': {}", path.display(), e),
            ))
        })?;
        let config: Config = serde_json::from_slice(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check settings that serde cannot reject on its own
    pub fn validate(&self) -> Result<()> {
        if self.download.max_concurrent_fetches == 0 {
            return Err(Error::config(
                "max_concurrent_fetches",
                "max_concurrent_fetches must be at least 1",
            ));
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(Error::config(
                "backoff_multiplier",
                format!(
                    "backoff_multiplier must be at least 1.0, got {}",
                    self.retry.backoff_multiplier
                ),
            ));
        }
        if self.resolver.max_results == 0 {
            return Err(Error::config(
                "max_results",
                "max_results must be at least 1",
            ));
        }
        Ok(())
    }
}

// Default value functions
fn default_workspace_root() -> PathBuf {
    PathBuf::from("temp")
}

fn default_max_concurrent() -> usize {
    3
}

fn default_read_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_true() -> bool {
    true
}

fn default_max_results() -> u32 {
    999
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_link_class() -> String {
    "video-link".to_string()
}

fn default_user_agent() -> String {
    concat!("panopto-dl/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
