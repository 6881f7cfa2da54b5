//! Resolver backed by the Panopto session listing service

use super::non_empty;
use super::traits::SourceResolver;
use crate::config::ResolverConfig;
use crate::error::ResolutionError;
use crate::types::{FolderReference, SourceUrl};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;
use url::Url;

const GET_SESSIONS_PATH: &str = "/Panopto/Services/Data.svc/GetSessions";
const DELIVERY_INFO_PATH: &str = "/Panopto/Pages/Viewer/DeliveryInfo.aspx";

// Patterns are literals; a failure to compile is a programming error
#[allow(clippy::expect_used)]
static FOLDER_ID_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"[#?&]folderID="?([0-9a-fA-F\-]+)"?"#).expect("valid folder id regex")
});

#[allow(clippy::expect_used)]
static GUID_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
        .expect("valid guid regex")
});

#[allow(clippy::expect_used)]
static MS_DATE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/Date\((-?\d+)").expect("valid date regex"));

/// Extract the folder id from a Panopto folder URL
///
/// The URL is percent-decoded first, so both `#folderID="…"` and
/// `#folderID=%22…%22` are recognised. A bare folder GUID is returned as is.
///
/// # Examples
///
/// ```
/// use panopto_dl::resolver::extract_folder_id;
///
/// let url = "https://x.hosted.panopto.com/Panopto/Pages/Sessions/List.aspx#folderID=%22d1a0c6f4-8a2b-4c3e-9f10-1234567890ab%22";
/// assert_eq!(
///     extract_folder_id(url).as_deref(),
///     Some("d1a0c6f4-8a2b-4c3e-9f10-1234567890ab")
/// );
/// assert_eq!(extract_folder_id("https://example.com/"), None);
/// ```
pub fn extract_folder_id(reference: &str) -> Option<String> {
    let trimmed = reference.trim();
    if GUID_REGEX.is_match(trimmed) {
        return Some(trimmed.to_string());
    }
    let decoded = urlencoding::decode(trimmed)
        .map(|d| d.into_owned())
        .unwrap_or_else(|_| trimmed.to_string());
    FOLDER_ID_REGEX
        .captures(&decoded)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Parse a WCF JSON date (`/Date(1600000000000)/` or `/Date(1600000000000-0700)/`)
fn parse_ms_date(raw: &str) -> Option<DateTime<Utc>> {
    let millis: i64 = MS_DATE_REGEX.captures(raw)?.get(1)?.as_str().parse().ok()?;
    DateTime::from_timestamp_millis(millis)
}

#[derive(Debug, Deserialize)]
struct SessionsEnvelope {
    d: SessionsPayload,
}

#[derive(Debug, Deserialize)]
struct SessionsPayload {
    #[serde(rename = "Results", default)]
    results: Vec<SessionRecord>,
}

#[derive(Debug, Deserialize)]
struct SessionRecord {
    #[serde(rename = "SessionName", default)]
    session_name: Option<String>,
    #[serde(rename = "DeliveryID", default)]
    delivery_id: Option<String>,
    #[serde(rename = "IosVideoUrl", default)]
    ios_video_url: Option<String>,
    #[serde(rename = "StartTime", default)]
    start_time: Option<String>,
}

impl SessionRecord {
    fn display_name(&self) -> &str {
        self.session_name
            .as_deref()
            .or(self.delivery_id.as_deref())
            .unwrap_or("<unnamed session>")
    }
}

#[derive(Debug, Deserialize)]
struct DeliveryInfo {
    #[serde(rename = "Delivery")]
    delivery: Option<Delivery>,
}

#[derive(Debug, Deserialize)]
struct Delivery {
    #[serde(rename = "Streams", default)]
    streams: Vec<Stream>,
}

#[derive(Debug, Deserialize)]
struct Stream {
    #[serde(rename = "StreamType", default)]
    stream_type: Option<serde_json::Value>,
    #[serde(rename = "StreamUrl", default)]
    stream_url: Option<String>,
}

impl Stream {
    fn is_mp4(&self) -> bool {
        matches!(&self.stream_type, Some(serde_json::Value::String(t)) if t.eq_ignore_ascii_case("mp4"))
    }
}

/// Resolver that asks Panopto for the sessions of a folder
///
/// For every session in listing order the resolver looks up the MP4 stream
/// in the session's delivery info, falling back to the session's iOS video
/// URL when that is an MP4. Sessions with neither are left out with a
/// warning; a folder where every session is left out is an error.
pub struct PanoptoResolver {
    client: reqwest::Client,
    config: ResolverConfig,
    base_url: Option<Url>,
}

impl PanoptoResolver {
    /// Create a resolver using an (authenticated) HTTP client
    pub fn new(client: reqwest::Client, config: ResolverConfig) -> Self {
        Self {
            client,
            config,
            base_url: None,
        }
    }

    /// Server to query when the folder reference is a bare folder id
    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = Some(base_url);
        self
    }

    fn server_for(&self, folder: &FolderReference) -> Result<Url, ResolutionError> {
        match Url::parse(folder.as_str()) {
            Ok(url) if url.has_host() => {
                let mut origin = url;
                origin.set_path("/");
                origin.set_query(None);
                origin.set_fragment(None);
                Ok(origin)
            }
            _ => self
                .base_url
                .clone()
                .ok_or_else(|| ResolutionError::InvalidFolder {
                    folder: folder.to_string(),
                    reason: "a bare folder id needs a server base URL".to_string(),
                }),
        }
    }

    async fn list_sessions(
        &self,
        folder: &FolderReference,
        server: &Url,
        folder_id: &str,
    ) -> Result<Vec<SessionRecord>, ResolutionError> {
        let endpoint = server
            .join(GET_SESSIONS_PATH)
            .map_err(|e| ResolutionError::InvalidFolder {
                folder: folder.to_string(),
                reason: e.to_string(),
            })?;

        let payload = serde_json::json!({
            "queryParameters": {
                "maxResults": self.config.max_results,
                "folderID": folder_id,
            }
        });

        tracing::debug!(%endpoint, folder_id, "Requesting folder sessions");

        let response = self
            .client
            .post(endpoint)
            .timeout(self.config.request_timeout)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ResolutionError::from_request(folder.as_str(), &e))?;

        if !response.status().is_success() {
            return Err(ResolutionError::LoadFailed {
                folder: folder.to_string(),
                reason: format!("HTTP status {}", response.status()),
            });
        }

        let envelope: SessionsEnvelope = response
            .json()
            .await
            .map_err(|e| ResolutionError::from_request(folder.as_str(), &e))?;

        Ok(envelope.d.results)
    }

    /// Look up the MP4 stream of one delivery; `None` on any failure
    async fn delivery_mp4_url(&self, server: &Url, delivery_id: &str) -> Option<String> {
        let mut endpoint = server.join(DELIVERY_INFO_PATH).ok()?;
        endpoint
            .query_pairs_mut()
            .append_pair("deliveryId", delivery_id);

        let response = match self
            .client
            .get(endpoint)
            .timeout(self.config.request_timeout)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(delivery_id, error = %e, "Delivery info request failed");
                return None;
            }
        };

        if !response.status().is_success() {
            tracing::warn!(
                delivery_id,
                status = %response.status(),
                "Delivery info fetch failed"
            );
            return None;
        }

        let info: DeliveryInfo = match response.json().await {
            Ok(info) => info,
            Err(e) => {
                tracing::warn!(delivery_id, error = %e, "Could not parse delivery info");
                return None;
            }
        };

        let url = info
            .delivery?
            .streams
            .into_iter()
            .find(Stream::is_mp4)
            .and_then(|s| s.stream_url)
            .filter(|u| !u.is_empty());

        if url.is_none() {
            tracing::warn!(delivery_id, "No MP4 stream found in delivery info");
        }
        url
    }

    async fn session_url(&self, server: &Url, session: &SessionRecord) -> Option<String> {
        if let Some(delivery_id) = session.delivery_id.as_deref().filter(|id| !id.is_empty())
            && let Some(url) = self.delivery_mp4_url(server, delivery_id).await
        {
            return Some(url);
        }

        let fallback = session
            .ios_video_url
            .as_deref()
            .filter(|u| u.to_ascii_lowercase().ends_with(".mp4"))?;
        tracing::debug!(
            session = session.display_name(),
            url = fallback,
            "Falling back to the session video URL"
        );
        Some(fallback.to_string())
    }
}

#[async_trait]
impl SourceResolver for PanoptoResolver {
    async fn resolve(
        &self,
        folder: &FolderReference,
    ) -> Result<Vec<SourceUrl>, ResolutionError> {
        let folder_id =
            extract_folder_id(folder.as_str()).ok_or_else(|| ResolutionError::InvalidFolder {
                folder: folder.to_string(),
                reason: "no folderID found in URL".to_string(),
            })?;
        let server = self.server_for(folder)?;

        let sessions = self.list_sessions(folder, &server, &folder_id).await?;
        tracing::info!(folder_id, sessions = sessions.len(), "Folder listing loaded");

        let mut sources = Vec::with_capacity(sessions.len());
        for session in &sessions {
            let Some(url) = self.session_url(&server, session).await else {
                tracing::warn!(
                    session = session.display_name(),
                    delivery_id = session.delivery_id.as_deref().unwrap_or(""),
                    "Failed to get MP4 URL for session, leaving it out"
                );
                continue;
            };

            let mut source = SourceUrl::new(sources.len(), url);
            source.title = session.session_name.clone();
            source.recorded_at = session.start_time.as_deref().and_then(parse_ms_date);
            sources.push(source);
        }

        non_empty(folder, sources)
    }

    fn name(&self) -> &'static str {
        "panopto"
    }
}
