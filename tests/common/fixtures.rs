//! Test fixtures: a mock Panopto server and an ffmpeg stand-in

use serde_json::json;
use std::path::{Path, PathBuf};
use std::time::Duration;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Folder id used by every mock folder
pub const FOLDER_ID: &str = "d1a0c6f4-8a2b-4c3e-9f10-1234567890ab";

/// Session cookie the mock server insists on
pub const SESSION_COOKIE: &str = ".ASPXAUTH=e2e-session";

/// One recording served by the mock server
pub struct MockSession {
    /// Session name in the listing
    pub name: &'static str,
    /// Video file body
    pub body: &'static [u8],
    /// Response delay for the video download
    pub delay: Duration,
    /// HTTP status for the video download
    pub status: u16,
}

impl MockSession {
    /// A session that downloads successfully after `delay_ms`
    pub fn ok(name: &'static str, body: &'static [u8], delay_ms: u64) -> Self {
        Self {
            name,
            body,
            delay: Duration::from_millis(delay_ms),
            status: 200,
        }
    }

    /// A session whose video download fails with `status`
    pub fn failing(name: &'static str, status: u16) -> Self {
        Self {
            name,
            body: b"",
            delay: Duration::ZERO,
            status,
        }
    }
}

/// Folder URL on `server` in the form the Panopto web UI uses
pub fn folder_url(server: &MockServer) -> String {
    format!(
        "{}/Panopto/Pages/Sessions/List.aspx#folderID=%22{FOLDER_ID}%22",
        server.uri()
    )
}

/// Video URL of the session at `index`
pub fn video_url(server: &MockServer, index: usize) -> String {
    format!("{}/videos/{index}.mp4", server.uri())
}

/// Mount a folder listing, delivery info and video download per session
///
/// The listing and delivery info require [`SESSION_COOKIE`].
pub async fn mount_folder(server: &MockServer, sessions: &[MockSession]) {
    let results: Vec<_> = sessions
        .iter()
        .enumerate()
        .map(|(i, s)| {
            json!({
                "SessionName": s.name,
                "DeliveryID": format!("delivery-{i}"),
                "StartTime": format!("/Date({})/", 1_600_000_000_000i64 + i as i64 * 3_600_000),
                "FolderName": "E2E Folder",
            })
        })
        .collect();

    Mock::given(method("POST"))
        .and(path("/Panopto/Services/Data.svc/GetSessions"))
        .and(header("cookie", SESSION_COOKIE))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"d": {"Results": results}})))
        .mount(server)
        .await;

    for (i, session) in sessions.iter().enumerate() {
        Mock::given(method("GET"))
            .and(path("/Panopto/Pages/Viewer/DeliveryInfo.aspx"))
            .and(query_param("deliveryId", format!("delivery-{i}")))
            .and(header("cookie", SESSION_COOKIE))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Delivery": {"Streams": [
                    {"StreamType": "hls", "StreamUrl": format!("{}/videos/{i}.m3u8", server.uri())},
                    {"StreamType": "mp4", "StreamUrl": video_url(server, i)}
                ]}
            })))
            .mount(server)
            .await;

        Mock::given(method("GET"))
            .and(path(format!("/videos/{i}.mp4")))
            .respond_with(
                ResponseTemplate::new(session.status)
                    .set_body_bytes(session.body.to_vec())
                    .set_delay(session.delay),
            )
            .mount(server)
            .await;
    }
}

/// Write a cookie file holding [`SESSION_COOKIE`] into `dir`
pub async fn write_cookie_file(dir: &Path) -> PathBuf {
    let (name, value) = SESSION_COOKIE
        .split_once('=')
        .expect("cookie constant has a value");
    let cookie_path = dir.join("cookies.json");
    let content = json!([{"name": name, "value": value, "domain": "127.0.0.1", "path": "/"}]);
    tokio::fs::write(&cookie_path, content.to_string())
        .await
        .expect("write cookie file");
    cookie_path
}

/// An ffmpeg stand-in that concatenates its `-i` inputs byte-wise into the
/// output (last argument) and logs its arguments, one per line
#[cfg(unix)]
pub struct FakeFfmpeg {
    /// The script to pass as encoder binary
    pub binary: PathBuf,
    /// Where the script logs its arguments
    pub args_log: PathBuf,
}

#[cfg(unix)]
impl FakeFfmpeg {
    /// Install a concatenating stand-in in `dir`
    pub async fn concatenating(dir: &Path) -> Self {
        let args_log = dir.join("ffmpeg-args.log");
        let scratch = dir.join("ffmpeg-scratch");
        let script = format!(
            "#!/bin/sh\n\
             printf '%s\\n' \"$@\" > '{log}'\n\
             : > '{scratch}'\n\
             prev=''\n\
             for arg in \"$@\"; do\n\
             \x20 if [ \"$prev\" = '-i' ]; then cat \"$arg\" >> '{scratch}'; fi\n\
             \x20 prev=\"$arg\"\n\
             done\n\
             mv '{scratch}' \"$arg\"\n",
            log = args_log.display(),
            scratch = scratch.display(),
        );
        Self {
            binary: install_script(dir, "fake-ffmpeg", &script).await,
            args_log,
        }
    }

    /// Install a stand-in that fails like ffmpeg on a corrupt input
    pub async fn failing(dir: &Path) -> Self {
        let args_log = dir.join("ffmpeg-args.log");
        let script = format!(
            "#!/bin/sh\n\
             printf '%s\\n' \"$@\" > '{log}'\n\
             echo 'moov atom not found' >&2\n\
             echo 'Invalid data found when processing input' >&2\n\
             exit 1\n",
            log = args_log.display(),
        );
        Self {
            binary: install_script(dir, "failing-ffmpeg", &script).await,
            args_log,
        }
    }

    /// Arguments of the last invocation, or `None` when never run
    pub async fn logged_args(&self) -> Option<Vec<String>> {
        let content = tokio::fs::read_to_string(&self.args_log).await.ok()?;
        Some(content.lines().map(str::to_string).collect())
    }
}

#[cfg(unix)]
async fn install_script(dir: &Path, name: &str, content: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    tokio::fs::write(&path, content)
        .await
        .expect("write encoder script");
    tokio::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
        .await
        .expect("make encoder script executable");
    path
}
