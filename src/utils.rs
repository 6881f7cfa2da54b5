//! Utility functions for file naming

use std::path::Path;

/// Fallback file name when a URL has no usable last path segment
const FALLBACK_FILE_NAME: &str = "video.mp4";

/// Deterministic local file name for the source at `position`
///
/// The name is the URL's last path segment (percent-decoded, with characters
/// that are unsafe in file names replaced), prefixed with the zero-padded
/// position. The prefix keeps names distinct when several streams share a
/// basename, which is common for CDN-hosted recordings.
///
/// # Examples
///
/// ```
/// use panopto_dl::utils::asset_file_name;
///
/// assert_eq!(
///     asset_file_name(4, "https://cdn.example.com/sessions/abc/lecture%201.mp4?token=x"),
///     "004-lecture_1.mp4"
/// );
/// assert_eq!(asset_file_name(0, "https://cdn.example.com/"), "000-video.mp4");
/// ```
pub fn asset_file_name(position: usize, url: &str) -> String {
    let base = url_basename(url)
        .map(|name| sanitize_file_name(&name))
        .filter(|name| !name.is_empty() && name != "." && name != "..")
        .unwrap_or_else(|| FALLBACK_FILE_NAME.to_string());
    format!("{position:03}-{base}")
}

/// Last non-empty path segment of `url`, percent-decoded
fn url_basename(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let last = parsed.path_segments()?.rev().find(|s| !s.is_empty())?;
    let decoded = urlencoding::decode(last)
        .map(|d| d.into_owned())
        .unwrap_or_else(|_| last.to_string());
    Some(decoded)
}

/// Replace characters that are invalid or awkward in file names
///
/// Path separators, Windows-reserved characters, control characters and
/// whitespace become `_`; runs of `_` collapse to one.
pub fn sanitize_file_name(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() || c.is_whitespace() => '_',
            c => c,
        })
        .collect();
    collapse_underscores(&replaced)
}

fn collapse_underscores(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        if c == '_' && out.ends_with('_') {
            continue;
        }
        out.push(c);
    }
    out
}

/// Whether `path` is an existing, non-empty regular file
pub async fn is_non_empty_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file() && m.len() > 0)
        .unwrap_or(false)
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asset_file_name_uses_last_path_segment() {
        assert_eq!(
            asset_file_name(0, "https://example.com/a/b/session.mp4"),
            "000-session.mp4"
        );
        assert_eq!(
            asset_file_name(12, "https://example.com/a/b/session.mp4"),
            "012-session.mp4"
        );
    }

    #[test]
    fn asset_file_name_ignores_query_and_fragment() {
        assert_eq!(
            asset_file_name(1, "https://example.com/v.mp4?Policy=abc&Signature=def#t=10"),
            "001-v.mp4"
        );
    }

    #[test]
    fn asset_file_name_skips_trailing_slash() {
        assert_eq!(
            asset_file_name(2, "https://example.com/videos/clip.mp4/"),
            "002-clip.mp4"
        );
    }

    #[test]
    fn asset_file_name_falls_back_for_unusable_urls() {
        assert_eq!(asset_file_name(3, "https://example.com"), "003-video.mp4");
        assert_eq!(asset_file_name(3, "not a url"), "003-video.mp4");
        assert_eq!(asset_file_name(3, "https://example.com/.."), "003-video.mp4");
    }

    #[test]
    fn asset_file_name_is_deterministic() {
        let url = "https://example.com/x/master.mp4";
        assert_eq!(asset_file_name(7, url), asset_file_name(7, url));
        assert_ne!(asset_file_name(7, url), asset_file_name(8, url));
    }

    #[test]
    fn decoded_separators_cannot_escape_the_directory() {
        let name = asset_file_name(0, "https://example.com/..%2F..%2Fetc%2Fpasswd");
        assert!(!name.contains('/'), "got {name}");
        assert_eq!(name, "000-.._.._etc_passwd");
    }

    #[test]
    fn sanitize_replaces_reserved_characters() {
        assert_eq!(sanitize_file_name("a:b*c?d.mp4"), "a_b_c_d.mp4");
        assert_eq!(sanitize_file_name("two  spaces.mp4"), "two_spaces.mp4");
    }

    #[tokio::test]
    async fn is_non_empty_file_checks_size() {
        let dir = tempfile::tempdir().unwrap();
        let empty = dir.path().join("empty.mp4");
        let full = dir.path().join("full.mp4");
        tokio::fs::write(&empty, b"").await.unwrap();
        tokio::fs::write(&full, b"data").await.unwrap();

        assert!(!is_non_empty_file(&empty).await);
        assert!(is_non_empty_file(&full).await);
        assert!(!is_non_empty_file(&dir.path().join("missing.mp4")).await);
        assert!(!is_non_empty_file(dir.path()).await);
    }
}
