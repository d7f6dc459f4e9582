//! Helpers for keeping credentials and host paths out of logs and status
//! messages.

use std::path::Path;

use url::Url;

/// Returns only the final component of a path.
///
/// Staging directories carry random suffixes and live under the host temp
/// directory; neither is useful in a log line.
pub fn redact_path(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>")
        .to_string()
}

/// Strips credentials and query strings from an artifact URL.
///
/// - `https://user:pw@host/a.tar.gz` → `https://****@host/a.tar.gz`
/// - `https://bucket.s3/a.tar.gz?X-Amz-Signature=..` → `https://bucket.s3/a.tar.gz?****`
///
/// Strings that do not parse as URLs are returned unchanged.
pub fn redact_url(raw: &str) -> String {
    let Ok(mut url) = Url::parse(raw) else {
        return raw.to_string();
    };

    let had_credentials = !url.username().is_empty() || url.password().is_some();
    if had_credentials {
        let _ = url.set_password(None);
        let _ = url.set_username("****");
    }
    if url.query().is_some() {
        url.set_query(Some("****"));
    }
    url.to_string()
}
