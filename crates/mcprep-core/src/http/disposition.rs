//! Destination filename resolution for directory-targeted downloads.
//!
//! The server gets first say via `Content-Disposition`; the last path segment
//! of the request URI is the fallback.

use reqwest::header::{HeaderMap, CONTENT_DISPOSITION};
use url::Url;

/// Extract a filename from a `Content-Disposition` header, honoring the
/// RFC 5987 `filename*` form (with percent-decoding) over the plain
/// `filename` form.
pub fn filename_from_headers(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(CONTENT_DISPOSITION)?.to_str().ok()?;

    let mut plain = None;
    for param in value.split(';').skip(1) {
        let Some((key, raw)) = param.split_once('=') else {
            continue;
        };
        match key.trim().to_ascii_lowercase().as_str() {
            "filename*" => {
                // ext-value: charset '<lang>' percent-encoded-value
                let mut parts = raw.trim().splitn(3, '\'');
                let (Some(charset), Some(_lang), Some(encoded)) =
                    (parts.next(), parts.next(), parts.next())
                else {
                    continue;
                };
                if !charset.eq_ignore_ascii_case("utf-8") {
                    continue;
                }
                if let Ok(decoded) = urlencoding::decode(encoded) {
                    return sanitize(&decoded);
                }
            }
            "filename" => {
                plain = Some(raw.trim().trim_matches('"').to_string());
            }
            _ => {}
        }
    }

    plain.as_deref().and_then(sanitize)
}

/// Last non-empty path segment of the request URI
pub fn filename_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let segment = parsed
        .path_segments()?
        .rev()
        .find(|s| !s.is_empty())?
        .to_string();
    sanitize(&segment)
}

// A server-supplied name must stay a bare filename
fn sanitize(name: &str) -> Option<String> {
    if name.is_empty() || name.contains(['/', '\\']) || name == ".." {
        return None;
    }
    Some(name.to_string())
}
