//! Metadata probe — negotiates resource properties with the origin
//!
//! Issues a HEAD request and derives the resource descriptor: total size
//! (required), byte-range support, and the output filename. Safe to
//! re-invoke; probing has no side effects.

use super::HTTP_TIMEOUT;
use crate::error::{Error, Result};
use crate::types::ResourceInfo;
use reqwest::{Client, StatusCode, header};
use tokio_util::sync::CancellationToken;

pub(crate) async fn fetch_metadata(
    client: &Client,
    uri: &str,
    user_agent: &str,
    cancel: &CancellationToken,
) -> Result<ResourceInfo> {
    let request = client
        .head(uri)
        .header(header::USER_AGENT, user_agent)
        .timeout(HTTP_TIMEOUT);

    let response = tokio::select! {
        () = cancel.cancelled() => return Err(Error::Cancelled),
        response = request.send() => response?,
    };

    let status = response.status();
    if status != StatusCode::OK {
        return Err(Error::Metadata {
            uri: uri.to_string(),
            reason: format!(
                "server returned status {} ({})",
                status.as_u16(),
                status.canonical_reason().unwrap_or("unknown")
            ),
        });
    }

    let total_size = match response.headers().get(header::CONTENT_LENGTH) {
        Some(value) => value
            .to_str()
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .ok_or_else(|| Error::Metadata {
                uri: uri.to_string(),
                reason: format!(
                    "invalid Content-Length '{}'",
                    String::from_utf8_lossy(value.as_bytes())
                ),
            })?,
        None => {
            return Err(Error::Metadata {
                uri: uri.to_string(),
                reason: "server did not provide a Content-Length header, \
                         cannot determine file size"
                    .to_string(),
            });
        }
    };

    let supports_range = response
        .headers()
        .get(header::ACCEPT_RANGES)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.trim().eq_ignore_ascii_case("bytes"));

    let filename = response
        .headers()
        .get(header::CONTENT_DISPOSITION)
        .and_then(|value| value.to_str().ok())
        .and_then(filename_from_disposition)
        .unwrap_or_else(|| filename_from_uri(uri));

    Ok(ResourceInfo {
        uri: uri.to_string(),
        total_size,
        supports_range,
        filename,
    })
}

/// Extract the `filename` parameter from a Content-Disposition value.
///
/// Handles the common `attachment; filename="name.ext"` form; anything
/// unparseable yields `None` and the caller falls back to the URI path.
fn filename_from_disposition(value: &str) -> Option<String> {
    for param in value.split(';') {
        let param = param.trim();
        if let Some(rest) = param.strip_prefix("filename=") {
            let name = rest.trim().trim_matches('"').trim();
            if !name.is_empty() {
                return Some(name.to_string());
            }
        }
    }
    None
}

/// Derive a filename from the final URI path segment, stripping the query
/// string and decoding `%20` to a space.
fn filename_from_uri(uri: &str) -> String {
    if let Ok(parsed) = url::Url::parse(uri)
        && let Some(mut segments) = parsed.path_segments()
        && let Some(last) = segments.next_back()
        && !last.is_empty()
    {
        return last.replace("%20", " ");
    }

    // Not a parseable URL; fall back to raw string surgery
    let last = uri.rsplit('/').next().unwrap_or(uri);
    let last = last.split('?').next().unwrap_or(last);
    if last.is_empty() {
        return "download".to_string();
    }
    last.replace("%20", " ")
}
