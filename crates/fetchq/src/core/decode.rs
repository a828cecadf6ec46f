use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;

use crate::data::{Content, ContentFormat, Headers};
use crate::error::Result;

/// Returns `true` if a `Content-Type` value declares JSON.
///
/// Matches `application/json` and structured-syntax suffixes such as
/// `application/problem+json`, ignoring parameters and case.
///
/// # Examples
///
/// ```
/// use fetchq::is_json_content_type;
///
/// assert!(is_json_content_type("application/json; charset=utf-8"));
/// assert!(is_json_content_type("application/ld+json"));
/// assert!(!is_json_content_type("text/html"));
/// ```
pub fn is_json_content_type(value: &str) -> bool {
    let essence = value.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
    essence == "application/json" || (essence.contains('/') && essence.ends_with("+json"))
}

/// Default body decoder.
///
/// - [`ContentFormat::Base64`]: raw bytes, base64 encoded.
/// - otherwise, a declared JSON content type is parsed as JSON.
/// - otherwise the body is decoded as UTF-8 text, replacing invalid sequences.
pub fn decode_body(format: ContentFormat, headers: &Headers, body: Bytes) -> Result<Content> {
    if format == ContentFormat::Base64 {
        return Ok(Content::Base64(STANDARD.encode(&body)));
    }

    if headers.get("content-type").is_some_and(is_json_content_type) {
        return Ok(Content::Json(serde_json::from_slice(&body)?));
    }

    Ok(Content::Text(String::from_utf8_lossy(&body).into_owned()))
}
