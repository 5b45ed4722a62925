//! Subscription document encoding.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// A rendered subscription body with its validator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedSubscription {
    /// Weak ETag, `W/"<hex-length>-<hex-millis>"`.
    pub etag: String,
    /// Base64 of the newline-joined URI list.
    pub content_base64: String,
}

impl RenderedSubscription {
    /// Encode a deduplicated URI list, stamping the ETag with `now`.
    pub fn render(uris: &[String], now: OffsetDateTime) -> Self {
        let content_base64 = encode_subscription(uris);
        let etag = weak_etag(&content_base64, now);
        Self {
            etag,
            content_base64,
        }
    }

    /// The decoded, newline-joined URI list.
    pub fn decoded(&self) -> crate::Result<String> {
        let bytes = STANDARD
            .decode(&self.content_base64)
            .map_err(|e| crate::Error::Serialization(format!("invalid subscription body: {e}")))?;
        String::from_utf8(bytes)
            .map_err(|e| crate::Error::Serialization(format!("subscription body is not UTF-8: {e}")))
    }
}

/// Join URIs with `\n` and base64-encode.
pub fn encode_subscription(uris: &[String]) -> String {
    STANDARD.encode(uris.join("\n"))
}

/// Length-and-time ETag. Not content-addressed: identical bodies rendered
/// at different instants get different tags.
pub fn weak_etag(content_base64: &str, now: OffsetDateTime) -> String {
    let millis = now.unix_timestamp_nanos() / 1_000_000;
    format!("W/\"{:x}-{:x}\"", content_base64.len(), millis)
}
