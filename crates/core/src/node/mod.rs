//! Proxy node parsing, extraction and deduplication.
//!
//! The pipeline is pure: nothing here performs I/O. Content from upstreams
//! and static entries is split into URIs by [`extract_nodes`], tagged with
//! a priority as [`NodeCandidate`]s, and merged by [`deduplicate_nodes`].

mod dedup;
mod extract;
mod informational;
mod parser;

pub use dedup::deduplicate_nodes;
pub use extract::{NODE_SCHEMES, contains_node_scheme, extract_nodes};
pub use informational::is_informational_node;
pub use parser::parse_node;

use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Protocols that can be fingerprinted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Vmess,
    Vless,
    Trojan,
    #[serde(rename = "ss")]
    Shadowsocks,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vmess => "vmess",
            Self::Vless => "vless",
            Self::Trojan => "trojan",
            Self::Shadowsocks => "ss",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized identity of a proxy endpoint.
///
/// Two URIs that describe the same endpoint produce the same [`key`](Self::key)
/// even if their display names or parameter order differ.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NodeFingerprint {
    pub protocol: Protocol,
    pub host: String,
    pub port: String,
    /// UUID, password, or `method:password` material.
    pub id: String,
    pub sni: String,
    pub path: String,
    /// The trimmed source URI.
    pub uri: String,
    pub name: Option<String>,
}

impl NodeFingerprint {
    /// Case-insensitive identity key `protocol|host|port|id|path|sni`.
    pub fn key(&self) -> String {
        format!(
            "{}|{}|{}|{}|{}|{}",
            self.protocol, self.host, self.port, self.id, self.path, self.sni
        )
        .to_lowercase()
    }
}

/// A URI waiting to be merged, with the priority of the source it came from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeCandidate {
    pub uri: String,
    /// Higher wins on fingerprint collisions.
    pub priority: i32,
    /// Human-readable origin, e.g. `"User Upstream: provider"`.
    pub source: String,
}

impl NodeCandidate {
    pub fn new(uri: impl Into<String>, priority: i32, source: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            priority,
            source: source.into(),
        }
    }
}

const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// Decode base64 the way subscription providers emit it: either alphabet,
/// padding optional, whitespace and line wraps ignored.
pub(crate) fn decode_base64_lenient(input: &str) -> Option<Vec<u8>> {
    let mut normalized: String = input
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '=')
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            other => other,
        })
        .collect();

    // A single dangling symbol carries no whole byte.
    if normalized.len() % 4 == 1 {
        normalized.pop();
    }
    if normalized.is_empty() {
        return None;
    }

    LENIENT_BASE64.decode(normalized.as_bytes()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lenient_decode_accepts_url_safe_and_unpadded() {
        let encoded = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(b"\xfb\xff?>ab");
        assert_eq!(
            decode_base64_lenient(&encoded).unwrap(),
            b"\xfb\xff?>ab".to_vec()
        );
    }

    #[test]
    fn test_lenient_decode_ignores_line_wraps() {
        let encoded = base64::engine::general_purpose::STANDARD.encode("vmess://abc\nss://def");
        let (a, b) = encoded.split_at(8);
        let wrapped = format!("{a}\r\n{b}\n");
        assert_eq!(
            decode_base64_lenient(&wrapped).unwrap(),
            b"vmess://abc\nss://def".to_vec()
        );
    }

    #[test]
    fn test_lenient_decode_rejects_garbage() {
        assert!(decode_base64_lenient("not base64 at all!").is_none());
        assert!(decode_base64_lenient("").is_none());
    }

    #[test]
    fn test_fingerprint_key_is_lowercase() {
        let fp = NodeFingerprint {
            protocol: Protocol::Trojan,
            host: "Example.COM".to_string(),
            port: "443".to_string(),
            id: "Secret".to_string(),
            sni: "SNI.example.com".to_string(),
            path: "/WS".to_string(),
            uri: "trojan://Secret@Example.COM:443".to_string(),
            name: None,
        };
        assert_eq!(
            fp.key(),
            "trojan|example.com|443|secret|/ws|sni.example.com"
        );
    }
}
