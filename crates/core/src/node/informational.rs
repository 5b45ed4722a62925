//! Detection of marker entries that carry account metadata instead of a usable endpoint.

use regex::Regex;
use std::sync::LazyLock;
use url::Url;

/// SNI value providers use for usage/expiry marker nodes.
const MARKER_SNI: &str = "fake_ip_for_sub_link";

/// Hosts of the form `HH.MM--YYYY.MM.DD.time`.
static TIME_HOST_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"--\d{4}\.\d{2}\.\d{2}\.time$").expect("valid regex"));

/// Whether a vless/trojan URI is an informational marker node.
///
/// Other schemes are never informational. The result only affects output
/// ordering, never whether the node is kept.
pub fn is_informational_node(uri: &str) -> bool {
    let trimmed = uri.trim();
    let Some(rest) = trimmed
        .strip_prefix("vless://")
        .or_else(|| trimmed.strip_prefix("trojan://"))
    else {
        return false;
    };

    let Ok(url) = Url::parse(&format!("http://{rest}")) else {
        return false;
    };

    let sni_is_marker = url
        .query_pairs()
        .find(|(key, _)| *key == "sni")
        .is_some_and(|(_, value)| value.to_lowercase() == MARKER_SNI);
    if sni_is_marker {
        return true;
    }

    let host = url.host_str().unwrap_or_default().to_lowercase();
    TIME_HOST_PATTERN.is_match(&host)
}
