//! Splitting raw subscription content into node URIs.

use super::decode_base64_lenient;

/// URI schemes recognized as proxy nodes.
pub const NODE_SCHEMES: [&str; 5] = ["vmess://", "vless://", "trojan://", "ss://", "ssr://"];

/// Whether `text` mentions any recognized node scheme.
pub fn contains_node_scheme(text: &str) -> bool {
    NODE_SCHEMES.iter().any(|scheme| text.contains(scheme))
}

/// Extract node URIs from a plain newline-delimited list or a base64 blob.
///
/// Undecodable content is not an error: it simply yields no nodes.
pub fn extract_nodes(content: &str) -> Vec<String> {
    let trimmed = content.trim();

    let decoded;
    let text = if contains_node_scheme(trimmed) {
        trimmed
    } else {
        decoded = decode_base64_lenient(trimmed)
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            .filter(|text| contains_node_scheme(text));
        decoded.as_deref().unwrap_or(trimmed)
    };

    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| NODE_SCHEMES.iter().any(|scheme| line.starts_with(scheme)))
        .map(str::to_string)
        .collect()
}
