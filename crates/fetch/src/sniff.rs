//! Content sniffing for HTML interstitials.

use regex::Regex;
use std::sync::LazyLock;

static HTML_SIGNATURE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<(?:!doctype\s+html|html|head|body)\b").expect("valid regex")
});

/// Whether a response body looks like an HTML document rather than a node list.
pub fn looks_like_html(body: &str) -> bool {
    HTML_SIGNATURE.is_match(body)
}
