//! Minimal SSRF guard applied before every request.
//!
//! Only http(s) is allowed, and the obvious loopback/private targets are
//! refused. This is not exhaustive: `172.16.0.0/12` and IPv6 unique-local
//! ranges pass.

use crate::error::{FetchError, FetchResult};
use url::Url;

/// Parse `raw` and refuse unsafe targets.
pub fn check_url(raw: &str, allow_private_hosts: bool) -> FetchResult<Url> {
    let url = Url::parse(raw.trim()).map_err(|e| FetchError::InvalidUrl(format!("{raw}: {e}")))?;
    check_parsed(&url, allow_private_hosts)?;
    Ok(url)
}

/// Check an already parsed URL, e.g. a redirect target.
pub fn check_parsed(url: &Url, allow_private_hosts: bool) -> FetchResult<()> {
    if !matches!(url.scheme(), "http" | "https") {
        return Err(FetchError::UnsafeUrl(url.to_string()));
    }

    let host = url
        .host_str()
        .ok_or_else(|| FetchError::UnsafeUrl(url.to_string()))?;

    if !allow_private_hosts && is_private_host(host) {
        return Err(FetchError::UnsafeUrl(url.to_string()));
    }

    Ok(())
}

fn is_private_host(host: &str) -> bool {
    let host = host
        .trim_start_matches('[')
        .trim_end_matches(']')
        .to_ascii_lowercase();

    host == "localhost"
        || host == "127.0.0.1"
        || host == "::1"
        || host.starts_with("192.168.")
        || host.starts_with("10.")
}
