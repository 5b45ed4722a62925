//! URI fingerprinting for vmess, vless, trojan and shadowsocks links.

use super::{NodeFingerprint, Protocol, decode_base64_lenient};
use percent_encoding::percent_decode_str;
use serde_json::Value;
use url::Url;

/// Parse a proxy URI into its fingerprint.
///
/// Returns `None` for unknown schemes and for any URI of a known scheme
/// that cannot be decoded. Callers must treat such URIs as unique.
pub fn parse_node(uri: &str) -> Option<NodeFingerprint> {
    let uri = uri.trim();
    let fragment_name = uri.rsplit_once('#').map(|(_, name)| decode_component(name));

    if let Some(payload) = uri.strip_prefix("vmess://") {
        return parse_vmess(uri, payload, fragment_name);
    }
    if let Some(rest) = uri.strip_prefix("vless://") {
        return parse_url_style(Protocol::Vless, uri, rest, fragment_name);
    }
    if let Some(rest) = uri.strip_prefix("trojan://") {
        return parse_url_style(Protocol::Trojan, uri, rest, fragment_name);
    }
    if let Some(payload) = uri.strip_prefix("ss://") {
        return parse_shadowsocks(uri, payload, fragment_name);
    }

    tracing::trace!(uri, "no fingerprint for scheme");
    None
}

fn parse_vmess(uri: &str, payload: &str, fragment_name: Option<String>) -> Option<NodeFingerprint> {
    // A trailing `#remark` is not part of the base64 payload.
    let payload = payload.split_once('#').map_or(payload, |(payload, _)| payload);
    let decoded = decode_base64_lenient(payload)?;
    let json: Value = match serde_json::from_slice(&decoded) {
        Ok(json) => json,
        Err(e) => {
            tracing::debug!(error = %e, "vmess payload is not JSON");
            return None;
        }
    };
    let obj = json.as_object()?;

    let field = |key: &str| -> String {
        match obj.get(key) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => String::new(),
        }
    };

    let host = field("add");
    let sni = Some(field("sni"))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| field("host"));
    let name = Some(field("ps"))
        .filter(|s| !s.is_empty())
        .or(fragment_name);

    Some(NodeFingerprint {
        protocol: Protocol::Vmess,
        host,
        port: field("port"),
        id: field("id"),
        sni,
        path: field("path"),
        uri: uri.to_string(),
        name,
    })
}

/// vless and trojan share the `scheme://credential@host:port?query#name`
/// layout, so they are parsed as an http URL.
fn parse_url_style(
    protocol: Protocol,
    uri: &str,
    rest: &str,
    fragment_name: Option<String>,
) -> Option<NodeFingerprint> {
    let url = match Url::parse(&format!("http://{rest}")) {
        Ok(url) => url,
        Err(e) => {
            tracing::debug!(%protocol, error = %e, "unparseable node URI");
            return None;
        }
    };

    let mut sni = None;
    let mut path = None;
    for (key, value) in url.query_pairs() {
        match &*key {
            "sni" if sni.is_none() => sni = Some(value.into_owned()),
            "path" if path.is_none() => path = Some(value.into_owned()),
            _ => {}
        }
    }

    let name = url
        .fragment()
        .filter(|f| !f.is_empty())
        .map(decode_component)
        .or(fragment_name);

    Some(NodeFingerprint {
        protocol,
        host: url.host_str().unwrap_or_default().to_string(),
        port: url.port().map(|p| p.to_string()).unwrap_or_default(),
        id: url.username().to_string(),
        sni: sni.unwrap_or_default(),
        path: path.unwrap_or_default(),
        uri: uri.to_string(),
        name,
    })
}

/// Accepts both `ss://method:password@host:port` and the legacy
/// `ss://base64(method:password@host:port)` forms.
fn parse_shadowsocks(
    uri: &str,
    payload: &str,
    fragment_name: Option<String>,
) -> Option<NodeFingerprint> {
    let (content, fragment) = match payload.split_once('#') {
        Some((content, fragment)) => (content, Some(fragment)),
        None => (payload, None),
    };

    let content = if content.contains('@') {
        content.to_string()
    } else {
        decode_base64_lenient(content)
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            .unwrap_or_else(|| content.to_string())
    };

    let (credentials, host_port) = content.rsplit_once('@')?;
    let mut parts = host_port.split(':');
    let host = parts.next().unwrap_or_default().to_string();
    let port = parts.next().unwrap_or_default().to_string();

    let name = fragment
        .filter(|f| !f.is_empty())
        .map(decode_component)
        .or(fragment_name);

    Some(NodeFingerprint {
        protocol: Protocol::Shadowsocks,
        host,
        port,
        id: credentials.to_string(),
        sni: String::new(),
        path: String::new(),
        uri: uri.to_string(),
        name,
    })
}

fn decode_component(raw: &str) -> String {
    percent_decode_str(raw).decode_utf8_lossy().into_owned()
}
