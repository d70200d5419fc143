/*
 * Copyright (C) 2025 Jakub Žitník
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 */

//! URL Codec (spec §4.1): encode an absolute upstream URL into a
//! proxy-local URL, and decode the various proxy-local forms back into an
//! absolute upstream URL.

use crate::context::ProxyBase;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use url::Url;

/// Prefixes that are never rewritten: the browser/JS runtime handles them
/// natively and routing them through the proxy would be meaningless or
/// actively harmful (e.g. `javascript:`).
const SHORT_CIRCUIT_PREFIXES: &[&str] = &[
    "data:",
    "javascript:",
    "mailto:",
    "tel:",
    "blob:",
    "about:",
];

fn is_short_circuit(raw: &str) -> bool {
    let lower = raw.trim().to_ascii_lowercase();
    lower.is_empty() || lower == "#" || SHORT_CIRCUIT_PREFIXES.iter().any(|p| lower.starts_with(p))
}

/// Resolve a possibly-relative reference against the current upstream URL.
///
/// Protocol-relative references (`//host/path`) are promoted to `https`.
/// Anything that fails to resolve is returned unchanged (opaque passthrough
/// per §4.3's error-recovery rule).
pub fn resolve(raw: &str, base: &Url) -> String {
    let trimmed = raw.trim();

    if let Some(rest) = trimmed.strip_prefix("//") {
        return format!("https://{rest}");
    }

    match base.join(trimmed) {
        Ok(resolved) => resolved.to_string(),
        Err(_) => trimmed.to_string(),
    }
}

/// Characters that must be percent-encoded inside the `url=` query value.
const QUERY_ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'<')
    .add(b'>')
    .add(b'`')
    .add(b'#')
    .add(b'?')
    .add(b'&');

/// Encode an already-absolute (or passthrough) reference into a proxy-local
/// URL, per spec §4.1.
///
/// Short-circuit schemes, the empty string, and `"#"` are returned
/// unchanged. Strings that fail to parse as absolute URLs are also returned
/// unchanged (opaque passthrough) rather than causing an error — rewriting
/// is always best-effort.
pub fn encode(abs: &str, proxy_base: &ProxyBase) -> String {
    if is_short_circuit(abs) {
        return abs.to_string();
    }

    let normalized = if let Some(rest) = abs.strip_prefix("//") {
        format!("https://{rest}")
    } else {
        abs.to_string()
    };

    let parsed = match Url::parse(&normalized) {
        Ok(u) if u.scheme() == "http" || u.scheme() == "https" => u,
        _ => return abs.to_string(),
    };

    path_form(&parsed, proxy_base)
}

/// Encode a reference that may still be relative: resolve it against `base`
/// and then encode the result. This is the combination HTML/CSS rewriters
/// actually call (`encode(resolve(attr, base), proxyBase)` in spec prose).
pub fn rewrite_reference(raw: &str, base: &Url, proxy_base: &ProxyBase) -> String {
    if is_short_circuit(raw) {
        return raw.to_string();
    }
    encode(&resolve(raw, base), proxy_base)
}

fn path_form(url: &Url, proxy_base: &ProxyBase) -> String {
    let scheme = url.scheme();
    let host = url.host_str().unwrap_or("");
    let port = url.port().map(|p| format!(":{p}")).unwrap_or_default();
    let path = url.path();
    let query = url.query().map(|q| format!("?{q}")).unwrap_or_default();
    let fragment = url.fragment().map(|f| format!("#{f}")).unwrap_or_default();

    format!(
        "{}/proxy/{}/{}{}{}{}{}",
        proxy_base.as_str(),
        scheme,
        host,
        port,
        path,
        query,
        fragment
    )
}

/// Also expose a query-form encoder, used when a variant of the client
/// deliberately prefers it (e.g. the client shim falls back to it for
/// references it cannot otherwise disambiguate). Preferred form is still
/// the path form (see §4.1).
pub fn encode_query_form(abs: &str, proxy_base: &ProxyBase) -> String {
    if is_short_circuit(abs) {
        return abs.to_string();
    }
    let encoded = utf8_percent_encode(abs, QUERY_ENCODE_SET).to_string();
    format!("{}/proxy?url={}", proxy_base.as_str(), encoded)
}

/// Split `/proxy/<scheme>/<authority>[<rest>]` into `(scheme, authority,
/// rest)`. `raw` is everything after the literal `/proxy/` prefix.
fn split_proxy_path(raw: &str) -> Option<(&str, &str, &str)> {
    let mut parts = raw.splitn(2, '/');
    let scheme = parts.next()?;
    if scheme != "http" && scheme != "https" {
        return None;
    }
    let remainder = parts.next().unwrap_or("");
    let split_at = remainder
        .find(['/', '?', '#'])
        .unwrap_or(remainder.len());
    let (authority, rest) = remainder.split_at(split_at);
    if authority.is_empty() {
        return None;
    }
    Some((scheme, authority, rest))
}

/// Decode the path form of a proxy-local URL (§4.1, §3): `raw_path_and_query`
/// is the request-line path+query *verbatim*, so that idiosyncratic
/// encoding in the original request is preserved exactly.
pub fn decode_path_form(raw_path_and_query: &str) -> Option<String> {
    let raw = raw_path_and_query.strip_prefix("/proxy/")?;
    let (scheme, authority, rest) = split_proxy_path(raw)?;
    let rest = if rest.is_empty() || rest.starts_with('?') || rest.starts_with('#') {
        format!("/{rest}")
    } else {
        rest.to_string()
    };
    Some(format!("{scheme}://{authority}{rest}"))
}

/// Decode the query form of a proxy-local URL: extract and percent-decode
/// the `url=` parameter. Tolerant of input that is already decoded (a
/// decode that still fails to parse as a URL is handled by the caller, not
/// here — this only extracts the raw candidate string).
pub fn decode_query_form(query: &str) -> Option<String> {
    for pair in query.split('&') {
        if let Some(val) = pair.strip_prefix("url=") {
            if let Ok(decoded) = percent_decode_str(val).decode_utf8() {
                return Some(decoded.into_owned());
            }
            return Some(val.to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base(scheme_authority: &str) -> ProxyBase {
        // ProxyBase has no public constructor from a literal; build it via
        // from_headers with an explicit Host header for test convenience.
        use axum::http::{HeaderMap, HeaderValue};
        let mut headers = HeaderMap::new();
        let (scheme, host) = scheme_authority.split_once("://").unwrap();
        headers.insert("x-forwarded-proto", HeaderValue::from_str(scheme).unwrap());
        headers.insert("x-forwarded-host", HeaderValue::from_str(host).unwrap());
        ProxyBase::from_headers(&headers, 3001)
    }

    #[test]
    fn encodes_absolute_url_to_path_form() {
        let proxy = base("http://p");
        let encoded = encode("https://example.com/a", &proxy);
        assert_eq!(encoded, "http://p/proxy/https/example.com/a");
    }

    #[test]
    fn roundtrips_through_path_form() {
        let proxy = base("http://p");
        let original = "https://example.com/page?q=1%202#frag";
        let encoded = encode(original, &proxy);
        let path_and_query = encoded.strip_prefix("http://p").unwrap();
        let decoded = decode_path_form(path_and_query).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn short_circuit_schemes_pass_through() {
        let proxy = base("http://p");
        assert_eq!(encode("javascript:void(0)", &proxy), "javascript:void(0)");
        assert_eq!(encode("data:text/plain,hi", &proxy), "data:text/plain,hi");
        assert_eq!(encode("mailto:a@b.com", &proxy), "mailto:a@b.com");
        assert_eq!(encode("#", &proxy), "#");
        assert_eq!(encode("", &proxy), "");
    }

    #[test]
    fn unparseable_input_preserved_verbatim() {
        let proxy = base("http://p");
        assert_eq!(encode("not a url", &proxy), "not a url");
    }

    #[test]
    fn protocol_relative_promoted_to_https() {
        let proxy = base("http://p");
        let encoded = encode("//cdn.example.com/lib.js", &proxy);
        assert_eq!(encoded, "http://p/proxy/https/cdn.example.com/lib.js");
    }

    #[test]
    fn rewrite_reference_resolves_relative_paths() {
        let proxy = base("http://p");
        let base_url = Url::parse("https://example.com/dir/page").unwrap();
        let rewritten = rewrite_reference("../a", &base_url, &proxy);
        assert_eq!(rewritten, "http://p/proxy/https/example.com/a");
    }

    #[test]
    fn decode_path_form_preserves_raw_query() {
        let decoded = decode_path_form("/proxy/https/example.com/page?q=1%202").unwrap();
        assert_eq!(decoded, "https://example.com/page?q=1%202");
    }

    #[test]
    fn decode_path_form_defaults_to_root_path() {
        let decoded = decode_path_form("/proxy/https/example.com").unwrap();
        assert_eq!(decoded, "https://example.com/");
    }

    #[test]
    fn decode_path_form_with_query_but_no_path() {
        let decoded = decode_path_form("/proxy/https/example.com?x=1").unwrap();
        assert_eq!(decoded, "https://example.com/?x=1");
    }

    #[test]
    fn decode_path_form_rejects_non_proxy_paths() {
        assert_eq!(decode_path_form("/other/path"), None);
    }

    #[test]
    fn decode_query_form_extracts_url_param() {
        let decoded = decode_query_form("url=https%3A%2F%2Fexample.com%2F").unwrap();
        assert_eq!(decoded, "https://example.com/");
    }
}
