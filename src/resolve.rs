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

//! Request Resolver (spec §4.1 decode / §6): maps an incoming request to an
//! absolute upstream URL via the path form, the query form, or a `Referer`
//! fallback.

use crate::codec;
use crate::error::ProxyError;
use axum::http::HeaderMap;
use url::Url;

/// Resolve the upstream URL for an incoming request.
///
/// `path_and_query` must be the raw request-line path+query (byte-exact,
/// not re-encoded) so that the path form's round-trip invariant holds.
pub fn resolve_target(path_and_query: &str, headers: &HeaderMap) -> Result<Url, ProxyError> {
    if let Some(candidate) = codec::decode_path_form(path_and_query) {
        return parse_candidate(&candidate);
    }

    if let Some(query) = path_and_query.split_once('?').map(|(_, q)| q) {
        if let Some(candidate) = codec::decode_query_form(query) {
            return parse_candidate(&candidate);
        }
    }

    if let Some(referer) = headers.get("referer").and_then(|v| v.to_str().ok()) {
        if let Some(base) = referer_base(referer) {
            return splice_onto_referer(&base, path_and_query);
        }
    }

    Err(ProxyError::MissingTarget)
}

fn parse_candidate(candidate: &str) -> Result<Url, ProxyError> {
    Url::parse(candidate).map_err(|_| ProxyError::InvalidURL(candidate.to_string()))
}

/// Recover the upstream scheme+authority a `Referer` header implies, if the
/// `Referer` is itself a proxy-local URL (path or query form).
fn referer_base(referer: &str) -> Option<Url> {
    let referer_url = Url::parse(referer).ok()?;
    let path_and_query = match referer_url.query() {
        Some(q) => format!("{}?{}", referer_url.path(), q),
        None => referer_url.path().to_string(),
    };

    if let Some(candidate) = codec::decode_path_form(&path_and_query) {
        return Url::parse(&candidate).ok();
    }
    if let Some(query) = referer_url.query() {
        if let Some(candidate) = codec::decode_query_form(query) {
            return Url::parse(&candidate).ok();
        }
    }
    None
}

/// Splice the current request's path+query onto the scheme+authority of a
/// `Referer`-recovered base URL.
///
/// This is the heuristic recovery mechanism of spec §3/§9: it is a known
/// hazard (a bare request path can collide with a legitimate proxy route)
/// and the spec explicitly inherits it rather than asking implementers to
/// fix it.
fn splice_onto_referer(base: &Url, path_and_query: &str) -> Result<Url, ProxyError> {
    let spliced = format!(
        "{}://{}{}",
        base.scheme(),
        base.authority(),
        path_and_query
    );
    parse_candidate(&spliced)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn resolves_path_form() {
        let headers = HeaderMap::new();
        let url = resolve_target("/proxy/https/example.com/page?q=1%202", &headers).unwrap();
        assert_eq!(url.as_str(), "https://example.com/page?q=1%202");
    }

    #[test]
    fn resolves_query_form() {
        let headers = HeaderMap::new();
        let url = resolve_target(
            "/proxy?url=https%3A%2F%2Fexample.com%2F",
            &headers,
        )
        .unwrap();
        assert_eq!(url.as_str(), "https://example.com/");
    }

    #[test]
    fn falls_back_to_referer() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "referer",
            HeaderValue::from_static("http://p/proxy/https/example.com/page"),
        );
        let url = resolve_target("/css/site.css", &headers).unwrap();
        assert_eq!(url.as_str(), "https://example.com/css/site.css");
    }

    #[test]
    fn falls_back_to_referer_query_form() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "referer",
            HeaderValue::from_static("http://p/proxy?url=https%3A%2F%2Fexample.com%2Fpage"),
        );
        let url = resolve_target("/asset.js", &headers).unwrap();
        assert_eq!(url.as_str(), "https://example.com/asset.js");
    }

    #[test]
    fn missing_target_without_referer() {
        let headers = HeaderMap::new();
        let err = resolve_target("/favicon.ico", &headers).unwrap_err();
        assert!(matches!(err, ProxyError::MissingTarget));
    }

    #[test]
    fn invalid_target_rejected() {
        let headers = HeaderMap::new();
        let err = resolve_target("/proxy?url=not-a-url", &headers).unwrap_err();
        assert!(matches!(err, ProxyError::InvalidURL(_)));
    }
}
