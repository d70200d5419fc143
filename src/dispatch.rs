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

//! Upstream Dispatcher (spec §4.6): performs the outbound request, with
//! header sanitization, body forwarding, redirect/timeout/decompression
//! policy already configured on the shared [`reqwest::Client`]
//! (see [`crate::state::AppState::new`]).

use crate::error::ProxyError;
use axum::http::{HeaderMap, HeaderValue, Method};
use bytes::Bytes;
use reqwest::Client;
use url::Url;

const DESKTOP_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/124.0.0.0 Safari/537.36";

/// The only headers forwarded verbatim from the inbound request (spec
/// §4.6): everything else, including `Host` and any `X-Forwarded-*` header,
/// is never sent upstream.
const FORWARDED_REQUEST_HEADERS: &[&str] = &["accept", "cookie", "authorization", "content-type"];

/// Perform the outbound request described by `method`/`url`, forwarding the
/// subset of inbound headers and the inbound body per spec §4.6.
///
/// Body forwarding note: regardless of the inbound `Content-Type`
/// (`application/json`, `application/x-www-form-urlencoded`,
/// `multipart/form-data`, or anything else), the original bytes and the
/// original `Content-Type` header are forwarded unchanged. This reproduces
/// exactly the wire bytes the spec's four body-forwarding cases describe
/// (re-serializing through `reqwest`'s typed `.json()`/`.form()` builders
/// would risk producing a *different* encoding of the same logical body,
/// e.g. re-ordered multipart boundaries) without needing a literal branch.
pub async fn dispatch(
    client: &Client,
    method: Method,
    url: &Url,
    inbound_headers: &HeaderMap,
    body: Bytes,
) -> Result<reqwest::Response, ProxyError> {
    let reqwest_method =
        reqwest::Method::from_bytes(method.as_str().as_bytes()).unwrap_or(reqwest::Method::GET);

    let mut headers = reqwest::header::HeaderMap::new();
    headers.insert(
        reqwest::header::USER_AGENT,
        HeaderValue::from_static(DESKTOP_USER_AGENT),
    );
    headers.insert(
        reqwest::header::ACCEPT_LANGUAGE,
        HeaderValue::from_static("en-US,en;q=0.9"),
    );
    headers.insert(
        reqwest::header::ACCEPT_ENCODING,
        HeaderValue::from_static("gzip, deflate, br"),
    );

    // Only this explicit allowlist is forwarded (spec §4.6): everything else
    // from the inbound request — including the client's own `Accept-Encoding`,
    // which must never override the fixed value set above — is dropped.
    for &name in FORWARDED_REQUEST_HEADERS {
        if let Some(value) = inbound_headers.get(name) {
            if let Ok(name) = reqwest::header::HeaderName::from_bytes(name.as_bytes()) {
                headers.insert(name, value_to_reqwest(value));
            }
        }
    }

    // Defeat referrer checks by presenting the upstream's own origin.
    let origin = format!("{}://{}", url.scheme(), url.authority());
    if let Ok(origin_value) = HeaderValue::from_str(&origin) {
        headers.insert(reqwest::header::ORIGIN, value_to_reqwest(&origin_value));
    }
    if let Ok(referer_value) = HeaderValue::from_str(&format!("{origin}/")) {
        headers.insert(reqwest::header::REFERER, value_to_reqwest(&referer_value));
    }

    let request = client
        .request(reqwest_method, url.as_str())
        .headers(headers)
        .body(body.to_vec());

    request.send().await.map_err(ProxyError::from)
}

fn value_to_reqwest(value: &HeaderValue) -> reqwest::header::HeaderValue {
    reqwest::header::HeaderValue::from_bytes(value.as_bytes())
        .unwrap_or_else(|_| reqwest::header::HeaderValue::from_static(""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allowlist_excludes_host_and_forwarded_headers() {
        assert!(!FORWARDED_REQUEST_HEADERS.contains(&"host"));
        assert!(!FORWARDED_REQUEST_HEADERS.contains(&"x-forwarded-proto"));
        assert!(!FORWARDED_REQUEST_HEADERS.contains(&"x-forwarded-for"));
        assert!(FORWARDED_REQUEST_HEADERS.contains(&"accept"));
    }
}
