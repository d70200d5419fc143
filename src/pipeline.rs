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

//! Response Pipeline (spec §4.7): copies status, filters headers, forwards
//! cookies, stamps the permissive headers the proxy always sets, and
//! branches on content type to invoke the HTML/CSS rewriters.

use crate::charset;
use crate::context::RewriteContext;
use crate::rewrite;
use axum::body::Body;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

/// Response headers that are never forwarded to the client (spec §3, §4.7).
const BLOCKED_RESPONSE_HEADERS: &[&str] = &[
    "content-security-policy",
    "x-frame-options",
    "content-encoding",
    "transfer-encoding",
    "referrer-policy",
    "content-length",
];

pub async fn build_response(upstream: reqwest::Response, ctx: &RewriteContext) -> Response {
    let status = upstream.status();
    let upstream_headers = upstream.headers().clone();
    let set_cookies: Vec<HeaderValue> = upstream
        .headers()
        .get_all(reqwest::header::SET_COOKIE)
        .iter()
        .cloned()
        .collect();

    let content_type = upstream_headers
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    let body_bytes = match upstream.bytes().await {
        Ok(bytes) => bytes,
        Err(_) => {
            return StatusCode::BAD_GATEWAY.into_response();
        }
    };

    let (final_body, final_content_type) = render_body(&content_type, &body_bytes, ctx);

    let mut response_headers = HeaderMap::new();
    for (name, value) in upstream_headers.iter() {
        if name == reqwest::header::SET_COOKIE {
            continue;
        }
        if BLOCKED_RESPONSE_HEADERS.contains(&name.as_str()) {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_str().as_bytes()),
            HeaderValue::from_bytes(value.as_bytes()),
        ) {
            response_headers.append(name, value);
        }
    }

    for cookie in set_cookies {
        if let Ok(value) = HeaderValue::from_bytes(cookie.as_bytes()) {
            response_headers.append(axum::http::header::SET_COOKIE, value);
        }
    }

    response_headers.insert(
        HeaderName::from_static("access-control-allow-origin"),
        HeaderValue::from_static("*"),
    );
    response_headers.insert(
        HeaderName::from_static("x-frame-options"),
        HeaderValue::from_static("ALLOWALL"),
    );
    response_headers.insert(
        HeaderName::from_static("referrer-policy"),
        HeaderValue::from_static("unsafe-url"),
    );
    response_headers.insert(
        axum::http::header::CONTENT_TYPE,
        HeaderValue::from_str(&final_content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );

    let mut response = Response::new(Body::from(final_body));
    *response.status_mut() = status;
    *response.headers_mut() = response_headers;
    response
}

/// Decide content type, invoke the appropriate rewriter, and degrade
/// gracefully on rewrite failure (spec §4.7 step 5-6).
fn render_body(content_type: &str, body: &bytes::Bytes, ctx: &RewriteContext) -> (Vec<u8>, String) {
    let lower = content_type.to_ascii_lowercase();

    if lower.contains("text/html") {
        let is_html = true;
        let text = charset::decode(Some(content_type), is_html, body);
        let rewritten = rewrite::html::rewrite_html(&text, ctx);
        return (rewritten.into_bytes(), "text/html; charset=utf-8".to_string());
    }

    if lower.contains("text/css") {
        let text = charset::decode(Some(content_type), false, body);
        let rewritten = rewrite::css::rewrite_css(&text, ctx);
        return (rewritten.into_bytes(), "text/css; charset=utf-8".to_string());
    }

    if lower.contains("javascript") || lower.contains("json") {
        return (body.to_vec(), content_type_or_default(content_type));
    }

    (body.to_vec(), content_type_or_default(content_type))
}

fn content_type_or_default(content_type: &str) -> String {
    if content_type.is_empty() {
        "application/octet-stream".to_string()
    } else {
        content_type.to_string()
    }
}
