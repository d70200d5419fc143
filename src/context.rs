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

use axum::http::HeaderMap;
use url::Url;

/// The scheme + authority of the proxy itself, as seen by the client.
///
/// Every proxy-local URL emitted into response content embeds this base
/// (spec §3's "Rewrite context" invariant).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyBase(String);

impl ProxyBase {
    /// Derive the proxy's public origin from the incoming request.
    ///
    /// Priority: `X-Forwarded-Proto`/`X-Forwarded-Host` (spec §6), then the
    /// plain `Host` header, then a `localhost` fallback. Unlike the
    /// single-site teacher, there is no `BASE_URL` override — this proxy
    /// serves arbitrary upstream origins, so the base is always derived
    /// per-request.
    pub fn from_headers(headers: &HeaderMap, default_port: u16) -> Self {
        let scheme = headers
            .get("x-forwarded-proto")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(',').next().unwrap_or(v).trim().to_string())
            .unwrap_or_else(|| "http".to_string());

        let host = headers
            .get("x-forwarded-host")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(',').next().unwrap_or(v).trim().to_string())
            .or_else(|| {
                headers
                    .get("host")
                    .and_then(|v| v.to_str().ok())
                    .map(|v| v.to_string())
            })
            .unwrap_or_else(|| format!("localhost:{default_port}"));

        ProxyBase(format!("{scheme}://{host}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProxyBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Everything the rewriters need to resolve relative references and emit
/// proxy-local URLs for a single request.
#[derive(Debug, Clone)]
pub struct RewriteContext {
    /// The absolute upstream URL being fetched; the base for resolving
    /// relative references (spec §3).
    pub upstream: Url,
    /// The proxy's own origin, embedded in every rewritten URL.
    pub proxy_base: ProxyBase,
}

impl RewriteContext {
    pub fn new(upstream: Url, proxy_base: ProxyBase) -> Self {
        Self {
            upstream,
            proxy_base,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn prefers_forwarded_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("host", HeaderValue::from_static("internal:9999"));
        headers.insert("x-forwarded-proto", HeaderValue::from_static("https"));
        headers.insert("x-forwarded-host", HeaderValue::from_static("proxy.example"));

        let base = ProxyBase::from_headers(&headers, 3001);
        assert_eq!(base.as_str(), "https://proxy.example");
    }

    #[test]
    fn falls_back_to_host() {
        let mut headers = HeaderMap::new();
        headers.insert("host", HeaderValue::from_static("p.local:3001"));

        let base = ProxyBase::from_headers(&headers, 3001);
        assert_eq!(base.as_str(), "http://p.local:3001");
    }

    #[test]
    fn falls_back_to_localhost() {
        let headers = HeaderMap::new();
        let base = ProxyBase::from_headers(&headers, 3001);
        assert_eq!(base.as_str(), "http://localhost:3001");
    }
}
