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

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// The error taxonomy of the proxy's external interface.
///
/// Rewrite failures are *not* part of this enum: per the response pipeline,
/// a parse/rewrite error is always recovered locally by falling back to the
/// original bytes, so it never becomes a client-visible error.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// No target URL was present in the query, path, or `Referer`.
    #[error("no target URL in request")]
    MissingTarget,

    /// A candidate target string did not parse as an absolute URL.
    #[error("invalid target URL: {0}")]
    InvalidURL(String),

    /// DNS resolution for the upstream host failed.
    #[error("upstream host unreachable")]
    UpstreamUnreachable,

    /// The upstream fetch exceeded the configured timeout.
    #[error("upstream request timed out")]
    UpstreamTimeout,

    /// Some other network failure occurred while talking to upstream.
    #[error("upstream transport error: {0}")]
    UpstreamTransport(String),

    /// An unexpected internal failure.
    #[error("internal error: {0}")]
    InternalError(String),
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        match self {
            ProxyError::MissingTarget => (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "error": "missing target URL",
                    "usage": "GET /proxy?url=<absolute URL> or GET /proxy/<scheme>/<authority>/<path>",
                })),
            )
                .into_response(),
            ProxyError::InvalidURL(provided) => (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "error": "invalid target URL",
                    "provided": provided,
                })),
            )
                .into_response(),
            ProxyError::UpstreamUnreachable => (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": "upstream host unreachable" })),
            )
                .into_response(),
            ProxyError::UpstreamTimeout => (
                StatusCode::GATEWAY_TIMEOUT,
                Json(json!({ "error": "upstream request timed out" })),
            )
                .into_response(),
            ProxyError::UpstreamTransport(message) => (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "error": "upstream transport error", "message": message })),
            )
                .into_response(),
            ProxyError::InternalError(message) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "internal error", "message": message })),
            )
                .into_response(),
        }
    }
}

/// Classify a `reqwest::Error` from a dispatch attempt per §4.6/§7.
impl From<reqwest::Error> for ProxyError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProxyError::UpstreamTimeout
        } else if err.is_connect() {
            // reqwest doesn't expose DNS failures distinctly from other
            // connect failures; treat connect-phase failures as the
            // "unreachable" case per spec §4.6's DNS-failure mapping.
            ProxyError::UpstreamUnreachable
        } else {
            ProxyError::UpstreamTransport(err.to_string())
        }
    }
}
