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

use crate::context::{ProxyBase, RewriteContext};
use crate::dispatch;
use crate::error::ProxyError;
use crate::pipeline;
use crate::resolve;
use crate::state::AppState;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;

/// `GET /` — informational JSON, per spec §6.
pub async fn root_handler() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "message": "browsing proxy",
        "usage": "GET /proxy?url=<absolute URL> or GET /proxy/<scheme>/<authority>/<path>",
    }))
}

/// `GET /health` — liveness probe, per spec §6.
pub async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// `/proxy` and `/proxy/*` — the explicit proxy API. A missing target is a
/// usage error against this API, so it reports the `400` JSON body of
/// [`ProxyError::MissingTarget`].
pub async fn proxy_handler(State(state): State<AppState>, req: Request) -> Response {
    handle(state, req, false).await
}

/// `/*path` — the bare-path catch-all (spec §6). A request here only
/// resolves if its `Referer` recovers a proxy-local origin; otherwise the
/// spec calls for a plain `404`, not the `/proxy` API's `400` usage error.
pub async fn wildcard_handler(State(state): State<AppState>, req: Request) -> Response {
    handle(state, req, true).await
}

/// Resolves the upstream target (path form, query form, or `Referer`
/// fallback — spec §4.1/§6), dispatches the outbound request (§4.6), and
/// runs the response pipeline (§4.7). `bare` distinguishes the catch-all
/// route from the explicit `/proxy` API for `MissingTarget` reporting.
async fn handle(state: AppState, req: Request, bare: bool) -> Response {
    let path_and_query = req
        .uri()
        .path_and_query()
        .map(|v| v.as_str())
        .unwrap_or("/")
        .to_string();

    let headers = req.headers().clone();
    let method = req.method().clone();

    let upstream_url = match resolve::resolve_target(&path_and_query, &headers) {
        Ok(url) => url,
        Err(ProxyError::MissingTarget) if bare => return StatusCode::NOT_FOUND.into_response(),
        Err(err) => return err.into_response(),
    };

    tracing::info!("proxying {} {} -> {}", method, path_and_query, upstream_url);

    let proxy_base = ProxyBase::from_headers(&headers, state.config.port);
    let ctx = RewriteContext::new(upstream_url.clone(), proxy_base);

    let body_bytes = match axum::body::to_bytes(req.into_body(), usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!("failed to read request body: {}", e);
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    match dispatch::dispatch(&state.client, method, &upstream_url, &headers, body_bytes).await {
        Ok(upstream_response) => pipeline::build_response(upstream_response, &ctx).await,
        Err(err) => {
            tracing::error!("upstream dispatch failed for {}: {}", upstream_url, err);
            err.into_response()
        }
    }
}
