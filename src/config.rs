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

use std::env;

/// Configuration for the proxy server.
#[derive(Debug, Clone)]
pub struct Config {
    /// The port to listen on.
    pub port: u16,
    /// Hard timeout for a single upstream fetch, in seconds.
    pub request_timeout_secs: u64,
    /// Maximum number of redirects the dispatcher follows automatically.
    pub max_redirects: usize,
}

impl Config {
    /// # Environment Variables
    /// * `PORT` - Port to listen on (default: 3001).
    /// * `REQUEST_TIMEOUT_SECS` - Upstream fetch timeout in seconds (default: 30).
    /// * `MAX_REDIRECTS` - Maximum automatic redirects to follow (default: 5).
    pub fn from_env() -> Self {
        let port = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3001);

        let request_timeout_secs = env::var("REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30);

        let max_redirects = env::var("MAX_REDIRECTS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(5);

        Self {
            port,
            request_timeout_secs,
            max_redirects,
        }
    }
}
