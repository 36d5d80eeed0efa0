// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Shared test harness: data generators and an in-process extraction
//! backend stub.

#![allow(dead_code)]

pub mod generators;

use axum::{routing::post, Json, Router};
use media_intake_gateway::{
    backend::ExtractionBackend,
    config::{BackendConfig, Config, RateLimitConfig},
    gatekeeper::Gatekeeper,
    handlers::{router, AppState},
    limiter::RateLimiter,
    metrics::Metrics,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

/// Start a fake extraction backend on an ephemeral port and return its base URL.
///
/// URLs containing `private` are refused the way the real backend refuses
/// private posts, URLs containing `slow` stall for three seconds, anything
/// else yields two formats.
pub async fn spawn_stub_backend() -> String {
    let app = Router::new().route("/api/extract", post(stub_extract));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

async fn stub_extract(Json(body): Json<Value>) -> Json<Value> {
    let url = body["url"].as_str().unwrap_or_default();
    if url.contains("slow") {
        tokio::time::sleep(Duration::from_secs(3)).await;
    }
    if url.contains("private") {
        return Json(json!({
            "success": false,
            "error": "This content is private",
        }));
    }
    Json(json!({
        "success": true,
        "platform": "instagram",
        "title": "Stub media",
        "thumbnail": "https://cdn.example.com/thumb.jpg",
        "formats": [
            {
                "quality": "1080p",
                "url": "https://cdn.example.com/hd.mp4",
                "ext": "mp4",
                "filesize": 1048576
            },
            { "quality": "audio", "url": "https://cdn.example.com/a.m4a", "ext": "m4a" }
        ],
    }))
}

/// Application state with an in-memory limiter pointed at `backend_url`.
pub fn app_state(backend_url: &str, max_requests: u32, timeout_secs: u64) -> Arc<AppState> {
    let config = Config {
        rate_limit: RateLimitConfig::in_memory(max_requests, 60_000),
        backend: BackendConfig {
            base_url: backend_url.to_string(),
            timeout_secs,
        },
        ..Config::default()
    };
    let limiter = Arc::new(RateLimiter::in_memory(config.rate_limit.clone()));
    Arc::new(AppState {
        gatekeeper: Gatekeeper::new(limiter),
        backend: ExtractionBackend::new(&config.backend).unwrap(),
        metrics: Metrics::new().unwrap(),
        config,
    })
}

/// Router over [`app_state`] with a five second backend timeout.
pub fn app(backend_url: &str, max_requests: u32) -> (Router, Arc<AppState>) {
    app_with_timeout(backend_url, max_requests, 5)
}

pub fn app_with_timeout(
    backend_url: &str,
    max_requests: u32,
    timeout_secs: u64,
) -> (Router, Arc<AppState>) {
    let state = app_state(backend_url, max_requests, timeout_secs);
    (router(state.clone()), state)
}
