// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! HTTP handlers for the intake gateway.
//!
//! `POST /api/download` runs the full pipeline: size check, JSON parse,
//! gatekeeper (rate limit + validation), sanitizer, extraction backend.

use crate::backend::{ExtractionBackend, MediaResult};
use crate::config::Config;
use crate::error::{ApiError, BackendError, ErrorResponse, SanitizeError};
use crate::gatekeeper::{GateDecision, Gatekeeper, RequestMeta};
use crate::metrics::{Metrics, Outcome};
use crate::platform::Platform;
use crate::sanitizer;
use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, DefaultBodyLimit, Request, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

/// Shared application state.
pub struct AppState {
    pub gatekeeper: Gatekeeper,
    pub backend: ExtractionBackend,
    pub metrics: Metrics,
    pub config: Config,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub persistent_rate_limits: bool,
}

/// Successful intake response.
#[derive(Debug, Serialize)]
pub struct IntakeResponse {
    pub success: bool,
    pub platform: Platform,
    pub results: Vec<MediaResult>,
}

/// Build the service router.
pub fn router(state: Arc<AppState>) -> Router {
    let mut app = Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route("/api/download", post(download))
        .layer(DefaultBodyLimit::max(state.config.max_body_bytes))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            reject_oversized,
        ));

    if state.config.metrics.enabled {
        app = app.route(&state.config.metrics.path, get(metrics));
    }

    let origins: Vec<HeaderValue> = state
        .config
        .allowed_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    app.layer(CatchPanicLayer::custom(panic_response))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "media-intake-gateway",
        version: env!("CARGO_PKG_VERSION"),
        persistent_rate_limits: state.gatekeeper.limiter().is_persistent(),
    })
}

/// Prometheus exposition endpoint.
pub async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    match state.metrics.render() {
        Ok(text) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(e) => ApiError::internal(e).into_response(),
    }
}

/// Answer a handler panic with the opaque 500; the payload only reaches the log.
fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response {
    let detail = payload
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| payload.downcast_ref::<&str>().copied())
        .unwrap_or("non-string panic payload");
    ApiError::internal(format!("handler panicked: {detail}")).into_response()
}

/// Refuse bodies whose declared length exceeds the limit before reading them.
async fn reject_oversized(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let declared = request
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<usize>().ok());

    if let Some(len) = declared {
        if len > state.config.max_body_bytes {
            debug!(len, "Declared body too large");
            state.metrics.record(Outcome::TooLarge);
            return ApiError::PayloadTooLarge.into_response();
        }
    }

    next.run(request).await
}

/// Intake endpoint: validate, rate limit, sanitize and forward one URL.
pub async fn download(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    match intake(&state, &headers, body).await {
        Ok(response) => response,
        Err(err) => {
            state.metrics.record(outcome_for(&err));
            err.into_response()
        }
    }
}

async fn intake(
    state: &AppState,
    headers: &HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, ApiError> {
    let body = body.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge
        } else {
            ApiError::BadRequest("Invalid request body".to_string())
        }
    })?;

    let payload: serde_json::Value = serde_json::from_slice(&body)
        .map_err(|_| ApiError::BadRequest("Invalid JSON in request body".to_string()))?;
    let url = payload
        .get("url")
        .and_then(|v| v.as_str())
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("URL is required".to_string()))?;

    let meta = RequestMeta::from_headers(headers);
    let (client_id, platform, remaining) = match state.gatekeeper.handle(url, &meta).await {
        GateDecision::Accepted {
            client_id,
            platform,
            content_id,
            remaining,
        } => {
            debug!(client = %client_id, %platform, content_id = %content_id, "Request accepted");
            (client_id, platform, remaining)
        }
        GateDecision::RateLimited {
            limit,
            reset_at_ms,
            retry_after,
            ..
        } => {
            state.metrics.record(Outcome::RateLimited);
            return Ok(rate_limited_response(limit, reset_at_ms, retry_after));
        }
        GateDecision::Invalid {
            message, platform, ..
        } => {
            return Err(ApiError::Invalid {
                message,
                platform: platform.map(|p| p.as_str().to_string()),
            });
        }
    };

    let sanitized = sanitizer::sanitize(url).map_err(|err| match err {
        SanitizeError::Security(violation) => {
            warn!(client = %client_id, %platform, violation = ?violation, "Blocked suspicious URL");
            ApiError::Blocked
        }
        SanitizeError::Format => ApiError::BadRequest(err.to_string()),
    })?;

    let results = state.backend.extract(&sanitized).await.map_err(|err| {
        match &err {
            BackendError::Timeout | BackendError::Unavailable(_) => {
                warn!(client = %client_id, error = %err, "Extraction backend unavailable");
            }
            _ => info!(client = %client_id, error = %err, "Extraction failed"),
        }
        ApiError::from(err)
    })?;

    info!(client = %client_id, %platform, results = results.len(), "Extraction succeeded");
    state.metrics.record(Outcome::Accepted);

    let limit = state.gatekeeper.limiter().max_requests();
    let mut response = Json(IntakeResponse {
        success: true,
        platform,
        results,
    })
    .into_response();
    let headers = response.headers_mut();
    headers.insert("x-ratelimit-limit", HeaderValue::from(limit));
    headers.insert("x-ratelimit-remaining", HeaderValue::from(remaining));
    Ok(response)
}

fn outcome_for(err: &ApiError) -> Outcome {
    match err {
        ApiError::PayloadTooLarge => Outcome::TooLarge,
        ApiError::BadRequest(_) | ApiError::Invalid { .. } => Outcome::Invalid,
        ApiError::Blocked => Outcome::Blocked,
        ApiError::Rejected(_) => Outcome::BackendRejected,
        ApiError::ServiceUnavailable => Outcome::BackendUnavailable,
        ApiError::Internal { .. } => Outcome::InternalError,
    }
}

/// Whole seconds until `retry_after` has passed, never less than one.
pub fn retry_after_secs(retry_after: Duration) -> u64 {
    retry_after.as_millis().div_ceil(1000).max(1) as u64
}

/// RFC 3339 rendering of an epoch-millisecond timestamp.
pub fn format_reset(reset_at_ms: i64) -> String {
    chrono::DateTime::<chrono::Utc>::from_timestamp_millis(reset_at_ms)
        .map(|t| t.to_rfc3339_opts(chrono::SecondsFormat::Millis, true))
        .unwrap_or_else(|| reset_at_ms.to_string())
}

fn rate_limited_response(limit: u32, reset_at_ms: i64, retry_after: Duration) -> Response {
    let retry_secs = retry_after_secs(retry_after);
    (
        StatusCode::TOO_MANY_REQUESTS,
        [
            ("X-RateLimit-Limit", limit.to_string()),
            ("X-RateLimit-Remaining", "0".to_string()),
            ("X-RateLimit-Reset", format_reset(reset_at_ms)),
            ("Retry-After", retry_secs.to_string()),
        ],
        Json(ErrorResponse {
            success: false,
            error: "Too many requests. Please try again later.".to_string(),
            platform: None,
            reference: None,
        }),
    )
        .into_response()
}
