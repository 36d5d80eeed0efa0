// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Request gatekeeper.
//!
//! Derives an anonymous client identifier from request headers, consults
//! the rate limiter, then the URL validator, and turns the result into a
//! single decision. Sanitization happens afterwards in the HTTP handler.

use crate::config::RateLimitConfig;
use crate::limiter::{RateLimitResult, RateLimiter};
use crate::platform::Platform;
use crate::validator::UrlValidator;
use axum::http::HeaderMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Key used when no IP-bearing header is present.
pub const UNKNOWN_CLIENT: &str = "unknown";

const BOT_MARKERS: &[&str] = &["bot", "crawler", "spider", "scraper"];

/// Hex characters kept from the client digest.
const CLIENT_ID_LEN: usize = 16;

/// Request metadata the gatekeeper looks at.
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    pub forwarded_for: Option<String>,
    pub real_ip: Option<String>,
    pub connecting_ip: Option<String>,
    pub user_agent: Option<String>,
}

impl RequestMeta {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let get = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        Self {
            forwarded_for: get("x-forwarded-for"),
            real_ip: get("x-real-ip"),
            connecting_ip: get("cf-connecting-ip"),
            user_agent: get("user-agent"),
        }
    }

    /// Best-effort client address: first `X-Forwarded-For` hop, then
    /// `X-Real-IP`, then `CF-Connecting-IP`.
    pub fn client_address(&self) -> &str {
        let forwarded = self
            .forwarded_for
            .as_deref()
            .and_then(|xff| xff.split(',').next())
            .map(str::trim);

        [
            forwarded,
            self.real_ip.as_deref().map(str::trim),
            self.connecting_ip.as_deref().map(str::trim),
        ]
        .into_iter()
        .flatten()
        .find(|ip| !ip.is_empty())
        .unwrap_or(UNKNOWN_CLIENT)
    }

    /// Whether the user agent looks like an automated crawler.
    pub fn looks_automated(&self) -> bool {
        self.user_agent.as_deref().is_some_and(|ua| {
            let ua = ua.to_lowercase();
            BOT_MARKERS.iter().any(|marker| ua.contains(marker))
        })
    }
}

/// Stable, non-reversible-at-a-glance key for a client address.
///
/// BLAKE3 truncated to 64 bits. The IPv4 space is small enough to
/// brute-force, so this keeps raw addresses out of state files and logs but
/// is not a privacy guarantee against a determined attacker.
pub fn client_id(address: &str) -> String {
    let digest = blake3::hash(address.as_bytes()).to_hex();
    digest.as_str()[..CLIENT_ID_LEN].to_string()
}

/// Outcome of gating one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Accepted {
        client_id: String,
        platform: Platform,
        content_id: String,
        remaining: u32,
    },
    RateLimited {
        client_id: String,
        limit: u32,
        reset_at_ms: i64,
        retry_after: Duration,
    },
    Invalid {
        client_id: String,
        message: String,
        platform: Option<Platform>,
    },
}

impl GateDecision {
    pub fn is_valid(&self) -> bool {
        matches!(self, GateDecision::Accepted { .. })
    }

    pub fn client_id(&self) -> &str {
        match self {
            GateDecision::Accepted { client_id, .. }
            | GateDecision::RateLimited { client_id, .. }
            | GateDecision::Invalid { client_id, .. } => client_id,
        }
    }

    pub fn platform(&self) -> Option<Platform> {
        match self {
            GateDecision::Accepted { platform, .. } => Some(*platform),
            GateDecision::Invalid { platform, .. } => *platform,
            GateDecision::RateLimited { .. } => None,
        }
    }
}

/// Orchestrates rate limiting and validation for the intake endpoint.
pub struct Gatekeeper {
    limiter: Arc<RateLimiter>,
    validator: UrlValidator,
}

impl Gatekeeper {
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        Self {
            limiter,
            validator: UrlValidator::new(),
        }
    }

    /// Build a gatekeeper with a persistent limiter when possible, falling
    /// back to a memory-only one when the state file cannot be used.
    pub async fn from_config(config: RateLimitConfig) -> Self {
        let limiter = match config.persist_path.clone() {
            Some(path) => match RateLimiter::persistent(config.clone(), &path).await {
                Ok(limiter) => limiter,
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "Persistent rate limiter unavailable, falling back to memory"
                    );
                    RateLimiter::in_memory(config)
                }
            },
            None => {
                info!("Rate limiter persistence disabled");
                RateLimiter::in_memory(config)
            }
        };
        Self::new(Arc::new(limiter))
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Gate one intake request.
    pub async fn handle(&self, raw_url: &str, meta: &RequestMeta) -> GateDecision {
        let client_id = client_id(meta.client_address());

        match self.limiter.check(&client_id).await {
            RateLimitResult::Allowed { remaining, .. } => {
                let outcome = self.validator.validate(raw_url);
                if !outcome.is_valid() {
                    debug!(client = %client_id, errors = ?outcome.errors, "URL rejected");
                    return GateDecision::Invalid {
                        client_id,
                        message: outcome.message(),
                        platform: outcome.platform,
                    };
                }

                if meta.looks_automated() {
                    info!(
                        client = %client_id,
                        user_agent = meta.user_agent.as_deref().unwrap_or_default(),
                        "Request from automated user agent"
                    );
                }

                match (outcome.platform, outcome.content_id) {
                    (Some(platform), Some(content_id)) => GateDecision::Accepted {
                        client_id,
                        platform,
                        content_id,
                        remaining,
                    },
                    // A valid outcome always carries both.
                    (platform, _) => GateDecision::Invalid {
                        client_id,
                        message: crate::validator::MSG_INVALID_FORMAT.to_string(),
                        platform,
                    },
                }
            }
            RateLimitResult::Limited {
                reset_at_ms,
                retry_after,
            } => {
                info!(
                    client = %client_id,
                    retry_after_secs = retry_after.as_secs(),
                    "Request rate limited"
                );
                GateDecision::RateLimited {
                    client_id,
                    limit: self.limiter.max_requests(),
                    reset_at_ms,
                    retry_after,
                }
            }
        }
    }
}
