// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Configuration for the intake gateway.
//!
//! Every field has a serde default so a partial config deserializes, and
//! [`Config::from_env`] overlays environment variables on top of the
//! defaults.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Configuration for the intake gateway service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server bind address (default: 0.0.0.0:8080)
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Largest accepted request body in bytes (default: 10 KiB)
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Origins allowed by CORS
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Extraction backend configuration
    #[serde(default)]
    pub backend: BackendConfig,

    /// Metrics configuration
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Fixed-window rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Requests admitted per client per window (default: 10)
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,

    /// Window length in milliseconds (default: 60000)
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,

    /// Where the limiter state is persisted. `None` keeps it in memory only.
    #[serde(default = "default_persist_path")]
    pub persist_path: Option<PathBuf>,

    /// Minimum spacing between two writes of the state file (default: 5000)
    #[serde(default = "default_save_debounce_ms")]
    pub save_debounce_ms: u64,

    /// Interval of the expired-entry sweep in seconds (default: 60)
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
}

/// Extraction backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the extraction service (default: http://localhost:8000)
    #[serde(default = "default_backend_url")]
    pub base_url: String,

    /// Upper bound for one extract call in seconds (default: 35)
    #[serde(default = "default_backend_timeout_secs")]
    pub timeout_secs: u64,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable Prometheus metrics endpoint (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics endpoint path (default: /metrics)
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

// Default value functions
fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_max_body_bytes() -> usize {
    10 * 1024
}

fn default_allowed_origins() -> Vec<String> {
    vec!["http://localhost:3000".to_string()]
}

fn default_max_requests() -> u32 {
    10
}

fn default_window_ms() -> u64 {
    60_000
}

fn default_persist_path() -> Option<PathBuf> {
    Some(PathBuf::from("data/rate-limits.json"))
}

fn default_save_debounce_ms() -> u64 {
    5_000
}

fn default_cleanup_interval_secs() -> u64 {
    60
}

fn default_backend_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_backend_timeout_secs() -> u64 {
    35
}

fn default_true() -> bool {
    true
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            max_body_bytes: default_max_body_bytes(),
            allowed_origins: default_allowed_origins(),
            rate_limit: RateLimitConfig::default(),
            backend: BackendConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_ms: default_window_ms(),
            persist_path: default_persist_path(),
            save_debounce_ms: default_save_debounce_ms(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_backend_url(),
            timeout_secs: default_backend_timeout_secs(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            path: default_metrics_path(),
        }
    }
}

impl RateLimitConfig {
    /// In-memory configuration, mostly useful for tests.
    pub fn in_memory(max_requests: u32, window_ms: u64) -> Self {
        Self {
            max_requests,
            window_ms,
            persist_path: None,
            ..Default::default()
        }
    }

    /// Get the rate window duration
    pub fn window_duration(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    /// Get the debounce interval for state writes
    pub fn save_debounce(&self) -> Duration {
        Duration::from_millis(self.save_debounce_ms)
    }

    /// Get the sweep interval
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

impl BackendConfig {
    /// Get the request timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Config {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        let persist_path = match lookup("RATE_LIMIT_FILE") {
            Some(v) if v.trim().is_empty() => None,
            Some(v) => Some(PathBuf::from(v.trim())),
            None => defaults.rate_limit.persist_path.clone(),
        };

        let allowed_origins = lookup("ALLOWED_ORIGINS")
            .map(|v| {
                v.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or(defaults.allowed_origins);

        Config {
            bind_addr: lookup("BIND_ADDR").unwrap_or(defaults.bind_addr),
            max_body_bytes: parse_var(&lookup, "MAX_BODY_BYTES")
                .unwrap_or(defaults.max_body_bytes),
            allowed_origins,
            rate_limit: RateLimitConfig {
                // Zero would admit nobody; treat it as unset.
                max_requests: parse_var(&lookup, "RATE_LIMIT_MAX_REQUESTS")
                    .filter(|n: &u32| *n > 0)
                    .unwrap_or(defaults.rate_limit.max_requests),
                window_ms: parse_var(&lookup, "RATE_LIMIT_WINDOW_MS")
                    .unwrap_or(defaults.rate_limit.window_ms),
                persist_path,
                save_debounce_ms: parse_var(&lookup, "RATE_LIMIT_SAVE_DEBOUNCE_MS")
                    .unwrap_or(defaults.rate_limit.save_debounce_ms),
                cleanup_interval_secs: parse_var(&lookup, "RATE_LIMIT_CLEANUP_SECS")
                    .unwrap_or(defaults.rate_limit.cleanup_interval_secs),
            },
            backend: BackendConfig {
                base_url: lookup("BACKEND_URL")
                    .map(|v| v.trim().trim_end_matches('/').to_string())
                    .unwrap_or(defaults.backend.base_url),
                timeout_secs: parse_var(&lookup, "BACKEND_TIMEOUT_SECS")
                    .unwrap_or(defaults.backend.timeout_secs),
            },
            metrics: MetricsConfig {
                enabled: parse_var(&lookup, "METRICS_ENABLED")
                    .unwrap_or(defaults.metrics.enabled),
                ..defaults.metrics
            },
        }
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key).and_then(|v| v.trim().parse().ok())
}
