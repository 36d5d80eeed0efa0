// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: Apache-2.0

//! Supported-platform URL validator.
//!
//! Validation runs as an ordered list of checks that append to one error
//! list:
//! - presence and URL syntax (short-circuit)
//! - HTTP/HTTPS scheme (does not short-circuit)
//! - platform detection against the registry
//! - content-ID extraction from the path
//!
//! A recognised platform is reported even when its content ID is missing.

use crate::platform::{self, Platform};
use serde::Serialize;
use std::sync::LazyLock;
use tracing::debug;
use url::Url;

pub const MSG_URL_REQUIRED: &str = "URL is required";
pub const MSG_INVALID_FORMAT: &str = "Invalid URL format";
pub const MSG_BAD_PROTOCOL: &str = "URL must use HTTP or HTTPS protocol";

static MSG_UNSUPPORTED: LazyLock<String> = LazyLock::new(|| {
    let names: Vec<&str> = platform::all_platforms()
        .iter()
        .map(|p| p.display_name())
        .collect();
    let listed = match names.as_slice() {
        [] => String::new(),
        [only] => only.to_string(),
        [first, second] => format!("{first} or {second}"),
        [head @ .., last] => format!("{}, or {last}", head.join(", ")),
    };
    format!("Unsupported platform. Please use {listed} URL")
});

/// Error reported when no registered platform claims the URL.
pub fn unsupported_platform_message() -> &'static str {
    &MSG_UNSUPPORTED
}

/// Result of validating one candidate URL.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationOutcome {
    pub errors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_id: Option<String>,
}

impl ValidationOutcome {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// All error messages joined for display.
    pub fn message(&self) -> String {
        self.errors.join(", ")
    }

    fn rejected(message: &str) -> Self {
        Self {
            errors: vec![message.to_string()],
            ..Default::default()
        }
    }
}

/// Stateless URL validator backed by the platform registry.
#[derive(Debug, Clone, Copy, Default)]
pub struct UrlValidator;

impl UrlValidator {
    pub fn new() -> Self {
        Self
    }

    /// Validate `raw` and extract its platform and content ID.
    pub fn validate(&self, raw: &str) -> ValidationOutcome {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            debug!("Empty URL");
            return ValidationOutcome::rejected(MSG_URL_REQUIRED);
        }

        let parsed = match Url::parse(trimmed) {
            Ok(u) if u.host_str().is_some_and(|h| !h.is_empty()) => u,
            _ => {
                debug!("URL failed to parse or has no host");
                return ValidationOutcome::rejected(MSG_INVALID_FORMAT);
            }
        };

        let mut outcome = ValidationOutcome::default();

        if !matches!(parsed.scheme(), "http" | "https") {
            debug!(scheme = %parsed.scheme(), "Non-HTTP scheme");
            outcome.errors.push(MSG_BAD_PROTOCOL.to_string());
        }

        let Some(platform) = detect_platform(&parsed) else {
            debug!(host = ?parsed.host_str(), "Unsupported platform");
            outcome.errors.push(unsupported_platform_message().to_string());
            return outcome;
        };
        outcome.platform = Some(platform);

        match extract_content_id(platform, parsed.path()) {
            Some(id) => outcome.content_id = Some(id),
            None => {
                debug!(%platform, path = %parsed.path(), "No content ID in path");
                outcome
                    .errors
                    .push(format!("Could not extract content ID from {platform} URL"));
            }
        }

        outcome
    }
}

/// First registry row whose domain rule matches the host, with `x.com` as a
/// Twitter alias.
fn detect_platform(parsed: &Url) -> Option<Platform> {
    let host = parsed.host_str()?.trim_end_matches('.').to_lowercase();

    let from_table = platform::all_platforms()
        .iter()
        .copied()
        .find(|p| platform::domain_pattern_for(*p).is_match(&host));
    if from_table.is_some() {
        return from_table;
    }

    if host == "x.com" || host.ends_with(".x.com") {
        return Some(Platform::Twitter);
    }

    None
}

/// First non-empty capture among the platform's ID rules.
fn extract_content_id(platform: Platform, path: &str) -> Option<String> {
    platform::id_patterns_for(platform).iter().find_map(|pattern| {
        pattern
            .captures(path)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
            .filter(|id| !id.is_empty())
            .map(str::to_string)
    })
}
