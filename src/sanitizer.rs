// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! URL sanitizer.
//!
//! Applied after validation as a second, independent layer. Rejects
//! dangerous schemes and script-injection markers outright, then rebuilds
//! the URL from scheme, host and path, keeping only query parameters that
//! cannot steer redirects, callbacks or server-side fetches.

use crate::error::{SanitizeError, SecurityViolation};
use regex::RegexSet;
use std::sync::LazyLock;
use tracing::debug;
use url::Url;

const DANGEROUS_PROTOCOLS: &[&str] = &["javascript:", "data:", "vbscript:", "file:", "ftp:"];

/// Query keys dropped during reconstruction, compared case-insensitively.
const BLOCKED_PARAMS: &[&str] = &[
    "callback",
    "jsonp",
    "redirect",
    "return",
    "next",
    "url",
    "dest",
    "destination",
    "redirect_uri",
    "redirect_url",
    "return_to",
    "load",
    "src",
    "eval",
    "exec",
    "cmd",
    "command",
];

static XSS_PATTERNS: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"(?i)<\s*script",
        r"(?i)<\s*iframe",
        r"(?i)<\s*embed",
        r"(?i)<\s*object",
        r"(?i)on(?:load|error|click|mouseover)\s*=",
        r"(?i)javascript:",
        r"(?i)fromCharCode",
        r"(?i)innerHTML",
        r"(?i)document\s*\.\s*write",
        r"(?i)eval\s*\(",
        r"(?i)expression\s*\(",
    ])
    .unwrap_or_else(|e| panic!("invalid built-in XSS pattern: {e}"))
});

/// Sanitize `raw` for forwarding.
pub fn sanitize(raw: &str) -> Result<String, SanitizeError> {
    let trimmed = raw.trim();

    let lowered = trimmed.to_lowercase();
    if DANGEROUS_PROTOCOLS.iter().any(|p| lowered.starts_with(p)) {
        debug!("Dangerous protocol rejected");
        return Err(SecurityViolation::DangerousProtocol.into());
    }

    if XSS_PATTERNS.is_match(trimmed) {
        debug!("XSS marker rejected");
        return Err(SecurityViolation::XssPattern.into());
    }

    let parsed = Url::parse(trimmed).map_err(|_| SanitizeError::Format)?;
    rebuild(&parsed)
}

fn is_blocked_param(key: &str) -> bool {
    BLOCKED_PARAMS.iter().any(|b| b.eq_ignore_ascii_case(key))
}

fn rebuild(parsed: &Url) -> Result<String, SanitizeError> {
    let host = parsed.host_str().ok_or(SanitizeError::Format)?;
    let authority = match parsed.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };

    let mut clean = Url::parse(&format!("{}://{}", parsed.scheme(), authority))
        .map_err(|_| SanitizeError::Format)?;
    clean.set_path(parsed.path());

    let kept: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(key, _)| !is_blocked_param(key))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if !kept.is_empty() {
        clean.query_pairs_mut().extend_pairs(kept);
    }

    Ok(clean.to_string())
}
