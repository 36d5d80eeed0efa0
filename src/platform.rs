// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Registry of supported platforms.
//!
//! Each platform maps to one row of a static pattern table: a domain rule
//! tested against the parsed, lowercased host, and an ordered list of content-ID
//! rules tested against the URL path. Supporting another platform means
//! adding a variant and a row; nothing downstream dispatches on the variant.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

/// A supported source service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Instagram,
    Twitter,
    TikTok,
}

impl Platform {
    /// Stable lowercase identifier used in payloads and messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Instagram => "instagram",
            Platform::Twitter => "twitter",
            Platform::TikTok => "tiktok",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Platform::Instagram => "Instagram",
            Platform::Twitter => "X (Twitter)",
            Platform::TikTok => "TikTok",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Domain rule and content-ID rules for one platform.
#[derive(Debug)]
pub struct PlatformPattern {
    pub platform: Platform,
    pub domain: Regex,
    pub id_patterns: Vec<Regex>,
}

/// Domain rules match the whole host: the platform domain or a subdomain of
/// it. They never see userinfo, path or query.
fn domain_rule(domain: &str) -> String {
    format!(r"^(?:[a-z0-9\-]+\.)*{}$", regex::escape(domain))
}

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid built-in pattern {pattern:?}: {e}"))
}

static REGISTRY: LazyLock<Vec<PlatformPattern>> = LazyLock::new(|| {
    vec![
        PlatformPattern {
            platform: Platform::Instagram,
            domain: compile(&domain_rule("instagram.com")),
            id_patterns: vec![
                compile(r"/p/([A-Za-z0-9_-]+)"),
                compile(r"/reels?/([A-Za-z0-9_-]+)"),
                compile(r"/tv/([A-Za-z0-9_-]+)"),
                compile(r"/stories/[^/]+/(\d+)"),
            ],
        },
        PlatformPattern {
            platform: Platform::Twitter,
            domain: compile(&domain_rule("twitter.com")),
            id_patterns: vec![compile(r"/status(?:es)?/(\d+)")],
        },
        PlatformPattern {
            platform: Platform::TikTok,
            domain: compile(&domain_rule("tiktok.com")),
            id_patterns: vec![
                compile(r"/video/(\d+)"),
                compile(r"/v/(\d+)"),
                // vm.tiktok.com / vt.tiktok.com short links
                compile(r"^/(Z[A-Za-z0-9]{6,})/?$"),
            ],
        },
    ]
});

static PLATFORMS: LazyLock<Vec<Platform>> =
    LazyLock::new(|| REGISTRY.iter().map(|row| row.platform).collect());

fn row(platform: Platform) -> &'static PlatformPattern {
    REGISTRY
        .iter()
        .find(|row| row.platform == platform)
        .unwrap_or_else(|| panic!("platform {platform} missing from registry"))
}

/// Domain rule for `platform`.
pub fn domain_pattern_for(platform: Platform) -> &'static Regex {
    &row(platform).domain
}

/// Content-ID rules for `platform`, in match priority order.
pub fn id_patterns_for(platform: Platform) -> &'static [Regex] {
    &row(platform).id_patterns
}

/// Every registered platform, in registry order.
pub fn all_platforms() -> &'static [Platform] {
    &PLATFORMS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_platform_has_a_row() {
        assert_eq!(all_platforms().len(), 3);
        for platform in all_platforms() {
            assert!(!id_patterns_for(*platform).is_empty());
        }
    }

    #[test]
    fn test_registry_order() {
        assert_eq!(
            all_platforms(),
            &[Platform::Instagram, Platform::Twitter, Platform::TikTok]
        );
    }

    #[test]
    fn test_domain_rules() {
        let ig = domain_pattern_for(Platform::Instagram);
        assert!(ig.is_match("www.instagram.com"));
        assert!(ig.is_match("instagram.com"));
        assert!(!ig.is_match("notinstagram.com"));
        assert!(!ig.is_match("instagram.com.evil.example"));

        let tt = domain_pattern_for(Platform::TikTok);
        assert!(tt.is_match("vm.tiktok.com"));
        assert!(tt.is_match("m.tiktok.com"));
        assert!(!tt.is_match("tiktok.co"));

        let tw = domain_pattern_for(Platform::Twitter);
        assert!(tw.is_match("mobile.twitter.com"));
        assert!(!tw.is_match("x.com"));
    }

    #[test]
    fn test_domain_rules_reject_url_fragments() {
        let ig = domain_pattern_for(Platform::Instagram);
        assert!(!ig.is_match("evil.example\\@instagram.com"));
        assert!(!ig.is_match("https://instagram.com/p/abc/"));
        assert!(!ig.is_match("evil.example/@instagram.com"));
    }

    #[test]
    fn test_id_rules_capture_one_group() {
        for platform in all_platforms() {
            for pattern in id_patterns_for(*platform) {
                assert_eq!(pattern.captures_len(), 2, "{pattern}");
            }
        }
    }

    #[test]
    fn test_platform_serialization() {
        assert_eq!(serde_json::to_string(&Platform::TikTok).unwrap(), "\"tiktok\"");
        assert_eq!(Platform::Twitter.to_string(), "twitter");
        assert_eq!(Platform::Twitter.display_name(), "X (Twitter)");
    }
}
