// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Test data generators for attack simulation.

use std::net::{IpAddr, Ipv4Addr};

/// Generate a pool of IP addresses for testing.
pub fn generate_ips(count: usize) -> Vec<IpAddr> {
    (0..count)
        .map(|i| {
            // Use 10.x.x.x private range
            let a = ((i >> 16) & 0xFF) as u8;
            let b = ((i >> 8) & 0xFF) as u8;
            let c = (i & 0xFF) as u8;
            IpAddr::V4(Ipv4Addr::new(10, a, b, c))
        })
        .collect()
}

/// One valid URL per supported URL shape.
pub fn generate_platform_urls() -> Vec<(&'static str, &'static str, &'static str)> {
    vec![
        ("https://www.instagram.com/p/ABC123/", "instagram", "ABC123"),
        ("https://instagram.com/reel/Cx-9_z/", "instagram", "Cx-9_z"),
        ("https://instagram.com/reels/Reel42", "instagram", "Reel42"),
        ("https://www.instagram.com/tv/TvClip7/", "instagram", "TvClip7"),
        ("https://instagram.com/stories/someone/3141592653/", "instagram", "3141592653"),
        ("https://twitter.com/user/status/1234567890", "twitter", "1234567890"),
        ("https://mobile.twitter.com/user/statuses/42", "twitter", "42"),
        ("https://x.com/user/status/9876543210", "twitter", "9876543210"),
        ("https://www.tiktok.com/@user/video/7234567890123456789", "tiktok", "7234567890123456789"),
        ("https://m.tiktok.com/v/7000000000000000001.html", "tiktok", "7000000000000000001"),
        ("https://vm.tiktok.com/ZMabc123/", "tiktok", "ZMabc123"),
    ]
}

/// Script-injection payloads embedded in otherwise valid platform URLs.
pub fn generate_xss_urls() -> Vec<String> {
    let payloads = [
        "<script>alert(1)</script>",
        "<SCRIPT src=//evil.example>",
        "< iframe src=x>",
        "<embed src=x>",
        "<object data=x>",
        "x onerror=alert(1)",
        "y onload =go()",
        "javascript:alert(1)",
        "String.fromCharCode(88)",
        "el.innerHTML",
        "document.write(1)",
        "eval(atob('x'))",
        "expression(alert(1))",
    ];
    payloads
        .iter()
        .map(|p| format!("https://www.instagram.com/p/ABC123/?q={p}"))
        .collect()
}

/// Malformed or non-web inputs the validator must refuse.
pub fn generate_malformed_urls() -> Vec<&'static str> {
    vec![
        "",
        "   ",
        "not-a-url",
        "://missing-scheme.com/",
        "https://",
        "ftp://instagram.com/p/ABC123/",
        "javascript:alert(1)",
        "data:text/html,<script>",
        "file:///etc/passwd",
    ]
}

/// Lookalike hosts that mention a platform without being one.
pub fn generate_spoofed_hosts() -> Vec<&'static str> {
    vec![
        "https://instagram.com.evil.example/p/ABC123/",
        "https://evilinstagram.com/p/ABC123/",
        "https://evil.example/?next=https://instagram.com/p/ABC123/",
        "https://twitter.com@evil.example/user/status/1",
        "https://notx.com/user/status/1",
        "https://tiktok.co/@u/video/1",
        "https://evil.example\\@instagram.com/p/ABC123/",
        "https://evil.example\\@www.tiktok.com/@u/video/7000000000000000000",
        "https://evil.example\\@mobile.twitter.com/u/status/1",
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_ips() {
        let ips = generate_ips(256);
        assert_eq!(ips.len(), 256);
        // All should be unique
        let unique: std::collections::HashSet<_> = ips.iter().collect();
        assert_eq!(unique.len(), 256);
    }

    #[test]
    fn test_xss_urls_keep_platform_prefix() {
        for url in generate_xss_urls() {
            assert!(url.starts_with("https://www.instagram.com/p/ABC123/"));
        }
    }
}
