// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Media Intake Gateway
//!
//! Request intake for a social-media downloader. Incoming URLs pass through
//! a fixed pipeline before anything reaches the extraction backend:
//!
//! - Per-client fixed-window rate limiting (10 requests per minute default),
//!   keyed by a hash of the client address and persisted across restarts
//! - Platform detection and content-ID extraction (Instagram, X/Twitter,
//!   TikTok)
//! - Sanitization against dangerous schemes, script injection and
//!   open-redirect query parameters
//! - Bounded forwarding to the extraction backend

pub mod backend;
pub mod config;
pub mod error;
pub mod gatekeeper;
pub mod handlers;
pub mod limiter;
pub mod metrics;
pub mod persist;
pub mod platform;
pub mod sanitizer;
pub mod validator;

pub use config::Config;
pub use gatekeeper::{GateDecision, Gatekeeper, RequestMeta};
pub use limiter::{RateLimitResult, RateLimiter};
pub use platform::Platform;
pub use sanitizer::sanitize;
pub use validator::{UrlValidator, ValidationOutcome};
