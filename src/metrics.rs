// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Prometheus counters for intake outcomes.

use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

/// Label values for `intake_requests_total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Accepted,
    RateLimited,
    Invalid,
    Blocked,
    TooLarge,
    BackendUnavailable,
    BackendRejected,
    InternalError,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Accepted => "accepted",
            Outcome::RateLimited => "rate_limited",
            Outcome::Invalid => "invalid",
            Outcome::Blocked => "blocked",
            Outcome::TooLarge => "too_large",
            Outcome::BackendUnavailable => "backend_unavailable",
            Outcome::BackendRejected => "backend_rejected",
            Outcome::InternalError => "internal_error",
        }
    }
}

/// Service metrics registry.
pub struct Metrics {
    registry: Registry,
    requests: IntCounterVec,
    persistent: IntGauge,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let requests = IntCounterVec::new(
            Opts::new("intake_requests_total", "Intake requests by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(requests.clone()))?;

        let persistent = IntGauge::new(
            "intake_rate_limiter_persistent",
            "1 when rate limiter state is persisted to disk, 0 when memory-only",
        )?;
        registry.register(Box::new(persistent.clone()))?;

        Ok(Self {
            registry,
            requests,
            persistent,
        })
    }

    pub fn record(&self, outcome: Outcome) {
        self.requests.with_label_values(&[outcome.as_str()]).inc();
    }

    pub fn count(&self, outcome: Outcome) -> u64 {
        self.requests.with_label_values(&[outcome.as_str()]).get()
    }

    pub fn set_persistent(&self, persistent: bool) {
        self.persistent.set(i64::from(persistent));
    }

    /// Text exposition format.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        String::from_utf8(buf).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
