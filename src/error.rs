// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Error types for the intake gateway.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// A URL matched a known-dangerous protocol or injection marker.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SecurityViolation {
    #[error("Dangerous protocol detected")]
    DangerousProtocol,

    #[error("XSS pattern detected")]
    XssPattern,
}

/// Sanitizer failure.
///
/// `Security` means likely malicious input and is worth alerting on;
/// `Format` is an ordinary typo-grade rejection.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SanitizeError {
    #[error(transparent)]
    Security(#[from] SecurityViolation),

    #[error("Invalid URL format")]
    Format,
}

impl SanitizeError {
    pub fn is_security(&self) -> bool {
        matches!(self, SanitizeError::Security(_))
    }
}

/// Rate limiter state file could not be read or written.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("State file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("State file serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Extraction backend call failure.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Extraction backend timed out")]
    Timeout,

    #[error("Extraction backend unavailable: {0}")]
    Unavailable(String),

    #[error("{0}")]
    Rejected(String),

    #[error("Invalid response from extraction backend: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            BackendError::Timeout
        } else if err.is_decode() {
            BackendError::InvalidResponse(err.to_string())
        } else {
            BackendError::Unavailable(err.to_string())
        }
    }
}

/// Public response body shared by every outcome of the intake endpoint.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

/// HTTP boundary error. Everything the intake endpoint can reject with ends
/// up here; rate limiting is answered separately because it carries headers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Request body too large")]
    PayloadTooLarge,

    #[error("{0}")]
    BadRequest(String),

    /// URL failed platform or content-ID validation.
    #[error("{message}")]
    Invalid {
        message: String,
        platform: Option<String>,
    },

    /// URL tripped a security check. The message never says which one.
    #[error("Invalid URL")]
    Blocked,

    /// Backend understood the request but could not extract anything.
    #[error("{0}")]
    Rejected(String),

    #[error("Download service is temporarily unavailable. Please try again later.")]
    ServiceUnavailable,

    #[error("An unexpected error occurred")]
    Internal { reference: String },
}

impl ApiError {
    /// Log `detail` under a fresh correlation token and return the opaque error.
    pub fn internal(detail: impl std::fmt::Display) -> Self {
        let reference = uuid::Uuid::new_v4().to_string();
        error!(reference = %reference, detail = %detail, "Unexpected error");
        ApiError::Internal { reference }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::BadRequest(_)
            | ApiError::Invalid { .. }
            | ApiError::Blocked
            | ApiError::Rejected(_) => StatusCode::BAD_REQUEST,
            ApiError::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<BackendError> for ApiError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Timeout | BackendError::Unavailable(_) => ApiError::ServiceUnavailable,
            BackendError::Rejected(message) => ApiError::Rejected(message),
            BackendError::InvalidResponse(detail) => ApiError::internal(detail),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (platform, reference) = match &self {
            ApiError::Invalid { platform, .. } => (platform.clone(), None),
            ApiError::Internal { reference } => (None, Some(reference.clone())),
            _ => (None, None),
        };
        let body = ErrorResponse {
            success: false,
            error: self.to_string(),
            platform,
            reference,
        };
        (status, Json(body)).into_response()
    }
}
