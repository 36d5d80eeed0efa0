// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Client for the extraction backend.
//!
//! Sends the accepted URL to `{base}/api/extract` under a hard timeout and
//! maps the reply into the public result shape. Download links point at the
//! backend's own `/api/download` endpoint; media URLs from the backend are
//! never handed to the caller.

use crate::config::BackendConfig;
use crate::error::BackendError;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Coarse quality bucket shown to users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Hd,
    Sd,
    Audio,
}

impl Quality {
    /// Bucket a backend quality label.
    pub fn from_label(label: &str) -> Self {
        let label = label.to_lowercase();
        if ["1080", "720", "best", "hd"].iter().any(|m| label.contains(m)) {
            Quality::Hd
        } else if label.contains("audio") {
            Quality::Audio
        } else {
            Quality::Sd
        }
    }
}

#[derive(Debug, Serialize)]
struct ExtractRequest<'a> {
    url: &'a str,
}

/// Reply of the backend extract endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractResponse {
    pub success: bool,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub formats: Vec<BackendFormat>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendFormat {
    pub quality: String,
    pub url: String,
    pub ext: String,
    #[serde(default)]
    pub filesize: Option<u64>,
}

/// One downloadable rendition, as returned to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaResult {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    pub quality: Quality,
    pub label: String,
    pub format: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    pub download_url: String,
}

/// HTTP client for the extraction service.
pub struct ExtractionBackend {
    base_url: String,
    client: reqwest::Client,
}

impl ExtractionBackend {
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| BackendError::Unavailable(e.to_string()))?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Ask the backend to resolve `url` and map its formats.
    pub async fn extract(&self, url: &str) -> Result<Vec<MediaResult>, BackendError> {
        let endpoint = format!("{}/api/extract", self.base_url);
        debug!(endpoint = %endpoint, "Calling extraction backend");

        let response = self
            .client
            .post(&endpoint)
            .json(&ExtractRequest { url })
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;
        let parsed: ExtractResponse = match serde_json::from_slice(&body) {
            Ok(parsed) => parsed,
            Err(e) if status.is_success() => {
                return Err(BackendError::InvalidResponse(e.to_string()));
            }
            Err(_) => {
                warn!(status = %status, "Extraction backend returned an error status");
                return Err(BackendError::Unavailable(format!("status {status}")));
            }
        };

        if status.is_server_error() {
            warn!(status = %status, "Extraction backend failed");
            return Err(BackendError::Unavailable(format!("status {status}")));
        }

        if !parsed.success {
            let message = parsed
                .error
                .unwrap_or_else(|| "Failed to extract media".to_string());
            return Err(BackendError::Rejected(message));
        }

        Ok(self.map_results(url, parsed))
    }

    /// Public result shape for a successful backend reply.
    pub fn map_results(&self, original_url: &str, response: ExtractResponse) -> Vec<MediaResult> {
        let title = response.title.unwrap_or_else(|| "Untitled".to_string());
        response
            .formats
            .into_iter()
            .map(|format| MediaResult {
                title: title.clone(),
                thumbnail: response.thumbnail.clone(),
                quality: Quality::from_label(&format.quality),
                download_url: self.download_url(original_url, &format.quality),
                label: format.quality,
                format: format.ext,
                size: format.filesize,
            })
            .collect()
    }

    /// Link through the backend's download endpoint for one rendition.
    pub fn download_url(&self, original_url: &str, quality: &str) -> String {
        format!(
            "{}/api/download?url={}&quality={}",
            self.base_url,
            urlencoding::encode(original_url),
            urlencoding::encode(quality)
        )
    }
}
