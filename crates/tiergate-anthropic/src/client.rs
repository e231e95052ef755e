// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the Messages API.
//!
//! Provides [`ApiClient`] which handles request construction,
//! authentication headers, streaming SSE responses, and transient error retry.

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::{HeaderMap, HeaderValue};
use tiergate_config::model::ClaudeConfig;
use tiergate_core::{FragmentStream, TiergateError};
use tracing::{debug, warn};

use crate::sse;
use crate::types::{ApiErrorResponse, MessageRequest, MessageResponse};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP client for Messages API communication.
///
/// Manages authentication headers, connection pooling, and a single retry
/// for transient errors (429, 500, 503, 529).
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    url: String,
    max_retries: u32,
    retry_delay: Duration,
}

fn header_value(name: &str, raw: &str) -> Result<HeaderValue, TiergateError> {
    HeaderValue::from_str(raw)
        .map_err(|e| TiergateError::Config(format!("invalid {name} header value: {e}")))
}

impl ApiClient {
    /// Creates a client posting to `config.api_base_url`.
    pub fn new(config: &ClaudeConfig, api_key: &str) -> Result<Self, TiergateError> {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", header_value("x-api-key", api_key)?);
        headers.insert(
            "anthropic-version",
            header_value("anthropic-version", &config.api_version)?,
        );
        if let Some(beta) = config.beta.as_deref().filter(|b| !b.is_empty()) {
            headers.insert("anthropic-beta", header_value("anthropic-beta", beta)?);
        }
        headers.insert("content-type", HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| TiergateError::transport("failed to build HTTP client", e))?;

        Ok(Self {
            client,
            url: config.api_base_url.clone(),
            max_retries: 1,
            retry_delay: Duration::from_secs(1),
        })
    }

    /// Shortens the transient-error back-off.
    #[cfg(test)]
    fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// POSTs `request`, retrying once on a transient status. Returns the
    /// first successful response.
    async fn send(&self, request: &MessageRequest) -> Result<reqwest::Response, TiergateError> {
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                warn!(attempt, "retrying after transient error");
                tokio::time::sleep(self.retry_delay).await;
            }

            let response = self
                .client
                .post(&self.url)
                .json(request)
                .send()
                .await
                .map_err(|e| TiergateError::transport(format!("HTTP request failed: {e}"), e))?;

            let status = response.status();
            debug!(status = %status, attempt, stream = request.stream, "messages response received");

            if status.is_success() {
                return Ok(response);
            }

            let body = response.text().await.unwrap_or_default();
            if is_transient_error(status) && attempt < self.max_retries {
                warn!(status = %status, body = %body, "transient error, will retry");
                continue;
            }
            return Err(status_error(status, &body));
        }

        Err(TiergateError::Internal(
            "request loop ended without a response".into(),
        ))
    }

    /// Sends a non-streaming request and returns the full response.
    pub async fn complete_message(
        &self,
        request: &MessageRequest,
    ) -> Result<MessageResponse, TiergateError> {
        let mut req = request.clone();
        req.stream = false;

        let body = self
            .send(&req)
            .await?
            .text()
            .await
            .map_err(|e| TiergateError::transport("failed to read response body", e))?;
        serde_json::from_str(&body)
            .map_err(|e| TiergateError::transport("failed to parse API response", e))
    }

    /// Sends a streaming request and returns its text fragments.
    pub async fn stream_message(
        &self,
        request: &MessageRequest,
    ) -> Result<FragmentStream, TiergateError> {
        let mut req = request.clone();
        req.stream = true;
        Ok(sse::text_fragments(self.send(&req).await?))
    }
}

/// Returns true for HTTP status codes that indicate transient errors worth retrying.
fn is_transient_error(status: StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 500 | 503 | 529)
}

fn status_error(status: StatusCode, body: &str) -> TiergateError {
    let detail = match serde_json::from_str::<ApiErrorResponse>(body) {
        Ok(api_err) => format!("{}: {}", api_err.error.type_, api_err.error.message),
        Err(_) => format!("API returned {status}: {body}"),
    };
    if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
        TiergateError::AuthRequired(detail)
    } else {
        TiergateError::Transport {
            message: detail,
            source: None,
        }
    }
}
