// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the Ollama server.
//!
//! Covers the three endpoints the primary tier uses: `/api/tags` for model
//! discovery, `/api/generate` for prompt completion, and `/v1/messages` for
//! native message-block passthrough.

use std::pin::Pin;
use std::time::Duration;

use futures::stream::{self, Stream, StreamExt, TryStreamExt};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tiergate_core::{ByteStream, FragmentStream, TiergateError};
use tracing::debug;

use crate::ndjson::{self, GenerateChunk};

/// Bound on the model-listing probe, independent of the tier timeout.
const TAGS_TIMEOUT: Duration = Duration::from_secs(5);

/// Version header Ollama's message-block endpoint expects.
const NATIVE_API_VERSION: &str = "2023-06-01";

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
}

/// Body of an `/api/generate` request.
#[derive(Debug, Clone, Serialize)]
pub struct GenerateRequest {
    pub model: String,
    pub prompt: String,
    pub system: String,
    pub stream: bool,
    pub options: GenerateOptions,
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerateOptions {
    pub temperature: f64,
    pub num_ctx: u32,
}

/// A non-2xx answer from Ollama.
#[derive(Debug)]
pub struct HttpFailure {
    pub status: u16,
    pub body: String,
}

/// Reply from the passthrough endpoint.
pub enum NativeReply {
    Bytes { content_type: String, body: ByteStream },
    Rejected(HttpFailure),
}

/// Thin client over one Ollama host.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: reqwest::Client,
    host: String,
}

impl OllamaClient {
    pub fn new(host: &str) -> Result<Self, TiergateError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| TiergateError::transport("failed to build HTTP client", e))?;
        Ok(Self {
            client,
            host: host.trim_end_matches('/').to_string(),
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Names of the installed models.
    pub async fn list_models(&self) -> Result<Vec<String>, TiergateError> {
        let url = format!("{}/api/tags", self.host);
        let response = self
            .client
            .get(&url)
            .timeout(TAGS_TIMEOUT)
            .send()
            .await
            .map_err(|e| TiergateError::transport(format!("GET {url} failed"), e))?;

        if !response.status().is_success() {
            return Err(TiergateError::Transport {
                message: format!("GET {url} returned {}", response.status()),
                source: None,
            });
        }

        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| TiergateError::transport("failed to parse model listing", e))?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    /// Whole-text completion.
    pub async fn generate(
        &self,
        request: &GenerateRequest,
        timeout: Duration,
    ) -> Result<String, TiergateError> {
        let response = self.post_generate(request, Some(timeout)).await?;
        let chunk: GenerateChunk = response
            .json()
            .await
            .map_err(|e| TiergateError::transport("failed to parse generate response", e))?;
        if let Some(error) = chunk.error {
            return Err(TiergateError::Transport {
                message: format!("ollama: {error}"),
                source: None,
            });
        }
        Ok(chunk.response)
    }

    /// Incremental completion, one fragment per NDJSON line. A gap longer
    /// than `idle` between lines ends the stream with a timeout error.
    pub async fn generate_stream(
        &self,
        request: &GenerateRequest,
        idle: Duration,
    ) -> Result<FragmentStream, TiergateError> {
        let response = self.post_generate(request, None).await?;
        let fragments = ndjson::fragments(Box::pin(response.bytes_stream()));
        Ok(idle_bounded(fragments, idle))
    }

    async fn post_generate(
        &self,
        request: &GenerateRequest,
        timeout: Option<Duration>,
    ) -> Result<reqwest::Response, TiergateError> {
        let url = format!("{}/api/generate", self.host);
        let mut builder = self.client.post(&url).json(request);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                TiergateError::Timeout {
                    duration: timeout.unwrap_or_default(),
                }
            } else {
                TiergateError::transport(format!("POST {url} failed"), e)
            }
        })?;

        let status = response.status();
        debug!(status = %status, model = %request.model, stream = request.stream, "generate response");
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TiergateError::Transport {
                message: format!("ollama returned {status}: {body}"),
                source: None,
            });
        }
        Ok(response)
    }

    /// Forwards a message-block body to Ollama's own `/v1/messages`. The
    /// relayed body ends with a timeout error once it stalls for `idle`.
    pub async fn native_messages(
        &self,
        body: &Value,
        idle: Duration,
    ) -> Result<NativeReply, TiergateError> {
        let url = format!("{}/v1/messages", self.host);
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer ollama"));
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(NATIVE_API_VERSION),
        );

        let response = self
            .client
            .post(&url)
            .headers(headers)
            .json(body)
            .send()
            .await
            .map_err(|e| TiergateError::transport(format!("POST {url} failed"), e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Ok(NativeReply::Rejected(HttpFailure {
                status: status.as_u16(),
                body,
            }));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/json")
            .to_string();
        let body: ByteStream = Box::pin(
            response
                .bytes_stream()
                .map_err(|e| TiergateError::transport("passthrough read failed", e)),
        );
        Ok(NativeReply::Bytes {
            content_type,
            body: idle_bounded(body, idle),
        })
    }
}

type Fallible<T> = Pin<Box<dyn Stream<Item = Result<T, TiergateError>> + Send>>;

/// Ends `inner` with [`TiergateError::Timeout`] when no item arrives within
/// `idle` of the previous one.
fn idle_bounded<T: Send + 'static>(inner: Fallible<T>, idle: Duration) -> Fallible<T> {
    Box::pin(stream::unfold(Some(inner), move |inner| async move {
        let mut inner = inner?;
        match tokio::time::timeout(idle, inner.next()).await {
            Ok(Some(item)) => Some((item, Some(inner))),
            Ok(None) => None,
            Err(_) => {
                debug!(?idle, "ollama stream stalled");
                Some((Err(TiergateError::Timeout { duration: idle }), None))
            }
        }
    }))
}

/// Picks the first candidate whose base name (text before `:`) appears in
/// any installed model name, returning that installed name.
pub fn resolve_model(candidates: &[String], installed: &[String]) -> Option<String> {
    candidates.iter().find_map(|candidate| {
        let base = candidate.split(':').next().unwrap_or(candidate);
        installed.iter().find(|name| name.contains(base)).cloned()
    })
}
