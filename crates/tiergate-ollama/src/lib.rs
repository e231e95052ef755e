// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Primary-tier adapter for a local Ollama server.
//!
//! Message-block requests are forwarded untouched to Ollama's own
//! `/v1/messages` when passthrough is enabled; everything else is flattened
//! and sent to `/api/generate`, streaming as newline-delimited JSON.

pub mod client;
pub mod ndjson;

use std::time::Duration;

use async_trait::async_trait;
use tiergate_config::TiergateConfig;
use tiergate_config::model::OllamaConfig;
use tiergate_core::{
    AdapterOutcome, BackendAdapter, FailureKind, HealthStatus, Invocation, PluginAdapter, Tier,
    TiergateError,
};
use tracing::{debug, info, warn};

use crate::client::{GenerateOptions, GenerateRequest, NativeReply, OllamaClient, resolve_model};

/// Backend adapter for the primary tier.
pub struct OllamaAdapter {
    client: OllamaClient,
    config: OllamaConfig,
    timeout: Duration,
}

impl OllamaAdapter {
    pub fn new(config: &TiergateConfig) -> Result<Self, TiergateError> {
        Ok(Self {
            client: OllamaClient::new(&config.ollama.host)?,
            config: config.ollama.clone(),
            timeout: config.routing.primary.timeout(),
        })
    }

    fn candidates(&self) -> Vec<String> {
        std::iter::once(self.config.model.clone())
            .chain(self.config.fallback_models.iter().cloned())
            .collect()
    }

    /// Installed model to use. An unreachable tag listing falls back to the
    /// configured model as-is; a reachable listing with no match is `None`.
    async fn pick_model(&self) -> Option<String> {
        match self.client.list_models().await {
            Ok(installed) => resolve_model(&self.candidates(), &installed),
            Err(e) => {
                debug!(error = %e, "model listing unavailable, using configured model");
                Some(self.config.model.clone())
            }
        }
    }

    async fn passthrough(&self, mut body: serde_json::Value, stream: bool) -> AdapterOutcome {
        if let Some(object) = body.as_object_mut() {
            object.insert("model".into(), self.config.native_model.clone().into());
            object.insert("stream".into(), stream.into());
        }

        match self.client.native_messages(&body, self.timeout).await {
            Ok(NativeReply::Bytes { content_type, body }) => {
                AdapterOutcome::passthrough(content_type, body)
            }
            Ok(NativeReply::Rejected(failure)) => {
                warn!(status = failure.status, "ollama passthrough rejected");
                AdapterOutcome::failed(
                    FailureKind::Transport,
                    format!("[Primary error {}: {}]", failure.status, failure.body),
                )
            }
            Err(e) => failure_outcome(&e),
        }
    }

    async fn generate(&self, invocation: Invocation) -> AdapterOutcome {
        let Some(model) = self.pick_model().await else {
            warn!(model = %self.config.model, "no configured ollama model is installed");
            return AdapterOutcome::failed(
                FailureKind::EmptyResponse,
                format!("[Primary error: model not available ({})]", self.config.model),
            );
        };
        info!(model = %model, stream = invocation.stream, "primary tier generating");

        let system = invocation
            .system
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| self.config.system_prompt.clone());
        let request = GenerateRequest {
            model,
            prompt: invocation.prompt,
            system,
            stream: invocation.stream,
            options: GenerateOptions {
                temperature: self.config.temperature,
                num_ctx: self.config.context_length,
            },
        };

        if request.stream {
            match self.client.generate_stream(&request, self.timeout).await {
                Ok(stream) => AdapterOutcome::fragments(stream),
                Err(e) => failure_outcome(&e),
            }
        } else {
            match self.client.generate(&request, self.timeout).await {
                Ok(text) if !text.trim().is_empty() => AdapterOutcome::text(text),
                Ok(_) => AdapterOutcome::failed(
                    FailureKind::EmptyResponse,
                    "[Primary error: empty response]",
                ),
                Err(e) => failure_outcome(&e),
            }
        }
    }
}

fn failure_outcome(err: &TiergateError) -> AdapterOutcome {
    warn!(error = %err, "ollama call failed");
    AdapterOutcome::failed(FailureKind::from(err), format!("[Primary error: {err}]"))
}

#[async_trait]
impl PluginAdapter for OllamaAdapter {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn health_check(&self) -> HealthStatus {
        match self.client.list_models().await {
            Ok(installed) => match resolve_model(&self.candidates(), &installed) {
                Some(_) => HealthStatus::Healthy,
                None => HealthStatus::Degraded(format!(
                    "ollama reachable but `{}` is not installed",
                    self.config.model
                )),
            },
            Err(e) => HealthStatus::Unhealthy(format!(
                "ollama unreachable at {}: {e}",
                self.client.host()
            )),
        }
    }
}

#[async_trait]
impl BackendAdapter for OllamaAdapter {
    fn tier(&self) -> Tier {
        Tier::Primary
    }

    fn model_label(&self) -> &str {
        &self.config.model
    }

    async fn invoke(&self, invocation: Invocation) -> AdapterOutcome {
        if self.config.native_passthrough
            && let Some(body) = invocation.native_body.clone()
        {
            return self.passthrough(body, invocation.stream).await;
        }
        self.generate(invocation).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tiergate_core::Payload;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn adapter(server: &MockServer) -> OllamaAdapter {
        let mut config = TiergateConfig::default();
        config.ollama.host = server.uri();
        config.routing.primary.timeout_secs = 5;
        OllamaAdapter::new(&config).unwrap()
    }

    async fn mount_tags(server: &MockServer, names: &[&str]) {
        let models: Vec<_> = names.iter().map(|n| json!({"name": n})).collect();
        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"models": models})))
            .mount(server)
            .await;
    }

    fn invocation(stream: bool) -> Invocation {
        Invocation {
            prompt: "write fizzbuzz".into(),
            stream,
            ..Invocation::default()
        }
    }

    #[tokio::test]
    async fn generate_sends_options_and_default_system() {
        let server = MockServer::start().await;
        mount_tags(&server, &["qwen3-coder:480b"]).await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_partial_json(json!({
                "model": "qwen3-coder:480b",
                "prompt": "write fizzbuzz",
                "stream": false,
                "system": "You are an expert AI assistant. Be precise, thorough, and helpful.",
                "options": {"temperature": 0.1, "num_ctx": 32768}
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"response": "for i in 1..=100 {}", "done": true})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let outcome = adapter(&server).invoke(invocation(false)).await;
        assert!(outcome.ok);
        assert_eq!(outcome.text_ref(), Some("for i in 1..=100 {}"));
    }

    #[tokio::test]
    async fn generate_stream_yields_fragments() {
        let server = MockServer::start().await;
        mount_tags(&server, &["qwen3-coder:480b"]).await;
        let ndjson = "{\"response\":\"fizz\",\"done\":false}\n{\"response\":\"buzz\",\"done\":false}\n{\"response\":\"\",\"done\":true}\n";
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_partial_json(json!({"stream": true})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(ndjson, "application/x-ndjson"),
            )
            .mount(&server)
            .await;

        let outcome = adapter(&server).invoke(invocation(true)).await;
        assert!(outcome.ok);
        assert!(matches!(outcome.payload, Payload::Fragments(_)));
        assert_eq!(outcome.payload.collect_text().await, "fizzbuzz");
    }

    #[tokio::test]
    async fn fallback_model_used_when_primary_missing() {
        let server = MockServer::start().await;
        mount_tags(&server, &["qwen3:30b"]).await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_partial_json(json!({"model": "qwen3:30b"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"response": "ok"})))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = adapter(&server).invoke(invocation(false)).await;
        assert!(outcome.ok, "{:?}", outcome.text_ref());
    }

    #[tokio::test]
    async fn no_installed_candidate_fails_without_generating() {
        let server = MockServer::start().await;
        mount_tags(&server, &["llama3:8b"]).await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let outcome = adapter(&server).invoke(invocation(false)).await;
        assert!(!outcome.ok);
        assert!(outcome.text_ref().unwrap().contains("model not available"));
    }

    #[tokio::test]
    async fn empty_generate_response_is_failure() {
        let server = MockServer::start().await;
        mount_tags(&server, &["qwen3-coder:480b"]).await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"response": "  "})))
            .mount(&server)
            .await;

        let outcome = adapter(&server).invoke(invocation(false)).await;
        assert!(!outcome.ok);
        assert_eq!(outcome.failure, Some(FailureKind::EmptyResponse));
    }

    #[tokio::test]
    async fn passthrough_rewrites_model_and_sends_native_headers() {
        let server = MockServer::start().await;
        let sse = "event: message_start\ndata: {\"type\":\"message_start\"}\n\n";
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("authorization", "Bearer ollama"))
            .and(header("anthropic-version", "2023-06-01"))
            .and(body_partial_json(json!({
                "model": "qwen3-coder:480b-cloud",
                "stream": true,
                "max_tokens": 64
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(sse, "text/event-stream"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let outcome = adapter(&server)
            .invoke(Invocation {
                prompt: "hi".into(),
                stream: true,
                native_body: Some(json!({"model": "claude-sonnet-4-6", "max_tokens": 64, "messages": []})),
                ..Invocation::default()
            })
            .await;
        assert!(outcome.ok);
        match outcome.payload {
            Payload::Passthrough { ref content_type, .. } => {
                assert_eq!(content_type, "text/event-stream");
            }
            ref other => panic!("expected passthrough, got {other:?}"),
        }
        assert_eq!(outcome.payload.collect_text().await, sse);
    }

    #[tokio::test]
    async fn passthrough_non_2xx_is_bracketed_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(404).set_body_string("model not found"))
            .mount(&server)
            .await;

        let outcome = adapter(&server)
            .invoke(Invocation {
                native_body: Some(json!({"messages": []})),
                ..Invocation::default()
            })
            .await;
        assert!(!outcome.ok);
        assert_eq!(
            outcome.text_ref(),
            Some("[Primary error 404: model not found]")
        );
    }

    #[tokio::test]
    async fn unreachable_server_is_transport_failure() {
        let mut config = TiergateConfig::default();
        config.ollama.host = "http://127.0.0.1:9".into();
        let adapter = OllamaAdapter::new(&config).unwrap();

        let outcome = adapter.invoke(invocation(false)).await;
        assert!(!outcome.ok);
        assert_eq!(outcome.failure, Some(FailureKind::Transport));
        assert!(!adapter.health_check().await.is_available());
    }

    #[tokio::test]
    async fn health_is_degraded_when_model_missing() {
        let server = MockServer::start().await;
        mount_tags(&server, &["llama3:8b"]).await;
        assert!(matches!(
            adapter(&server).health_check().await,
            HealthStatus::Degraded(_)
        ));
    }
}
