// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Last-resort tier adapter for Claude.
//!
//! Two transports, picked by `claude.transport`: the `claude` CLI using the
//! account it is logged in with, or the Messages API with a key. Every
//! failure is returned as bracketed diagnostic text.

pub mod cli;
pub mod client;
pub mod sse;
pub mod types;

use std::time::Duration;

use async_trait::async_trait;
use tiergate_config::model::ClaudeConfig;
use tiergate_config::{ClaudeTransport, TiergateConfig};
use tiergate_core::{
    AdapterOutcome, BackendAdapter, FailureKind, HealthStatus, Invocation, PluginAdapter,
    ScopedProcess, Tier, TiergateError,
};
use tracing::{info, warn};

use crate::client::ApiClient;
use crate::types::{ApiMessage, MessageRequest};

const VERSION_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

const MISSING_KEY: &str = "[Claude API key not configured]";

/// Backend adapter for the last-resort tier.
pub struct ClaudeAdapter {
    config: ClaudeConfig,
    timeout: Duration,
    /// Built only for the API transport with a key present.
    api: Option<ApiClient>,
}

impl ClaudeAdapter {
    pub fn new(config: &TiergateConfig) -> Result<Self, TiergateError> {
        let claude = config.claude.clone();
        let api = match (claude.transport, api_key(&claude)) {
            (ClaudeTransport::Api, Some(key)) => Some(ApiClient::new(&claude, key)?),
            _ => None,
        };
        Ok(Self {
            config: claude,
            timeout: config.routing.last_resort.timeout(),
            api,
        })
    }

    /// The requested model when Claude knows it, else the default.
    pub fn model_for(&self, hint: Option<&str>) -> &str {
        hint.and_then(|h| self.config.models.iter().find(|m| m.as_str() == h))
            .map(String::as_str)
            .unwrap_or(&self.config.default_model)
    }

    async fn invoke_cli(&self, model: &str, invocation: &Invocation) -> AdapterOutcome {
        let process = cli::command(
            &self.config.cli_command,
            model,
            &invocation.prompt,
            self.timeout,
        );

        if invocation.stream {
            return match cli::stream(&process) {
                Ok(fragments) => AdapterOutcome::fragments(fragments),
                Err(e) => failure_outcome(&e),
            };
        }

        match cli::run(&process).await {
            Ok(Ok(text)) if !text.is_empty() => AdapterOutcome::text(text),
            Ok(Ok(_)) => {
                AdapterOutcome::failed(FailureKind::EmptyResponse, "[Claude error: empty response]")
            }
            Ok(Err(diagnostic)) => {
                warn!(diagnostic = %diagnostic, "claude cli exited with failure");
                AdapterOutcome::failed(FailureKind::Transport, diagnostic)
            }
            Err(e) => failure_outcome(&e),
        }
    }

    async fn invoke_api(&self, model: &str, invocation: Invocation) -> AdapterOutcome {
        let Some(client) = &self.api else {
            warn!("last-resort tier set to api transport without a key");
            return AdapterOutcome::failed(FailureKind::AuthRequired, MISSING_KEY);
        };

        let request = MessageRequest {
            model: model.to_string(),
            max_tokens: self.config.max_tokens,
            system: invocation.system.filter(|s| !s.trim().is_empty()),
            messages: vec![ApiMessage {
                role: "user".into(),
                content: invocation.prompt,
            }],
            stream: invocation.stream,
        };

        if request.stream {
            match client.stream_message(&request).await {
                Ok(fragments) => AdapterOutcome::fragments(fragments),
                Err(e) => failure_outcome(&e),
            }
        } else {
            match client.complete_message(&request).await {
                Ok(response) => {
                    let text = response.text();
                    if text.trim().is_empty() {
                        AdapterOutcome::failed(
                            FailureKind::EmptyResponse,
                            "[Claude error: empty response]",
                        )
                    } else {
                        AdapterOutcome::text(text)
                    }
                }
                Err(e) => failure_outcome(&e),
            }
        }
    }
}

fn api_key(config: &ClaudeConfig) -> Option<&str> {
    config
        .api_key
        .as_deref()
        .map(str::trim)
        .filter(|k| !k.is_empty())
}

fn failure_outcome(err: &TiergateError) -> AdapterOutcome {
    warn!(error = %err, "claude call failed");
    AdapterOutcome::failed(FailureKind::from(err), format!("[Claude error: {err}]"))
}

#[async_trait]
impl PluginAdapter for ClaudeAdapter {
    fn name(&self) -> &str {
        match self.config.transport {
            ClaudeTransport::Cli => "claude-cli",
            ClaudeTransport::Api => "claude-api",
        }
    }

    async fn health_check(&self) -> HealthStatus {
        match self.config.transport {
            ClaudeTransport::Api if self.api.is_some() => HealthStatus::Healthy,
            ClaudeTransport::Api => HealthStatus::Unhealthy("no API key configured".into()),
            ClaudeTransport::Cli => {
                let probe = ScopedProcess::new(&self.config.cli_command, VERSION_PROBE_TIMEOUT)
                    .arg("--version")
                    .run()
                    .await;
                match probe {
                    Ok(out) if out.success => HealthStatus::Healthy,
                    Ok(out) => HealthStatus::Unhealthy(format!(
                        "`{} --version` exited with {:?}",
                        self.config.cli_command, out.code
                    )),
                    Err(e) => HealthStatus::Unhealthy(e.to_string()),
                }
            }
        }
    }
}

#[async_trait]
impl BackendAdapter for ClaudeAdapter {
    fn tier(&self) -> Tier {
        Tier::LastResort
    }

    fn model_label(&self) -> &str {
        &self.config.default_model
    }

    async fn invoke(&self, invocation: Invocation) -> AdapterOutcome {
        let model = self
            .model_for(invocation.model_hint.as_deref())
            .to_string();
        info!(model = %model, transport = ?self.config.transport, stream = invocation.stream, "last-resort tier invoking claude");
        match self.config.transport {
            ClaudeTransport::Cli => self.invoke_cli(&model, &invocation).await,
            ClaudeTransport::Api => self.invoke_api(&model, invocation).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use tiergate_core::Payload;
    use wiremock::matchers::{body_partial_json, header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn invocation(stream: bool) -> Invocation {
        Invocation {
            prompt: "[System: be brief]\nping".into(),
            system: Some("be brief".into()),
            model_hint: Some("claude-opus-4-6".into()),
            stream,
            native_body: None,
        }
    }

    fn api_adapter(server: &MockServer, key: Option<&str>) -> ClaudeAdapter {
        let mut config = TiergateConfig::default();
        config.claude.transport = ClaudeTransport::Api;
        config.claude.api_key = key.map(str::to_string);
        config.claude.api_base_url = format!("{}/v1/messages", server.uri());
        ClaudeAdapter::new(&config).unwrap()
    }

    #[test]
    fn model_hint_must_be_known() {
        let adapter = ClaudeAdapter::new(&TiergateConfig::default()).unwrap();
        assert_eq!(adapter.model_for(Some("claude-opus-4-6")), "claude-opus-4-6");
        assert_eq!(adapter.model_for(Some("claude-real")), "claude-sonnet-4-6");
        assert_eq!(adapter.model_for(None), "claude-sonnet-4-6");
        assert_eq!(adapter.tier(), Tier::LastResort);
        assert_eq!(adapter.name(), "claude-cli");
    }

    #[tokio::test]
    async fn api_without_key_needs_auth() {
        let server = MockServer::start().await;
        let adapter = api_adapter(&server, Some("   "));
        let outcome = adapter.invoke(invocation(false)).await;
        assert!(!outcome.ok);
        assert_eq!(outcome.failure, Some(FailureKind::AuthRequired));
        assert_eq!(outcome.text_ref(), Some(MISSING_KEY));
        assert!(!adapter.health_check().await.is_available());
    }

    #[tokio::test]
    async fn api_complete_sends_model_and_system() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("x-api-key", "sk-test"))
            .and(body_partial_json(serde_json::json!({
                "model": "claude-opus-4-6",
                "system": "be brief",
                "max_tokens": 8192,
                "stream": false,
                "messages": [{"role": "user", "content": "[System: be brief]\nping"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "content": [{"type": "text", "text": "pong"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let adapter = api_adapter(&server, Some("sk-test"));
        assert_eq!(adapter.health_check().await, HealthStatus::Healthy);
        let outcome = adapter.invoke(invocation(false)).await;
        assert!(outcome.ok);
        assert_eq!(outcome.text_ref(), Some("pong"));
    }

    #[tokio::test]
    async fn api_rejection_is_bracketed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let outcome = api_adapter(&server, Some("sk-bad"))
            .invoke(invocation(false))
            .await;
        assert_eq!(outcome.failure, Some(FailureKind::AuthRequired));
        let text = outcome.text_ref().unwrap();
        assert!(text.starts_with("[Claude error: "));
        assert!(text.ends_with(']'));
    }

    #[tokio::test]
    async fn api_stream_yields_fragments() {
        let server = MockServer::start().await;
        let sse = concat!(
            "event: content_block_delta\ndata: {\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"po\"}}\n\n",
            "event: content_block_delta\ndata: {\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"ng\"}}\n\n",
        );
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(sse, "text/event-stream"),
            )
            .mount(&server)
            .await;

        let outcome = api_adapter(&server, Some("sk-test"))
            .invoke(invocation(true))
            .await;
        let Payload::Fragments(stream) = outcome.payload else {
            panic!("expected fragments");
        };
        let parts: Vec<String> = stream.map(|f| f.unwrap()).collect().await;
        assert_eq!(parts.concat(), "pong");
    }

    #[cfg(unix)]
    mod cli_transport {
        use super::*;
        use tiergate_test_utils::fake_cli;

        fn cli_adapter(cli: &std::path::Path) -> ClaudeAdapter {
            let mut config = TiergateConfig::default();
            config.claude.cli_command = cli.display().to_string();
            config.routing.last_resort.timeout_secs = 10;
            ClaudeAdapter::new(&config).unwrap()
        }

        #[tokio::test]
        async fn blocking_returns_trimmed_stdout() {
            let dir = tempfile::tempdir().unwrap();
            let cli = fake_cli(dir.path(), "claude", r#"echo "  model=$2 "; cat >/dev/null"#);
            let outcome = cli_adapter(&cli).invoke(invocation(false)).await;
            assert!(outcome.ok);
            assert_eq!(outcome.text_ref(), Some("model=claude-opus-4-6"));
        }

        #[tokio::test]
        async fn blocking_failure_carries_stderr() {
            let dir = tempfile::tempdir().unwrap();
            let cli = fake_cli(dir.path(), "claude", "echo 'usage limit' >&2; exit 1");
            let outcome = cli_adapter(&cli).invoke(invocation(false)).await;
            assert!(!outcome.ok);
            assert_eq!(outcome.text_ref(), Some("[Claude error: usage limit]"));
        }

        #[tokio::test]
        async fn streaming_ends_with_exit_error() {
            let dir = tempfile::tempdir().unwrap();
            let cli = fake_cli(dir.path(), "claude", "echo partial; echo died >&2; exit 3");
            let outcome = cli_adapter(&cli).invoke(invocation(true)).await;
            assert!(outcome.ok);
            let text = outcome.payload.collect_text().await;
            assert_eq!(
                text,
                "partial\n\n[stream error: process error: [Claude error: died]]"
            );
        }

        #[tokio::test]
        async fn missing_binary_is_unhealthy() {
            let adapter = cli_adapter(std::path::Path::new("/nonexistent/claude"));
            assert!(!adapter.health_check().await.is_available());
            let outcome = adapter.invoke(invocation(false)).await;
            assert_eq!(outcome.failure, Some(FailureKind::Transport));
            assert!(outcome.text_ref().unwrap().starts_with("[Claude error: "));
        }
    }
}
