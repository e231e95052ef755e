// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Secondary-tier adapter driving the Gemini CLI.
//!
//! The CLI authenticates with the account session established by
//! `gemini auth login`; no key is passed per call. Each invocation tries a
//! short list of candidate models in order and accepts the first one that
//! exits cleanly with non-empty output.

use std::time::Duration;

use async_trait::async_trait;
use tiergate_config::TiergateConfig;
use tiergate_config::model::GeminiConfig;
use tiergate_core::{
    AdapterOutcome, BackendAdapter, FailureKind, HealthStatus, Invocation, PluginAdapter,
    ScopedProcess, Tier, TiergateError,
};
use tracing::{debug, info, warn};

const VERSION_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Backend adapter for the secondary tier.
pub struct GeminiAdapter {
    config: GeminiConfig,
    timeout: Duration,
}

impl GeminiAdapter {
    pub fn new(config: &TiergateConfig) -> Self {
        Self {
            config: config.gemini.clone(),
            timeout: config.routing.secondary.timeout(),
        }
    }

    /// Models to try, in order, for a request that asked for `hint`.
    pub fn candidates(&self, hint: Option<&str>) -> Vec<String> {
        let requested = hint
            .map(|h| self.config.aliases.get(h).map(String::as_str).unwrap_or(h))
            .filter(|m| self.config.models.iter().any(|known| known.as_str() == *m));

        let first = requested
            .unwrap_or(self.config.default_model.as_str())
            .to_string();
        let mut candidates = vec![first];
        if !candidates.contains(&self.config.fallback_model) {
            candidates.push(self.config.fallback_model.clone());
        }
        candidates
    }

    fn command(&self, model: &str, prompt: &str) -> ScopedProcess {
        ScopedProcess::new(&self.config.cli_command, self.timeout)
            .args(["--model", model, "-p", prompt])
            .env("GOOGLE_GENAI_USE_GCA", "true")
    }
}

fn mentions_auth(stderr: &str) -> bool {
    let lower = stderr.to_lowercase();
    lower.contains("auth") || lower.contains("login")
}

#[async_trait]
impl PluginAdapter for GeminiAdapter {
    fn name(&self) -> &str {
        "gemini-cli"
    }

    async fn health_check(&self) -> HealthStatus {
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

#[async_trait]
impl BackendAdapter for GeminiAdapter {
    fn tier(&self) -> Tier {
        Tier::Secondary
    }

    fn model_label(&self) -> &str {
        &self.config.default_model
    }

    async fn invoke(&self, invocation: Invocation) -> AdapterOutcome {
        for model in self.candidates(invocation.model_hint.as_deref()) {
            info!(model = %model, "secondary tier invoking gemini cli");
            match self.command(&model, &invocation.prompt).run().await {
                Ok(out) if out.success && !out.stdout.trim().is_empty() => {
                    return AdapterOutcome::text(out.stdout.trim());
                }
                Ok(out) if mentions_auth(&out.stderr) => {
                    warn!(model = %model, "gemini cli needs authentication");
                    return AdapterOutcome::failed(
                        FailureKind::AuthRequired,
                        "Gemini auth required: run `gemini auth login`",
                    );
                }
                Ok(out) => {
                    debug!(model = %model, code = ?out.code, stderr = %out.stderr.trim(), "gemini candidate produced nothing");
                }
                Err(TiergateError::Timeout { .. }) => {
                    warn!(model = %model, timeout = ?self.timeout, "gemini cli timed out");
                    return AdapterOutcome::failed(FailureKind::Timeout, "Gemini timeout");
                }
                Err(e) => {
                    warn!(model = %model, error = %e, "gemini cli fault");
                    return AdapterOutcome::failed(
                        FailureKind::Transport,
                        format!("Gemini error: {e}"),
                    );
                }
            }
        }
        AdapterOutcome::failed(FailureKind::EmptyResponse, "Gemini: no response")
    }
}
