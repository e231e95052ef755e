// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes,
//! such as bindable addresses, positive timeouts and well-formed model patterns.

use std::collections::HashMap;

use tiergate_core::Tier;

use crate::diagnostic::ConfigError;
use crate::model::{ClaudeTransport, TiergateConfig};

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &TiergateConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut push = |message: String| errors.push(ConfigError::Validation { message });

    let host = config.server.host.trim();
    if host.is_empty() {
        push("server.host must not be empty".to_string());
    } else {
        let is_valid_ip = host.parse::<std::net::IpAddr>().is_ok();
        let is_valid_hostname = host
            .chars()
            .all(|c| c.is_alphanumeric() || c == '.' || c == '-' || c == ':');
        if !is_valid_ip && !is_valid_hostname {
            push(format!(
                "server.host `{host}` is not a valid IP address or hostname"
            ));
        }
    }

    if config.server.port == 0 {
        push("server.port must be non-zero".to_string());
    }

    // A model pattern claimed by two tiers would make classification order-dependent.
    let mut owners: HashMap<&str, Tier> = HashMap::new();
    for tier in Tier::ALL {
        let policy = config.routing.policy(tier);
        if policy.timeout_secs == 0 {
            push(format!("routing.{tier}.timeout_secs must be at least 1"));
        }
        if policy.max_retries == 0 {
            push(format!("routing.{tier}.max_retries must be at least 1"));
        }
        for pattern in &policy.models {
            if pattern.trim().is_empty() {
                push(format!("routing.{tier}.models contains an empty entry"));
            } else if pattern.trim_end_matches('*').contains('*') {
                push(format!(
                    "routing.{tier}.models entry `{pattern}` may only use `*` as a trailing wildcard"
                ));
            }
            if let Some(owner) = owners.insert(pattern.as_str(), tier)
                && owner != tier
            {
                push(format!(
                    "model `{pattern}` is listed under both routing.{owner} and routing.{tier}"
                ));
            }
        }
    }

    if !config.ollama.host.starts_with("http://") && !config.ollama.host.starts_with("https://") {
        push(format!(
            "ollama.host `{}` must start with http:// or https://",
            config.ollama.host
        ));
    }
    if config.ollama.model.trim().is_empty() {
        push("ollama.model must not be empty".to_string());
    }
    if !(0.0..=2.0).contains(&config.ollama.temperature) {
        push(format!(
            "ollama.temperature must be between 0.0 and 2.0, got {}",
            config.ollama.temperature
        ));
    }

    if config.gemini.cli_command.trim().is_empty() {
        push("gemini.cli_command must not be empty".to_string());
    }
    if config.gemini.default_model.trim().is_empty() {
        push("gemini.default_model must not be empty".to_string());
    }

    match config.claude.transport {
        ClaudeTransport::Cli => {
            if config.claude.cli_command.trim().is_empty() {
                push("claude.cli_command must not be empty".to_string());
            }
        }
        ClaudeTransport::Api => {
            if !config.claude.api_base_url.starts_with("https://")
                && !config.claude.api_base_url.starts_with("http://")
            {
                push(format!(
                    "claude.api_base_url `{}` must be an http(s) URL",
                    config.claude.api_base_url
                ));
            }
            if config.claude.max_tokens == 0 {
                push("claude.max_tokens must be at least 1".to_string());
            }
        }
    }

    if let Some(dir) = &config.history.dir
        && dir.trim().is_empty()
    {
        push("history.dir must not be empty when set".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
