// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the tiergate router.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tiergate_core::Tier;

/// Top-level tiergate configuration.
///
/// Built once at startup and passed by reference into the router and each
/// adapter constructor. All sections are optional and default to values that
/// work against a stock local install.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TiergateConfig {
    /// HTTP listener settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Per-tier policy and escalation settings.
    #[serde(default)]
    pub routing: RoutingConfig,

    /// Primary tier (local Ollama server).
    #[serde(default)]
    pub ollama: OllamaConfig,

    /// Secondary tier (Gemini CLI with account auth).
    #[serde(default)]
    pub gemini: GeminiConfig,

    /// Last-resort tier (Claude CLI or API).
    #[serde(default)]
    pub claude: ClaudeConfig,

    /// Routing history log location.
    #[serde(default)]
    pub history: HistoryConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Address to bind.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind. `ROUTER_PORT` overrides this.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    4000
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Routing policy: one [`TierPolicy`] per tier plus the escalation switch.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RoutingConfig {
    /// Move to the next tier when the current one exhausts its retries.
    #[serde(default = "default_true")]
    pub escalate_on_failure: bool,

    #[serde(default = "default_primary_policy")]
    pub primary: TierPolicy,

    #[serde(default = "default_secondary_policy")]
    pub secondary: TierPolicy,

    #[serde(default = "default_last_resort_policy")]
    pub last_resort: TierPolicy,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            escalate_on_failure: true,
            primary: default_primary_policy(),
            secondary: default_secondary_policy(),
            last_resort: default_last_resort_policy(),
        }
    }
}

impl RoutingConfig {
    /// Policy bound to `tier`.
    pub fn policy(&self, tier: Tier) -> &TierPolicy {
        match tier {
            Tier::Primary => &self.primary,
            Tier::Secondary => &self.secondary,
            Tier::LastResort => &self.last_resort,
        }
    }

    pub fn policy_mut(&mut self, tier: Tier) -> &mut TierPolicy {
        match tier {
            Tier::Primary => &mut self.primary,
            Tier::Secondary => &mut self.secondary,
            Tier::LastResort => &mut self.last_resort,
        }
    }
}

/// Timeout, retry budget and model set for one tier.
///
/// `models` entries match a request's model id exactly, or by prefix when the
/// entry ends in `*`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TierPolicy {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default)]
    pub models: Vec<String>,
}

impl TierPolicy {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for TierPolicy {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            models: Vec::new(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_max_retries() -> u32 {
    2
}

fn default_primary_policy() -> TierPolicy {
    TierPolicy::default()
}

fn default_secondary_policy() -> TierPolicy {
    TierPolicy {
        timeout_secs: 90,
        max_retries: default_max_retries(),
        models: strings(&[
            "gemini-2.5-pro",
            "gemini-2.5-flash",
            "gemini-2.0-flash",
            "gemini-3-flash-preview",
            "gemini-3-pro-preview",
            "gemini-proxy",
            "gemini-*",
        ]),
    }
}

fn default_last_resort_policy() -> TierPolicy {
    TierPolicy {
        timeout_secs: 180,
        max_retries: default_max_retries(),
        models: strings(&["claude-real", "claude-account", "claude-opus-4-6", "claude-opus"]),
    }
}

/// Primary tier: a local Ollama server.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct OllamaConfig {
    /// Base URL of the Ollama server.
    #[serde(default = "default_ollama_host")]
    pub host: String,

    /// Model used with the generate endpoint.
    #[serde(default = "default_ollama_model")]
    pub model: String,

    /// Model substituted into passthrough message-block requests.
    #[serde(default = "default_ollama_native_model")]
    pub native_model: String,

    /// Tried in order when `model` is not installed.
    #[serde(default = "default_ollama_fallbacks")]
    pub fallback_models: Vec<String>,

    /// Forward message-block requests to Ollama's own `/v1/messages`.
    #[serde(default = "default_true")]
    pub native_passthrough: bool,

    #[serde(default = "default_temperature")]
    pub temperature: f64,

    /// Sent to Ollama as `num_ctx`.
    #[serde(default = "default_context_length")]
    pub context_length: u32,

    /// System prompt used when a request carries none.
    #[serde(default = "default_ollama_system_prompt")]
    pub system_prompt: String,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: default_ollama_host(),
            model: default_ollama_model(),
            native_model: default_ollama_native_model(),
            fallback_models: default_ollama_fallbacks(),
            native_passthrough: true,
            temperature: default_temperature(),
            context_length: default_context_length(),
            system_prompt: default_ollama_system_prompt(),
        }
    }
}

fn default_ollama_host() -> String {
    "http://127.0.0.1:11434".to_string()
}

fn default_ollama_model() -> String {
    "qwen3-coder:480b".to_string()
}

fn default_ollama_native_model() -> String {
    "qwen3-coder:480b-cloud".to_string()
}

fn default_ollama_fallbacks() -> Vec<String> {
    strings(&["qwen3-coder:32b", "qwen2.5-coder:32b", "qwen3:30b"])
}

fn default_temperature() -> f64 {
    0.1
}

fn default_context_length() -> u32 {
    32768
}

fn default_ollama_system_prompt() -> String {
    "You are an expert AI assistant. Be precise, thorough, and helpful.".to_string()
}

/// Secondary tier: the Gemini CLI using account (OAuth) credentials.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GeminiConfig {
    /// CLI executable. `GEMINI_BIN` overrides this.
    #[serde(default = "default_gemini_cli")]
    pub cli_command: String,

    /// Model used when the request's model is not one the CLI accepts.
    #[serde(default = "default_gemini_model")]
    pub default_model: String,

    /// Tried once after the first candidate fails.
    #[serde(default = "default_gemini_fallback")]
    pub fallback_model: String,

    /// Model ids passed to the CLI unchanged.
    #[serde(default = "default_gemini_models")]
    pub models: Vec<String>,

    /// Request model ids rewritten before candidate selection.
    #[serde(default = "default_gemini_aliases")]
    pub aliases: BTreeMap<String, String>,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            cli_command: default_gemini_cli(),
            default_model: default_gemini_model(),
            fallback_model: default_gemini_fallback(),
            models: default_gemini_models(),
            aliases: default_gemini_aliases(),
        }
    }
}

fn default_gemini_cli() -> String {
    "gemini".to_string()
}

fn default_gemini_model() -> String {
    "gemini-2.5-pro".to_string()
}

fn default_gemini_fallback() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_gemini_models() -> Vec<String> {
    strings(&[
        "gemini-2.5-pro",
        "gemini-2.5-flash",
        "gemini-2.0-flash",
        "gemini-2.0-pro",
        "gemini-3-flash-preview",
        "gemini-3-pro-preview",
    ])
}

fn default_gemini_aliases() -> BTreeMap<String, String> {
    BTreeMap::from([("gemini-proxy".to_string(), "gemini-2.5-flash".to_string())])
}

/// How the last-resort tier reaches Claude.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ClaudeTransport {
    /// The `claude` CLI with its logged-in account.
    #[default]
    Cli,
    /// The Messages API with `api_key`.
    Api,
}

/// Last-resort tier: Claude via CLI or API.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ClaudeConfig {
    #[serde(default)]
    pub transport: ClaudeTransport,

    /// CLI executable. `CLAUDE_BIN` overrides this.
    #[serde(default = "default_claude_cli")]
    pub cli_command: String,

    #[serde(default = "default_claude_model")]
    pub default_model: String,

    /// Request model ids passed through to Claude unchanged.
    #[serde(default = "default_claude_models")]
    pub models: Vec<String>,

    /// API key. `ANTHROPIC_API_KEY` overrides this.
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Optional `anthropic-beta` header value.
    #[serde(default)]
    pub beta: Option<String>,

    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for ClaudeConfig {
    fn default() -> Self {
        Self {
            transport: ClaudeTransport::default(),
            cli_command: default_claude_cli(),
            default_model: default_claude_model(),
            models: default_claude_models(),
            api_key: None,
            api_version: default_api_version(),
            beta: None,
            api_base_url: default_api_base_url(),
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_claude_cli() -> String {
    "claude".to_string()
}

fn default_claude_model() -> String {
    "claude-sonnet-4-6".to_string()
}

fn default_claude_models() -> Vec<String> {
    strings(&["claude-sonnet-4-6", "claude-opus-4-6", "claude-haiku-4-5"])
}

fn default_api_version() -> String {
    "2023-06-01".to_string()
}

fn default_api_base_url() -> String {
    "https://api.anthropic.com/v1/messages".to_string()
}

fn default_max_tokens() -> u32 {
    8192
}

/// Where routing history and the session snapshot are written.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct HistoryConfig {
    /// Root directory. Defaults to `~/.tiergate`.
    #[serde(default)]
    pub dir: Option<String>,
}

impl HistoryConfig {
    /// Resolved history root, or `None` when no home directory is known.
    pub fn resolved_dir(&self) -> Option<PathBuf> {
        match &self.dir {
            Some(dir) => Some(PathBuf::from(dir)),
            None => dirs::home_dir().map(|home| home.join(".tiergate")),
        }
    }
}

fn default_true() -> bool {
    true
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policies_match_tier_budgets() {
        let routing = RoutingConfig::default();
        assert_eq!(routing.policy(Tier::Primary).timeout_secs, 120);
        assert_eq!(routing.policy(Tier::Secondary).timeout_secs, 90);
        assert_eq!(routing.policy(Tier::LastResort).timeout_secs, 180);
        for tier in Tier::ALL {
            assert_eq!(routing.policy(tier).max_retries, 2);
        }
        assert!(routing.primary.models.is_empty());
        assert!(routing.secondary.models.contains(&"gemini-*".to_string()));
    }

    #[test]
    fn partial_tier_table_keeps_other_defaults() {
        let config: TiergateConfig = toml::from_str(
            r#"
[routing.secondary]
max_retries = 1
"#,
        )
        .unwrap();
        assert_eq!(config.routing.secondary.max_retries, 1);
        assert_eq!(config.routing.secondary.timeout_secs, 120);
        assert!(config.routing.secondary.models.is_empty());
        assert_eq!(config.routing.last_resort.timeout_secs, 180);
    }

    #[test]
    fn claude_transport_parses_lowercase() {
        let config: TiergateConfig = toml::from_str("[claude]\ntransport = \"api\"\n").unwrap();
        assert_eq!(config.claude.transport, ClaudeTransport::Api);
        assert!(toml::from_str::<TiergateConfig>("[claude]\ntransport = \"grpc\"\n").is_err());
    }

    #[test]
    fn history_dir_override_is_used_verbatim() {
        let history = HistoryConfig {
            dir: Some("/var/lib/tiergate".into()),
        };
        assert_eq!(history.resolved_dir(), Some(PathBuf::from("/var/lib/tiergate")));
    }

    #[test]
    fn tier_policy_timeout_is_seconds() {
        let policy = TierPolicy {
            timeout_secs: 7,
            ..TierPolicy::default()
        };
        assert_eq!(policy.timeout(), Duration::from_secs(7));
    }
}
