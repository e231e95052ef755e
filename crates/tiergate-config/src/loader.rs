// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports the hierarchy `./tiergate.toml` > `~/.config/tiergate/tiergate.toml`
//! > `/etc/tiergate/tiergate.toml`, with `TIERGATE_*` environment overrides and
//! the router's legacy raw variables on top.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::TiergateConfig;

/// System-wide config file.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/tiergate/tiergate.toml";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "tiergate.toml";

/// Raw variables honoured without the `TIERGATE_` prefix, and their keys.
const LEGACY_ENV: &[(&str, &str)] = &[
    ("router_port", "server.port"),
    ("claude_bin", "claude.cli_command"),
    ("gemini_bin", "gemini.cli_command"),
    ("anthropic_api_key", "claude.api_key"),
];

/// `TIERGATE_` key prefixes and the dotted paths they map to. Longest first.
const SECTION_PREFIXES: &[(&str, &str)] = &[
    ("routing_last_resort_", "routing.last_resort."),
    ("routing_secondary_", "routing.secondary."),
    ("routing_primary_", "routing.primary."),
    ("routing_", "routing."),
    ("server_", "server."),
    ("ollama_", "ollama."),
    ("gemini_", "gemini."),
    ("claude_", "claude."),
    ("history_", "history."),
];

/// Path of the per-user config file, if a config directory is known.
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("tiergate/tiergate.toml"))
}

/// Load configuration from the standard hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/tiergate/tiergate.toml` (system-wide)
/// 3. `~/.config/tiergate/tiergate.toml` (user config)
/// 4. `./tiergate.toml` (local directory)
/// 5. `TIERGATE_*` environment variables
/// 6. `ROUTER_PORT`, `CLAUDE_BIN`, `GEMINI_BIN`, `ANTHROPIC_API_KEY`
pub fn load_config() -> Result<TiergateConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string over the compiled defaults only.
///
/// Used for testing and explicit configuration.
pub fn load_config_from_str(toml_content: &str) -> Result<TiergateConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(TiergateConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<TiergateConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(TiergateConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .merge(legacy_env_provider())
        .extract()
}

/// Build the Figment used internally for config loading.
///
/// Returns the Figment before extraction so callers can inspect metadata.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(TiergateConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG_PATH))
        .merge(Toml::file(user_config_path().unwrap_or_default()))
        .merge(Toml::file(LOCAL_CONFIG_FILE))
        .merge(env_provider())
        .merge(legacy_env_provider())
}

/// Maps a lowercased, prefix-stripped `TIERGATE_` key to its dotted path.
///
/// Section names are matched explicitly rather than split on `_`, since
/// keys such as `cli_command` and `routing_last_resort_max_retries` contain
/// underscores of their own.
pub fn map_env_key(key: &str) -> String {
    SECTION_PREFIXES
        .iter()
        .find_map(|(prefix, path)| {
            key.strip_prefix(prefix)
                .map(|rest| format!("{path}{rest}"))
        })
        .unwrap_or_else(|| key.to_string())
}

/// Maps a lowercased raw variable name to its dotted path, if it is one we honour.
pub fn map_legacy_env_key(key: &str) -> Option<&'static str> {
    LEGACY_ENV
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, path)| *path)
}

fn env_provider() -> Env {
    Env::prefixed("TIERGATE_").map(|key| map_env_key(&key.as_str().to_ascii_lowercase()).into())
}

fn legacy_env_provider() -> Env {
    Env::raw()
        .filter(|key| map_legacy_env_key(&key.as_str().to_ascii_lowercase()).is_some())
        .map(|key| {
            map_legacy_env_key(&key.as_str().to_ascii_lowercase())
                .unwrap_or_default()
                .into()
        })
}
