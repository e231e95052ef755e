// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Config diagnostics rendered through miette.
//!
//! Figment reports every problem it found at once; each becomes one
//! [`ConfigError`]. Unknown keys get a "did you mean" hint from strsim and,
//! when the offending file is known, a labelled span into it.

#![allow(unused_assignments)] // miette's Diagnostic derive generates code triggering this lint

use figment::error::Kind;
use miette::{Diagnostic, GraphicalReportHandler, NamedSource, SourceSpan};
use thiserror::Error;

/// Jaro-Winkler score a candidate key must beat to be offered as a fix.
const SUGGESTION_THRESHOLD: f64 = 0.75;

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("unknown key `{key}` in {section}")]
    #[diagnostic(code(tiergate::config::unknown_key), help("{}", unknown_key_help(suggestion.as_deref(), valid_keys)))]
    UnknownKey {
        key: String,
        /// Dotted table path, or `top level`.
        section: String,
        suggestion: Option<String>,
        valid_keys: Vec<&'static str>,
        #[label("not recognized here")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    #[error("`{key}` has the wrong type: found {found}")]
    #[diagnostic(code(tiergate::config::invalid_type), help("expected {expected}"))]
    InvalidType {
        key: String,
        found: String,
        expected: String,
    },

    #[error("`{key}` is required")]
    #[diagnostic(
        code(tiergate::config::missing_key),
        help("set `{key}` in tiergate.toml or through a TIERGATE_ variable")
    )]
    MissingKey { key: String },

    /// Rejected by post-load validation.
    #[error("invalid configuration: {message}")]
    #[diagnostic(code(tiergate::config::validation))]
    Validation { message: String },

    #[error("configuration error: {0}")]
    #[diagnostic(code(tiergate::config::other))]
    Other(String),
}

impl ConfigError {
    fn from_figment(error: &figment::Error, sources: &Sources<'_>) -> Self {
        let section: Vec<&str> = error.path.iter().map(String::as_str).collect();
        match &error.kind {
            Kind::UnknownField(key, expected) => {
                let located = sources.locate(error, &section, key);
                let (span, src) = located.unzip();
                Self::UnknownKey {
                    key: key.clone(),
                    section: if section.is_empty() {
                        "top level".to_string()
                    } else {
                        format!("[{}]", section.join("."))
                    },
                    suggestion: suggest_key(key, expected),
                    valid_keys: expected.to_vec(),
                    span,
                    src,
                }
            }
            Kind::MissingField(key) => Self::MissingKey {
                key: dotted(&section, key.as_ref()),
            },
            Kind::InvalidType(found, expected) => Self::InvalidType {
                key: section.join("."),
                found: found.to_string(),
                expected: expected.clone(),
            },
            _ => Self::Other(error.to_string()),
        }
    }
}

fn unknown_key_help(suggestion: Option<&str>, valid_keys: &[&str]) -> String {
    let valid = valid_keys.join(", ");
    match suggestion {
        Some(s) => format!("did you mean `{s}`? Valid keys: {valid}"),
        None => format!("valid keys: {valid}"),
    }
}

fn dotted(section: &[&str], key: &str) -> String {
    section
        .iter()
        .copied()
        .chain(std::iter::once(key))
        .collect::<Vec<_>>()
        .join(".")
}

/// TOML files that went into a load, as `(display path, content)`.
struct Sources<'a>(&'a [(String, String)]);

impl Sources<'_> {
    /// Span of `key` inside the file figment blamed for `error`.
    fn locate(
        &self,
        error: &figment::Error,
        section: &[&str],
        key: &str,
    ) -> Option<(SourceSpan, NamedSource<String>)> {
        let figment::Source::File(file) = error.metadata.as_ref()?.source.as_ref()? else {
            return None;
        };
        let file = file.display().to_string();
        let (name, content) = self.0.iter().find(|(name, _)| *name == file)?;
        let offset = find_key_offset(content, section, key)?;
        Some((
            SourceSpan::new(offset.into(), key.len()),
            NamedSource::new(name, content.clone()),
        ))
    }
}

/// Converts every error figment reported into a diagnostic.
pub fn figment_to_config_errors(
    err: figment::Error,
    toml_sources: &[(String, String)],
) -> Vec<ConfigError> {
    let sources = Sources(toml_sources);
    err.into_iter()
        .map(|error| ConfigError::from_figment(&error, &sources))
        .collect()
}

/// Byte offset of `key` as a line-leading assignment inside the `section`
/// table (or before any table header when `section` is empty).
pub fn find_key_offset(content: &str, section: &[&str], key: &str) -> Option<usize> {
    let start = if section.is_empty() {
        0
    } else {
        let header = format!("[{}]", section.join("."));
        content.find(&header)? + header.len()
    };

    let mut offset = start;
    for line in content[start..].split_inclusive('\n') {
        let body = line.trim_start();
        if section.is_empty() && body.starts_with('[') {
            return None;
        }
        let indent = line.len() - body.len();
        let assigns = body
            .strip_prefix(key)
            .is_some_and(|rest| rest.trim_start().starts_with('='));
        if assigns {
            return Some(offset + indent);
        }
        offset += line.len();
    }
    None
}

/// Closest valid key to `unknown`, if any is similar enough.
pub fn suggest_key(unknown: &str, valid_keys: &[&str]) -> Option<String> {
    valid_keys
        .iter()
        .map(|key| (strsim::jaro_winkler(unknown, key), *key))
        .filter(|(score, _)| *score > SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, key)| key.to_string())
}

/// Prints each error to stderr as a miette report.
pub fn render_errors(errors: &[ConfigError]) {
    let handler = GraphicalReportHandler::new();
    for error in errors {
        let mut out = String::new();
        match handler.render_report(&mut out, error as &dyn Diagnostic) {
            Ok(()) => eprint!("{out}"),
            Err(_) => eprintln!("error: {error}"),
        }
    }
}
