// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for tiergate.
//!
//! [`TiergateError`] is what fallible internals return. At the adapter
//! boundary every error is folded into an [`AdapterOutcome`] carrying a
//! [`FailureKind`], so nothing past that boundary ever sees a `Result`.
//!
//! [`AdapterOutcome`]: crate::types::AdapterOutcome

use std::time::Duration;

use serde::Serialize;
use strum::{Display, EnumString};
use thiserror::Error;

/// The primary error type used across tiergate crates.
#[derive(Debug, Error)]
pub enum TiergateError {
    /// Configuration errors (invalid values, unusable header strings).
    #[error("configuration error: {0}")]
    Config(String),

    /// Network or subprocess endpoint unreachable, or the call itself failed.
    #[error("transport error: {message}")]
    Transport {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Operation exceeded its configured bound.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    /// The backend signalled missing or rejected credentials.
    #[error("authentication required: {0}")]
    AuthRequired(String),

    /// The backend succeeded but produced no usable text.
    #[error("empty response from {0}")]
    EmptyResponse(String),

    /// An external process could not be spawned or driven.
    #[error("process error: {message}")]
    Process {
        message: String,
        source: Option<std::io::Error>,
    },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl TiergateError {
    /// Shorthand for a transport error wrapping a source error.
    pub fn transport(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Transport {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Why an adapter attempt failed.
///
/// The router treats every kind as "retry or escalate" except
/// [`FailureKind::AuthRequired`], which ends the current tier's retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Transport,
    Timeout,
    AuthRequired,
    EmptyResponse,
}

impl From<&TiergateError> for FailureKind {
    fn from(err: &TiergateError) -> Self {
        match err {
            TiergateError::Timeout { .. } => FailureKind::Timeout,
            TiergateError::AuthRequired(_) => FailureKind::AuthRequired,
            TiergateError::EmptyResponse(_) => FailureKind::EmptyResponse,
            TiergateError::Config(_)
            | TiergateError::Transport { .. }
            | TiergateError::Process { .. }
            | TiergateError::Internal(_) => FailureKind::Transport,
        }
    }
}
