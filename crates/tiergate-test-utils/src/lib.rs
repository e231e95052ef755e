// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for tiergate.
//!
//! Provides scripted backends and fake CLIs for fast, deterministic,
//! CI-runnable tests without Ollama, Gemini or Claude installed.
//!
//! # Components
//!
//! - [`MockBackend`] - backend adapter answering from a reply queue
//! - [`fake_cli`] - executable shell scripts impersonating a CLI

pub mod fake_cli;
pub mod mock_backend;

#[cfg(unix)]
pub use fake_cli::{fake_cli, try_fake_cli};
pub use mock_backend::{MockBackend, Reply};
