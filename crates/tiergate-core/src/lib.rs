// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the tiergate request router.
//!
//! This crate provides the shared request and outcome types, the error
//! taxonomy, the backend adapter traits, prompt flattening and scoped
//! subprocess execution. Every tier adapter implements the traits defined
//! here.

pub mod error;
pub mod process;
pub mod prompt;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::{FailureKind, TiergateError};
pub use process::{LineEvent, LineStream, ProcessOutput, ScopedProcess};
pub use types::{
    AdapterOutcome, ByteStream, ChatRequest, FragmentStream, HealthStatus, Invocation, LogEntry,
    Message, MessageContent, Payload, Role, RouteOutcome, SessionSnapshot, Tier,
};

pub use traits::{BackendAdapter, PluginAdapter};
