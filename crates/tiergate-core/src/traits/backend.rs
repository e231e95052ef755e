// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Backend adapter trait: one implementation per tier.

use async_trait::async_trait;

use crate::traits::adapter::PluginAdapter;
use crate::types::{AdapterOutcome, Invocation, Tier};

/// Uniform invocation wrapper around one concrete backend.
///
/// `invoke` never returns an error: transport faults, timeouts, auth
/// problems and empty output all come back as an [`AdapterOutcome`] with
/// `ok == false` and diagnostic text.
#[async_trait]
pub trait BackendAdapter: PluginAdapter {
    /// The tier this adapter serves.
    fn tier(&self) -> Tier;

    /// Default model label reported to callers for responses from this tier.
    fn model_label(&self) -> &str;

    /// Runs one attempt against the backend.
    async fn invoke(&self, invocation: Invocation) -> AdapterOutcome;
}
