// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Base adapter trait that all backend adapters implement.

use async_trait::async_trait;

use crate::types::HealthStatus;

/// Identity and availability probing shared by every adapter.
#[async_trait]
pub trait PluginAdapter: Send + Sync + 'static {
    /// Returns the human-readable name of this adapter instance.
    fn name(&self) -> &str;

    /// Probes the backend and reports whether it can currently serve requests.
    ///
    /// Probes never fail; an unreachable backend is reported as
    /// [`HealthStatus::Unhealthy`].
    async fn health_check(&self) -> HealthStatus;
}
