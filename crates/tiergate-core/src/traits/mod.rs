// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter trait definitions.
//!
//! Every backend extends the [`PluginAdapter`] base trait and uses
//! `#[async_trait]` so the router can hold them as trait objects.

pub mod adapter;
pub mod backend;

pub use adapter::PluginAdapter;
pub use backend::BackendAdapter;
