// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tier routing for tiergate.
//!
//! This crate provides:
//! - [`TierClassifier`]: model id to tier, by exact or `*`-prefix match
//! - [`analyze_task`]: keyword task analysis used for logging
//! - [`TierRouter`]: retry, escalation, loop guard and forced-tier override
//! - [`HistoryLog`]: append-only routing history and session snapshot

pub mod classifier;
pub mod history;
pub mod router;

pub use classifier::{TaskAnalysis, TaskType, TierClassifier, analyze_task};
pub use history::{HistoryLog, timestamp};
pub use router::{ALL_TIERS_FAILED, RouteRequest, TierRouter};
