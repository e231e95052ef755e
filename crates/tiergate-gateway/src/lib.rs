// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP gateway for tiergate.
//!
//! Accepts chat requests in the chat-completion or message-block dialect,
//! hands them to the [`TierRouter`](tiergate_router::TierRouter) and frames
//! the result back in the caller's dialect.

pub mod dialect;
pub mod handlers;
pub mod server;
pub mod sse;

pub use dialect::{ChatCompletionDialect, MessageBlockDialect, SseFrame, WireDialect};
pub use handlers::TIER_HEADER;
pub use server::{GatewayState, app, serve};
pub use sse::{StreamEmitter, slice_text};
