// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SSE stream parser for Messages API streaming responses.
//!
//! Converts a reqwest response byte stream into text fragments using the
//! `eventsource-stream` crate for SSE protocol compliance. Only text deltas
//! carry content; every other event is skipped.

use eventsource_stream::Eventsource;
use futures::stream::StreamExt;
use tiergate_core::{FragmentStream, TiergateError};

use crate::types::{ApiErrorResponse, SseContentBlockDelta, SseDelta};

/// Parses a streaming response into a stream of text fragments.
///
/// An `error` event ends the stream with a transport error; unknown event
/// types are ignored per the API's versioning policy.
pub fn text_fragments(response: reqwest::Response) -> FragmentStream {
    let events = response.bytes_stream().eventsource();

    let mapped = events
        .filter_map(|result| async move {
            match result {
                Ok(event) => match event.event.as_str() {
                    "content_block_delta" => {
                        match serde_json::from_str::<SseContentBlockDelta>(&event.data) {
                            Ok(SseContentBlockDelta {
                                delta: SseDelta::TextDelta { text },
                            }) => Some(Ok(text)),
                            Ok(_) => None,
                            Err(e) => Some(Err(TiergateError::transport(
                                "failed to parse content_block_delta",
                                e,
                            ))),
                        }
                    }
                    "error" => {
                        let message = serde_json::from_str::<ApiErrorResponse>(&event.data)
                            .map(|err| format!("{}: {}", err.error.type_, err.error.message))
                            .unwrap_or(event.data);
                        Some(Err(TiergateError::Transport {
                            message,
                            source: None,
                        }))
                    }
                    _ => None,
                },
                Err(e) => Some(Err(TiergateError::Transport {
                    message: format!("SSE stream error: {e}"),
                    source: None,
                })),
            }
        })
        .scan(false, |failed, item| {
            // Nothing after the first error.
            if *failed {
                return futures::future::ready(None);
            }
            *failed = item.is_err();
            futures::future::ready(Some(item))
        });

    Box::pin(mapped)
}
