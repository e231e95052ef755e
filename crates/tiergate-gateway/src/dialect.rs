// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wire dialects spoken to callers.
//!
//! The router is dialect-agnostic; each [`WireDialect`] knows how to frame
//! one streamed response and how to build the non-streaming body.
//!
//! Chat-completion stream:
//! ```text
//! data: {"object":"chat.completion.chunk","choices":[{"delta":{"role":"assistant","content":""}}]}
//! data: {"object":"chat.completion.chunk","choices":[{"delta":{"content":"..."}}]}
//! data: {"object":"chat.completion.chunk","choices":[{"delta":{},"finish_reason":"stop"}]}
//! data: [DONE]
//! ```
//!
//! Message-block stream:
//! ```text
//! event: message_start / content_block_start
//! event: content_block_delta (repeated)
//! event: content_block_stop / message_delta / message_stop
//! ```

use axum::http::HeaderMap;
use axum::response::sse::Event;
use serde_json::{Value, json};

/// One server-sent event before it reaches the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event: Option<&'static str>,
    pub data: String,
}

impl SseFrame {
    fn named(event: &'static str, data: Value) -> Self {
        Self {
            event: Some(event),
            data: data.to_string(),
        }
    }

    fn unnamed(data: impl Into<String>) -> Self {
        Self {
            event: None,
            data: data.into(),
        }
    }

    /// Parsed JSON data, if the payload is JSON.
    pub fn json(&self) -> Option<Value> {
        serde_json::from_str(&self.data).ok()
    }

    pub fn into_event(self) -> Event {
        let event = Event::default().data(self.data);
        match self.event {
            Some(name) => event.event(name),
            None => event,
        }
    }
}

/// Per-response identity shared by every frame of one response.
#[derive(Debug, Clone)]
pub struct ResponseMeta {
    pub id: String,
    pub model: String,
    pub created: i64,
}

/// `len` lowercase hex characters from a fresh v4 UUID (max 32).
fn hex_id(len: usize) -> String {
    let mut hex = uuid::Uuid::new_v4().simple().to_string();
    hex.truncate(len);
    hex
}

/// Strategy for one caller-facing wire format.
pub trait WireDialect: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// Whether an inbound request on the bare `/` route speaks this dialect.
    fn accepts(&self, headers: &HeaderMap, body: &Value) -> bool;

    /// Characters per content event when slicing whole text.
    fn slice_chars(&self) -> usize;

    /// Whether streamed fragments are also cut into `slice_chars` pieces.
    fn slices_fragments(&self) -> bool {
        true
    }

    /// Fresh identity for one response.
    fn meta(&self, model: &str) -> ResponseMeta;

    /// Frames opening a stream.
    fn envelope(&self, meta: &ResponseMeta) -> Vec<SseFrame>;

    /// One content frame.
    fn content(&self, meta: &ResponseMeta, text: &str) -> SseFrame;

    /// Frames closing a stream.
    fn terminal(&self, meta: &ResponseMeta, output_tokens: usize) -> Vec<SseFrame>;

    /// Non-streaming body.
    fn complete(&self, meta: &ResponseMeta, text: &str, output_tokens: usize) -> Value;
}

/// OpenAI-style `chat.completion.chunk` streaming.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChatCompletionDialect;

/// Anthropic-style message/content-block streaming.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageBlockDialect;

pub static CHAT_COMPLETION: ChatCompletionDialect = ChatCompletionDialect;
pub static MESSAGE_BLOCK: MessageBlockDialect = MessageBlockDialect;

impl ChatCompletionDialect {
    fn chunk(meta: &ResponseMeta, delta: Value, finish_reason: Option<&str>) -> SseFrame {
        SseFrame::unnamed(
            json!({
                "id": meta.id,
                "object": "chat.completion.chunk",
                "created": meta.created,
                "model": meta.model,
                "choices": [{"index": 0, "delta": delta, "finish_reason": finish_reason}],
            })
            .to_string(),
        )
    }
}

impl WireDialect for ChatCompletionDialect {
    fn name(&self) -> &'static str {
        "chat_completion"
    }

    fn accepts(&self, headers: &HeaderMap, body: &Value) -> bool {
        !MESSAGE_BLOCK.accepts(headers, body)
    }

    fn slice_chars(&self) -> usize {
        20
    }

    fn meta(&self, model: &str) -> ResponseMeta {
        ResponseMeta {
            id: format!("chatcmpl-{}", hex_id(20)),
            model: model.to_string(),
            created: chrono::Utc::now().timestamp(),
        }
    }

    fn envelope(&self, meta: &ResponseMeta) -> Vec<SseFrame> {
        vec![Self::chunk(
            meta,
            json!({"role": "assistant", "content": ""}),
            None,
        )]
    }

    fn content(&self, meta: &ResponseMeta, text: &str) -> SseFrame {
        Self::chunk(meta, json!({"content": text}), None)
    }

    fn terminal(&self, meta: &ResponseMeta, _output_tokens: usize) -> Vec<SseFrame> {
        vec![
            Self::chunk(meta, json!({}), Some("stop")),
            SseFrame::unnamed("[DONE]"),
        ]
    }

    fn complete(&self, meta: &ResponseMeta, text: &str, output_tokens: usize) -> Value {
        json!({
            "id": meta.id,
            "object": "chat.completion",
            "created": meta.created,
            "model": meta.model,
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": text},
                "finish_reason": "stop",
            }],
            "usage": {
                "prompt_tokens": 0,
                "completion_tokens": output_tokens,
                "total_tokens": output_tokens,
            },
        })
    }
}

impl WireDialect for MessageBlockDialect {
    fn name(&self) -> &'static str {
        "message_block"
    }

    fn accepts(&self, headers: &HeaderMap, body: &Value) -> bool {
        headers.contains_key("anthropic-version")
            || body.get("system").is_some()
            || body.get("tools").is_some()
    }

    fn slice_chars(&self) -> usize {
        30
    }

    fn slices_fragments(&self) -> bool {
        false
    }

    fn meta(&self, model: &str) -> ResponseMeta {
        ResponseMeta {
            id: format!("msg_{}", hex_id(24)),
            model: model.to_string(),
            created: chrono::Utc::now().timestamp(),
        }
    }

    fn envelope(&self, meta: &ResponseMeta) -> Vec<SseFrame> {
        vec![
            SseFrame::named(
                "message_start",
                json!({
                    "type": "message_start",
                    "message": {
                        "id": meta.id,
                        "type": "message",
                        "role": "assistant",
                        "content": [],
                        "model": meta.model,
                        "stop_reason": null,
                        "usage": {
                            "input_tokens": 0,
                            "output_tokens": 0,
                            "cache_creation_input_tokens": 0,
                            "cache_read_input_tokens": 0,
                        },
                    },
                }),
            ),
            SseFrame::named(
                "content_block_start",
                json!({
                    "type": "content_block_start",
                    "index": 0,
                    "content_block": {"type": "text", "text": ""},
                }),
            ),
        ]
    }

    fn content(&self, _meta: &ResponseMeta, text: &str) -> SseFrame {
        SseFrame::named(
            "content_block_delta",
            json!({
                "type": "content_block_delta",
                "index": 0,
                "delta": {"type": "text_delta", "text": text},
            }),
        )
    }

    fn terminal(&self, _meta: &ResponseMeta, output_tokens: usize) -> Vec<SseFrame> {
        vec![
            SseFrame::named(
                "content_block_stop",
                json!({"type": "content_block_stop", "index": 0}),
            ),
            SseFrame::named(
                "message_delta",
                json!({
                    "type": "message_delta",
                    "delta": {"stop_reason": "end_turn", "stop_sequence": null},
                    "usage": {"output_tokens": output_tokens},
                }),
            ),
            SseFrame::named("message_stop", json!({"type": "message_stop"})),
        ]
    }

    fn complete(&self, meta: &ResponseMeta, text: &str, output_tokens: usize) -> Value {
        json!({
            "id": meta.id,
            "type": "message",
            "role": "assistant",
            "model": meta.model,
            "content": [{"type": "text", "text": text}],
            "stop_reason": "end_turn",
            "stop_sequence": null,
            "usage": {"input_tokens": 0, "output_tokens": output_tokens},
        })
    }
}

/// Dialect for the bare `/` route.
pub fn detect(headers: &HeaderMap, body: &Value) -> &'static dyn WireDialect {
    if MESSAGE_BLOCK.accepts(headers, body) {
        &MESSAGE_BLOCK
    } else {
        &CHAT_COMPLETION
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn detection_prefers_message_block_signals() {
        let mut headers = HeaderMap::new();
        let plain = json!({"model": "m", "messages": []});
        assert_eq!(detect(&headers, &plain).name(), "chat_completion");
        assert_eq!(
            detect(&headers, &json!({"messages": [], "system": "x"})).name(),
            "message_block"
        );
        assert_eq!(
            detect(&headers, &json!({"messages": [], "tools": []})).name(),
            "message_block"
        );
        headers.insert("anthropic-version", HeaderValue::from_static("2023-06-01"));
        assert_eq!(detect(&headers, &plain).name(), "message_block");
        assert!(!CHAT_COMPLETION.accepts(&headers, &plain));
    }

    #[test]
    fn message_ids_have_expected_shape() {
        let meta = MESSAGE_BLOCK.meta("m");
        let hex = meta.id.strip_prefix("msg_").unwrap();
        assert_eq!(hex.len(), 24);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(CHAT_COMPLETION.meta("m").id.starts_with("chatcmpl-"));
    }

    #[test]
    fn message_start_has_zero_usage() {
        let meta = MESSAGE_BLOCK.meta("claude-opus");
        let frames = MESSAGE_BLOCK.envelope(&meta);
        assert_eq!(frames[0].event, Some("message_start"));
        let start = frames[0].json().unwrap();
        assert_eq!(start["message"]["id"], meta.id.as_str());
        assert_eq!(start["message"]["model"], "claude-opus");
        assert_eq!(start["message"]["usage"]["output_tokens"], 0);
        assert_eq!(start["message"]["usage"]["input_tokens"], 0);
        assert_eq!(frames[1].event, Some("content_block_start"));
    }

    #[test]
    fn chat_terminal_ends_with_done() {
        let meta = CHAT_COMPLETION.meta("m");
        let frames = CHAT_COMPLETION.terminal(&meta, 3);
        assert_eq!(frames[0].json().unwrap()["choices"][0]["finish_reason"], "stop");
        assert_eq!(frames[1].data, "[DONE]");
        assert_eq!(frames[1].event, None);
    }

    #[test]
    fn complete_bodies_report_usage() {
        let meta = MESSAGE_BLOCK.meta("m");
        let body = MESSAGE_BLOCK.complete(&meta, "two words", 2);
        assert_eq!(body["content"][0]["text"], "two words");
        assert_eq!(body["stop_reason"], "end_turn");
        assert_eq!(body["usage"]["output_tokens"], 2);

        let meta = CHAT_COMPLETION.meta("m");
        let body = CHAT_COMPLETION.complete(&meta, "two words", 2);
        assert_eq!(body["choices"][0]["message"]["content"], "two words");
        assert_eq!(body["usage"]["completion_tokens"], 2);
    }
}
