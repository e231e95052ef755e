// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared by adapters, the tier router and the gateway.

use std::fmt;
use std::pin::Pin;

use bytes::Bytes;
use futures::stream::{Stream, StreamExt};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use strum::{Display, EnumString};

use crate::error::{FailureKind, TiergateError};

/// Model identifier assumed when a request omits `model`.
pub const DEFAULT_REQUEST_MODEL: &str = "claude-sonnet-4-6";

/// Health status reported by adapter availability probes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Backend is reachable and usable.
    Healthy,
    /// Backend is reachable but something is off (e.g. model missing).
    Degraded(String),
    /// Backend is not usable.
    Unhealthy(String),
}

impl HealthStatus {
    /// True for anything other than [`HealthStatus::Unhealthy`].
    pub fn is_available(&self) -> bool {
        !matches!(self, HealthStatus::Unhealthy(_))
    }
}

/// One of the three prioritized backend routes, ordered by rank.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Primary,
    Secondary,
    LastResort,
}

impl Tier {
    /// All tiers in escalation order.
    pub const ALL: [Tier; 3] = [Tier::Primary, Tier::Secondary, Tier::LastResort];

    /// 1-based rank (T1, T2, T3).
    pub fn rank(self) -> u8 {
        match self {
            Tier::Primary => 1,
            Tier::Secondary => 2,
            Tier::LastResort => 3,
        }
    }

    /// The tier escalated to after this one, if any.
    pub fn next(self) -> Option<Tier> {
        match self {
            Tier::Primary => Some(Tier::Secondary),
            Tier::Secondary => Some(Tier::LastResort),
            Tier::LastResort => None,
        }
    }

    /// This tier followed by every tier below it.
    pub fn escalation_path(self) -> impl Iterator<Item = Tier> {
        std::iter::successors(Some(self), |t| t.next())
    }

    /// Label written to the routing history log.
    pub fn log_label(self) -> &'static str {
        match self {
            Tier::Primary => "T1_OLLAMA",
            Tier::Secondary => "T2_GEMINI",
            Tier::LastResort => "T3_CLAUDE_LAST_RESORT",
        }
    }

    /// Parses a forced-tier directive: `1`/`2`/`3`, `t1`..`t3`, or the tier name.
    pub fn parse_directive(raw: &str) -> Option<Tier> {
        let lower = raw.trim().to_lowercase();
        match lower.as_str() {
            "1" | "t1" => Some(Tier::Primary),
            "2" | "t2" => Some(Tier::Secondary),
            "3" | "t3" => Some(Tier::LastResort),
            other => other.parse().ok(),
        }
    }
}

/// Conversation role. Unknown roles keep their name so they can be rendered.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    #[default]
    User,
    Assistant,
    System,
    Tool,
    Other(String),
}

impl Role {
    pub fn as_str(&self) -> &str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
            Role::Tool => "tool",
            Role::Other(name) => name,
        }
    }
}

impl From<String> for Role {
    fn from(value: String) -> Self {
        match value.as_str() {
            "user" => Role::User,
            "assistant" => Role::Assistant,
            "system" => Role::System,
            "tool" => Role::Tool,
            _ => Role::Other(value),
        }
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        role.as_str().to_string()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message content: plain text, a list of blocks, or anything else a caller sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
    Other(Value),
}

impl Default for MessageContent {
    fn default() -> Self {
        MessageContent::Text(String::new())
    }
}

/// A content block. Blocks that do not parse as a known shape are kept raw.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContentBlock {
    Typed(TypedBlock),
    Raw(Value),
}

/// Content block shapes the prompt normalizer knows how to render.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TypedBlock {
    Text {
        #[serde(default)]
        text: String,
    },
    ToolUse {
        #[serde(default = "default_tool_name")]
        name: String,
        #[serde(default = "empty_object")]
        input: Value,
    },
    ToolResult {
        #[serde(default)]
        content: MessageContent,
    },
}

fn default_tool_name() -> String {
    "tool".to_string()
}

fn empty_object() -> Value {
    Value::Object(Default::default())
}

/// A single conversation turn.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Message {
    #[serde(default, deserialize_with = "lenient")]
    pub role: Role,
    #[serde(default)]
    pub content: MessageContent,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::Text(text.into()),
        }
    }
}

/// An inbound chat request, in either wire dialect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    #[serde(default = "default_request_model", deserialize_with = "lenient_model")]
    pub model: String,
    #[serde(default, deserialize_with = "lenient_messages")]
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<MessageContent>,
    #[serde(default, deserialize_with = "lenient")]
    pub stream: bool,
    #[serde(
        default,
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub tools: Option<Vec<Value>>,
}

fn default_request_model() -> String {
    DEFAULT_REQUEST_MODEL.to_string()
}

/// Any JSON value is accepted; a wrong shape falls back to `T::default()`.
fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

fn lenient_model<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(model) => model,
        _ => default_request_model(),
    })
}

/// Non-array `messages` becomes empty; entries that are not messages are dropped.
fn lenient_messages<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Message>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect(),
        _ => Vec::new(),
    })
}

impl ChatRequest {
    /// True when the conversation already ends on an assistant turn.
    pub fn ends_with_assistant(&self) -> bool {
        self.messages
            .last()
            .is_some_and(|m| m.role == Role::Assistant)
    }
}

/// Everything a backend adapter needs for one attempt.
#[derive(Debug, Clone, Default)]
pub struct Invocation {
    /// Flattened conversation text.
    pub prompt: String,
    /// Flattened system text, if the caller sent one.
    pub system: Option<String>,
    /// The model identifier the caller asked for.
    pub model_hint: Option<String>,
    /// Whether the caller wants incremental output.
    pub stream: bool,
    /// The caller's original message-block body, for native passthrough.
    pub native_body: Option<Value>,
}

/// Incremental text fragments from a streaming backend.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, TiergateError>> + Send>>;

/// Raw bytes piped through from a backend that already speaks the caller's dialect.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, TiergateError>> + Send>>;

/// What an adapter produced.
pub enum Payload {
    /// Whole accumulated text.
    Text(String),
    /// Incremental fragments.
    Fragments(FragmentStream),
    /// Backend bytes forwarded untouched.
    Passthrough {
        content_type: String,
        body: ByteStream,
    },
}

impl Payload {
    /// The text of a [`Payload::Text`], if that is what this is.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Drains the payload into a single string.
    ///
    /// Fragment errors end the collection with a bracketed diagnostic.
    pub async fn collect_text(self) -> String {
        match self {
            Payload::Text(text) => text,
            Payload::Fragments(mut stream) => {
                let mut text = String::new();
                while let Some(item) = stream.next().await {
                    match item {
                        Ok(fragment) => text.push_str(&fragment),
                        Err(e) => {
                            text.push_str(&format!("\n[stream error: {e}]"));
                            break;
                        }
                    }
                }
                text
            }
            Payload::Passthrough { mut body, .. } => {
                let mut raw = Vec::new();
                while let Some(Ok(chunk)) = body.next().await {
                    raw.extend_from_slice(&chunk);
                }
                String::from_utf8_lossy(&raw).into_owned()
            }
        }
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Payload::Fragments(_) => f.write_str("Fragments(<stream>)"),
            Payload::Passthrough { content_type, .. } => f
                .debug_struct("Passthrough")
                .field("content_type", content_type)
                .finish_non_exhaustive(),
        }
    }
}

/// Result of one adapter attempt.
#[derive(Debug)]
pub struct AdapterOutcome {
    pub ok: bool,
    pub payload: Payload,
    pub failure: Option<FailureKind>,
}

impl AdapterOutcome {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            ok: true,
            payload: Payload::Text(text.into()),
            failure: None,
        }
    }

    pub fn fragments(stream: FragmentStream) -> Self {
        Self {
            ok: true,
            payload: Payload::Fragments(stream),
            failure: None,
        }
    }

    pub fn passthrough(content_type: impl Into<String>, body: ByteStream) -> Self {
        Self {
            ok: true,
            payload: Payload::Passthrough {
                content_type: content_type.into(),
                body,
            },
            failure: None,
        }
    }

    /// A failed attempt carrying diagnostic text.
    pub fn failed(kind: FailureKind, diagnostic: impl Into<String>) -> Self {
        Self {
            ok: false,
            payload: Payload::Text(diagnostic.into()),
            failure: Some(kind),
        }
    }

    /// Diagnostic or result text, when the payload is whole text.
    pub fn text_ref(&self) -> Option<&str> {
        self.payload.as_text()
    }
}

/// Final routing result for one request.
#[derive(Debug)]
pub struct RouteOutcome {
    /// Tier that produced the payload; `None` for the loop guard.
    pub tier: Option<Tier>,
    pub success: bool,
    /// Model label to report back to the caller.
    pub model: String,
    pub payload: Payload,
    /// Last failure detail seen, if any.
    pub error: Option<String>,
    /// Tiers attempted, one entry per attempt, in order.
    pub attempted: Vec<Tier>,
    /// Set when the loop guard answered without invoking any tier.
    pub loop_guard: bool,
}

/// One line of the routing history log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub ts: String,
    pub tier: String,
    pub task_type: String,
    pub success: bool,
}

/// Per-process availability snapshot written at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub started: String,
    pub t1_available: bool,
    pub t2_available: bool,
    pub t3_available: bool,
}
