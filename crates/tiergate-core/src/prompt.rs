// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Flattening of structured conversations into the plain-text prompt
//! that text-only backends accept.
//!
//! Nothing here fails: missing or malformed pieces render as empty text,
//! and block shapes we do not recognize render as their JSON form.

use serde_json::Value;

use crate::types::{ContentBlock, Message, MessageContent, Role, TypedBlock};

/// Flattens one message's content to text.
pub fn flatten(content: &MessageContent) -> String {
    match content {
        MessageContent::Text(text) => text.clone(),
        MessageContent::Blocks(blocks) => blocks
            .iter()
            .map(flatten_block)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("\n"),
        MessageContent::Other(value) => value_text(value),
    }
}

fn flatten_block(block: &ContentBlock) -> String {
    match block {
        ContentBlock::Typed(TypedBlock::Text { text }) => text.clone(),
        ContentBlock::Typed(TypedBlock::ToolResult { content }) => flatten(content),
        ContentBlock::Typed(TypedBlock::ToolUse { name, input }) => {
            format!("[tool_use: {name}({input})]")
        }
        ContentBlock::Raw(value) => value_text(value),
    }
}

/// String form of an arbitrary JSON value; `null` is empty.
fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Builds the flat prompt: optional `[System: ...]` line, then one line per
/// message, non-user turns prefixed with their role.
pub fn normalize(messages: &[Message], system: Option<&MessageContent>) -> String {
    let mut lines = Vec::with_capacity(messages.len() + 1);

    if let Some(system) = system {
        let text = flatten(system);
        if !text.is_empty() {
            lines.push(format!("[System: {text}]"));
        }
    }

    for message in messages {
        let content = flatten(&message.content);
        match message.role {
            Role::User => lines.push(content),
            ref role => lines.push(format!("{role}: {content}")),
        }
    }

    lines.join("\n")
}

/// Whitespace-delimited word count, used as a token estimate.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}
