// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Server-Sent Events emission for routed responses.
//!
//! [`StreamEmitter`] owns the per-response state and enforces event order:
//! the envelope always comes first, content only between envelope and
//! terminal, and nothing after the terminal sequence. Each frame is handed to
//! axum's `Sse` individually so it is flushed as soon as it is produced.

use std::convert::Infallible;

use axum::response::sse::{Event, Sse};
use futures::stream::{self, Stream, StreamExt};
use tiergate_core::prompt::word_count;
use tiergate_core::{FragmentStream, Payload};

use crate::dialect::{ResponseMeta, SseFrame, WireDialect};

/// Where a response is in its event sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    NotStarted,
    Open,
    Closed,
}

/// Frames one response in one dialect.
pub struct StreamEmitter {
    dialect: &'static dyn WireDialect,
    meta: ResponseMeta,
    state: StreamState,
    /// Everything emitted as content, for the output token estimate.
    emitted: String,
}

impl StreamEmitter {
    pub fn new(dialect: &'static dyn WireDialect, model: &str) -> Self {
        Self {
            dialect,
            meta: dialect.meta(model),
            state: StreamState::NotStarted,
            emitted: String::new(),
        }
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn meta(&self) -> &ResponseMeta {
        &self.meta
    }

    /// Envelope frames, once.
    pub fn open(&mut self) -> Vec<SseFrame> {
        if self.state != StreamState::NotStarted {
            return Vec::new();
        }
        self.state = StreamState::Open;
        self.dialect.envelope(&self.meta)
    }

    /// One content frame for `fragment`, opening the envelope if needed.
    /// Empty fragments and anything after close emit nothing.
    pub fn fragment(&mut self, fragment: &str) -> Vec<SseFrame> {
        if self.state == StreamState::Closed || fragment.is_empty() {
            return Vec::new();
        }
        let mut frames = self.open();
        self.emitted.push_str(fragment);
        frames.push(self.dialect.content(&self.meta, fragment));
        frames
    }

    /// Whole text, sliced into the dialect's content size.
    pub fn text(&mut self, text: &str) -> Vec<SseFrame> {
        let mut frames = self.open();
        for slice in slice_text(text, self.dialect.slice_chars()) {
            frames.extend(self.fragment(slice));
        }
        frames
    }

    /// One streamed fragment: sliced when the dialect slices fragments,
    /// otherwise a single content frame.
    pub fn stream_fragment(&mut self, fragment: &str) -> Vec<SseFrame> {
        if !self.dialect.slices_fragments() {
            return self.fragment(fragment);
        }
        let mut frames = Vec::new();
        for slice in slice_text(fragment, self.dialect.slice_chars()) {
            frames.extend(self.fragment(slice));
        }
        frames
    }

    /// Terminal frames, once. Opens the envelope first if nothing was sent.
    pub fn finish(&mut self) -> Vec<SseFrame> {
        if self.state == StreamState::Closed {
            return Vec::new();
        }
        let mut frames = self.open();
        self.state = StreamState::Closed;
        frames.extend(self.dialect.terminal(&self.meta, word_count(&self.emitted)));
        frames
    }
}

/// Splits `text` into consecutive slices of `size` characters (the last may
/// be shorter). Empty text yields no slices.
pub fn slice_text(text: &str, size: usize) -> Vec<&str> {
    let size = size.max(1);
    let mut slices = Vec::with_capacity(text.len() / size + 1);
    let mut start = 0;
    let mut chars = 0;
    for (idx, _) in text.char_indices() {
        if chars == size {
            slices.push(&text[start..idx]);
            start = idx;
            chars = 0;
        }
        chars += 1;
    }
    if start < text.len() {
        slices.push(&text[start..]);
    }
    slices
}

/// Full frame sequence for a text or fragment payload.
///
/// Passthrough payloads never reach the emitter; one given here is drained
/// as plain text.
pub fn frames(
    mut emitter: StreamEmitter,
    payload: Payload,
) -> impl Stream<Item = SseFrame> + Send {
    match payload {
        Payload::Text(text) => {
            let mut frames = emitter.text(&text);
            frames.extend(emitter.finish());
            stream::iter(frames).boxed()
        }
        Payload::Fragments(fragments) => fragment_frames(emitter, fragments).boxed(),
        passthrough @ Payload::Passthrough { .. } => stream::once(async move {
            let text = passthrough.collect_text().await;
            let mut frames = emitter.text(&text);
            frames.extend(emitter.finish());
            stream::iter(frames)
        })
        .flatten()
        .boxed(),
    }
}

fn fragment_frames(
    emitter: StreamEmitter,
    fragments: FragmentStream,
) -> impl Stream<Item = SseFrame> + Send {
    stream::unfold(
        (emitter, Some(fragments)),
        |(mut emitter, fragments)| async move {
            let mut fragments = fragments?;
            let batch = match fragments.next().await {
                Some(Ok(fragment)) => {
                    let mut batch = emitter.open();
                    batch.extend(emitter.stream_fragment(&fragment));
                    return Some((batch, (emitter, Some(fragments))));
                }
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "fragment stream failed mid-response");
                    let mut batch = emitter.stream_fragment(&format!("\n[stream error: {e}]"));
                    batch.extend(emitter.finish());
                    batch
                }
                None => emitter.finish(),
            };
            Some((batch, (emitter, None)))
        },
    )
    .flat_map(stream::iter)
}

/// Wraps frames as an axum SSE response.
pub fn into_sse(
    frames: impl Stream<Item = SseFrame> + Send + 'static,
) -> Sse<impl Stream<Item = Result<Event, Infallible>> + Send + 'static> {
    Sse::new(frames.map(|frame| Ok(frame.into_event())))
}
