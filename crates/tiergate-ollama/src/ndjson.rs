// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Newline-delimited JSON decoding for `/api/generate` streams.
//!
//! Each line is one [`GenerateChunk`]. Its `response` text becomes one
//! fragment; the stream ends at the first chunk with `done` set. Lines that
//! are not valid JSON are skipped.

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use tiergate_core::{FragmentStream, TiergateError};
use tracing::debug;

/// One line of an Ollama generate response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerateChunk {
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub error: Option<String>,
}

enum Line {
    Fragment(String),
    Failed(String),
    Skip,
}

struct Decoder<S> {
    inner: S,
    buf: Vec<u8>,
    finished: bool,
}

impl<S> Decoder<S> {
    fn decode_line(&mut self, raw: &[u8]) -> Line {
        let text = String::from_utf8_lossy(raw);
        let text = text.trim();
        if text.is_empty() {
            return Line::Skip;
        }
        match serde_json::from_str::<GenerateChunk>(text) {
            Ok(chunk) => {
                if let Some(error) = chunk.error {
                    self.finished = true;
                    return Line::Failed(error);
                }
                if chunk.done {
                    self.finished = true;
                }
                if chunk.response.is_empty() {
                    Line::Skip
                } else {
                    Line::Fragment(chunk.response)
                }
            }
            Err(e) => {
                debug!(error = %e, "skipping malformed generate line");
                Line::Skip
            }
        }
    }

    fn next_buffered_line(&mut self) -> Option<Vec<u8>> {
        let pos = self.buf.iter().position(|b| *b == b'\n')?;
        Some(self.buf.drain(..=pos).collect())
    }
}

fn emit<S>(line: Line, decoder: Decoder<S>) -> Option<(Result<String, TiergateError>, Decoder<S>)> {
    match line {
        Line::Fragment(text) => Some((Ok(text), decoder)),
        Line::Failed(message) => Some((
            Err(TiergateError::Transport {
                message: format!("ollama: {message}"),
                source: None,
            }),
            decoder,
        )),
        Line::Skip => None,
    }
}

/// Turns a raw byte stream of NDJSON into a stream of text fragments.
pub fn fragments<S, E>(bytes: S) -> FragmentStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + Unpin + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    let decoder = Decoder {
        inner: bytes,
        buf: Vec::new(),
        finished: false,
    };

    Box::pin(stream::unfold(decoder, |mut decoder| async move {
        loop {
            if decoder.finished {
                return None;
            }

            if let Some(raw) = decoder.next_buffered_line() {
                match decoder.decode_line(&raw) {
                    Line::Skip => continue,
                    line => return emit(line, decoder),
                }
            }

            match decoder.inner.next().await {
                Some(Ok(chunk)) => decoder.buf.extend_from_slice(&chunk),
                Some(Err(e)) => {
                    decoder.finished = true;
                    return Some((
                        Err(TiergateError::transport("ollama stream read failed", e)),
                        decoder,
                    ));
                }
                None => {
                    decoder.finished = true;
                    let rest = std::mem::take(&mut decoder.buf);
                    return match decoder.decode_line(&rest) {
                        Line::Skip => None,
                        line => emit(line, decoder),
                    };
                }
            }
        }
    }))
}
