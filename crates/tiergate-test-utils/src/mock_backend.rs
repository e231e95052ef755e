// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scripted backend adapter for deterministic router and gateway tests.
//!
//! `MockBackend` implements `BackendAdapter` with a FIFO queue of [`Reply`]
//! values, enabling fast, CI-runnable tests without Ollama, Gemini or Claude.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;
use tokio::sync::Mutex;

use tiergate_core::{
    AdapterOutcome, BackendAdapter, ByteStream, FailureKind, FragmentStream, HealthStatus,
    Invocation, PluginAdapter, Tier, TiergateError,
};

/// One scripted answer.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Whole-text success.
    Text(String),
    /// Fragment stream that ends cleanly.
    Fragments(Vec<String>),
    /// Fragment stream that errors after the given fragments.
    FragmentsThenError(Vec<String>, String),
    /// Raw passthrough bytes.
    Passthrough(String),
    /// `ok == false` with this kind and diagnostic.
    Fail(FailureKind, String),
    /// Sleeps for the duration, then succeeds with the text.
    Slow(Duration, String),
}

/// A mock backend that pops scripted replies and records every invocation.
///
/// When the queue is empty the fallback reply is used (default: text
/// `"mock response"`).
#[derive(Clone)]
pub struct MockBackend {
    tier: Tier,
    label: String,
    replies: Arc<Mutex<VecDeque<Reply>>>,
    fallback: Reply,
    calls: Arc<AtomicUsize>,
    seen: Arc<Mutex<Vec<Invocation>>>,
    health: HealthStatus,
}

impl MockBackend {
    pub fn new(tier: Tier) -> Self {
        Self {
            tier,
            label: format!("mock-{tier}"),
            replies: Arc::new(Mutex::new(VecDeque::new())),
            fallback: Reply::Text("mock response".to_string()),
            calls: Arc::new(AtomicUsize::new(0)),
            seen: Arc::new(Mutex::new(Vec::new())),
            health: HealthStatus::Healthy,
        }
    }

    /// Pre-load the reply queue.
    pub fn with_replies(tier: Tier, replies: Vec<Reply>) -> Self {
        Self {
            replies: Arc::new(Mutex::new(VecDeque::from(replies))),
            ..Self::new(tier)
        }
    }

    /// Reply used whenever the queue is empty.
    pub fn always(tier: Tier, reply: Reply) -> Self {
        Self {
            fallback: reply,
            ..Self::new(tier)
        }
    }

    /// A backend whose every attempt fails with a transport error.
    pub fn failing(tier: Tier) -> Self {
        Self::always(
            tier,
            Reply::Fail(FailureKind::Transport, format!("[{tier} unavailable]")),
        )
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_health(mut self, health: HealthStatus) -> Self {
        self.health = health;
        self
    }

    pub async fn push(&self, reply: Reply) {
        self.replies.lock().await.push_back(reply);
    }

    /// Number of `invoke` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every invocation received, in order.
    pub async fn invocations(&self) -> Vec<Invocation> {
        self.seen.lock().await.clone()
    }

    async fn next_reply(&self) -> Reply {
        self.replies
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

fn fragment_stream(parts: Vec<String>, error: Option<String>) -> FragmentStream {
    let mut items: Vec<Result<String, TiergateError>> = parts.into_iter().map(Ok).collect();
    if let Some(message) = error {
        items.push(Err(TiergateError::Transport {
            message,
            source: None,
        }));
    }
    Box::pin(stream::iter(items))
}

#[async_trait]
impl PluginAdapter for MockBackend {
    fn name(&self) -> &str {
        &self.label
    }

    async fn health_check(&self) -> HealthStatus {
        self.health.clone()
    }
}

#[async_trait]
impl BackendAdapter for MockBackend {
    fn tier(&self) -> Tier {
        self.tier
    }

    fn model_label(&self) -> &str {
        &self.label
    }

    async fn invoke(&self, invocation: Invocation) -> AdapterOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().await.push(invocation);

        match self.next_reply().await {
            Reply::Text(text) => AdapterOutcome::text(text),
            Reply::Fragments(parts) => AdapterOutcome::fragments(fragment_stream(parts, None)),
            Reply::FragmentsThenError(parts, error) => {
                AdapterOutcome::fragments(fragment_stream(parts, Some(error)))
            }
            Reply::Passthrough(raw) => {
                let body: ByteStream =
                    Box::pin(stream::iter(vec![Ok::<_, TiergateError>(Bytes::from(raw))]));
                AdapterOutcome::passthrough("text/event-stream", body)
            }
            Reply::Fail(kind, diagnostic) => AdapterOutcome::failed(kind, diagnostic),
            Reply::Slow(delay, text) => {
                tokio::time::sleep(delay).await;
                AdapterOutcome::text(text)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replies_pop_in_order_then_fallback() {
        let mock = MockBackend::with_replies(
            Tier::Primary,
            vec![
                Reply::Fail(FailureKind::Timeout, "slow".into()),
                Reply::Text("second".into()),
            ],
        );

        let first = mock.invoke(Invocation::default()).await;
        assert!(!first.ok);
        assert_eq!(first.failure, Some(FailureKind::Timeout));
        assert_eq!(mock.invoke(Invocation::default()).await.text_ref(), Some("second"));
        assert_eq!(
            mock.invoke(Invocation::default()).await.text_ref(),
            Some("mock response")
        );
        assert_eq!(mock.calls(), 3);
    }

    #[tokio::test]
    async fn invocations_are_recorded() {
        let mock = MockBackend::new(Tier::Secondary);
        mock.invoke(Invocation {
            prompt: "hello".into(),
            ..Invocation::default()
        })
        .await;
        let seen = mock.invocations().await;
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].prompt, "hello");
    }

    #[tokio::test]
    async fn fragments_then_error_surfaces_error_last() {
        let mock = MockBackend::always(
            Tier::LastResort,
            Reply::FragmentsThenError(vec!["a".into()], "pipe closed".into()),
        );
        let text = mock.invoke(Invocation::default()).await.payload.collect_text().await;
        assert!(text.starts_with('a'));
        assert!(text.contains("pipe closed"));
    }
}
