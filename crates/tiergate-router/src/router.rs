// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tier selection, retry and escalation.
//!
//! Orchestrates one request: loop guard > forced tier > classify, then
//! retry within a tier and escalate Primary -> Secondary -> LastResort.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde_json::Value;
use tiergate_config::model::RoutingConfig;
use tiergate_config::TierPolicy;
use tiergate_core::prompt::{flatten, normalize};
use tiergate_core::{
    BackendAdapter, ChatRequest, FailureKind, Invocation, LogEntry, Payload, RouteOutcome, Tier,
};
use tracing::{debug, info, warn};

use crate::classifier::{TaskAnalysis, TierClassifier, analyze_task};
use crate::history::{HistoryLog, timestamp};

/// Returned when every tier has been tried and none produced text.
pub const ALL_TIERS_FAILED: &str =
    "All tiers failed. Check: ollama serve | gemini auth login | ANTHROPIC_API_KEY";

/// History label for requests answered by the loop guard.
pub const LOOP_GUARD_LABEL: &str = "LOOP_GUARD";

/// History label for requests that exhausted every tier.
pub const ALL_FAILED_LABEL: &str = "ALL_FAILED";

/// One request as the router sees it.
#[derive(Debug, Clone)]
pub struct RouteRequest {
    pub chat: ChatRequest,
    /// Skip classification, retries and escalation; call this tier once.
    pub forced: Option<Tier>,
    /// The caller's raw message-block body, offered to adapters that can
    /// pass it through.
    pub native_body: Option<Value>,
}

impl RouteRequest {
    pub fn new(chat: ChatRequest) -> Self {
        Self {
            chat,
            forced: None,
            native_body: None,
        }
    }

    pub fn forced(mut self, tier: Option<Tier>) -> Self {
        self.forced = tier;
        self
    }

    pub fn native_body(mut self, body: Value) -> Self {
        self.native_body = Some(body);
        self
    }
}

/// Why one attempt did not produce usable text.
#[derive(Debug, Clone)]
struct AttemptFailure {
    kind: FailureKind,
    detail: String,
}

impl AttemptFailure {
    fn new(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}

/// Routes requests across the three tiers.
///
/// Never errors to its caller: every path ends in a [`RouteOutcome`] and
/// exactly one history entry.
pub struct TierRouter {
    classifier: TierClassifier,
    routing: RoutingConfig,
    adapters: BTreeMap<Tier, Arc<dyn BackendAdapter>>,
    history: Option<HistoryLog>,
}

impl TierRouter {
    /// Adapters are keyed by their own `tier()`; a later adapter for the
    /// same tier replaces an earlier one.
    pub fn new(routing: &RoutingConfig, adapters: Vec<Arc<dyn BackendAdapter>>) -> Self {
        Self {
            classifier: TierClassifier::new(routing),
            routing: routing.clone(),
            adapters: adapters.into_iter().map(|a| (a.tier(), a)).collect(),
            history: None,
        }
    }

    pub fn with_history(mut self, history: HistoryLog) -> Self {
        self.history = Some(history);
        self
    }

    pub fn classifier(&self) -> &TierClassifier {
        &self.classifier
    }

    pub fn policy(&self, tier: Tier) -> &TierPolicy {
        self.routing.policy(tier)
    }

    /// Whether failed tiers hand over to the next one.
    pub fn escalates(&self) -> bool {
        self.routing.escalate_on_failure
    }

    pub fn adapter(&self, tier: Tier) -> Option<&Arc<dyn BackendAdapter>> {
        self.adapters.get(&tier)
    }

    /// Registered adapters in tier order.
    pub fn adapters(&self) -> impl Iterator<Item = &Arc<dyn BackendAdapter>> {
        self.adapters.values()
    }

    pub async fn route(&self, request: RouteRequest) -> RouteOutcome {
        let RouteRequest {
            chat,
            forced,
            native_body,
        } = request;

        let prompt = normalize(&chat.messages, chat.system.as_ref());
        let analysis = analyze_task(&prompt);
        info!(
            task_type = %analysis.task_type,
            words = analysis.word_count,
            complex = analysis.is_complex,
            model = %chat.model,
            "task analysed"
        );

        if chat.ends_with_assistant() {
            info!("conversation ends on an assistant turn, answering with empty response");
            self.record(LOOP_GUARD_LABEL, &analysis, true).await;
            return RouteOutcome {
                tier: None,
                success: true,
                model: chat.model,
                payload: Payload::Text(String::new()),
                error: None,
                attempted: Vec::new(),
                loop_guard: true,
            };
        }

        let invocation = Invocation {
            prompt,
            system: chat.system.as_ref().map(flatten).filter(|s| !s.is_empty()),
            model_hint: Some(chat.model.clone()),
            stream: chat.stream,
            native_body,
        };

        match forced {
            Some(tier) => self.route_forced(tier, invocation, &analysis, chat.model).await,
            None => {
                let start = self.classifier.classify(&chat.model);
                self.route_escalating(start, invocation, &analysis, chat.model)
                    .await
            }
        }
    }

    async fn route_forced(
        &self,
        tier: Tier,
        invocation: Invocation,
        analysis: &TaskAnalysis,
        requested_model: String,
    ) -> RouteOutcome {
        info!(tier = %tier, "forced tier, no retries or escalation");
        let result = match self.adapter(tier) {
            Some(adapter) => attempt(adapter.as_ref(), invocation, self.policy(tier).timeout()).await,
            None => Err(AttemptFailure::new(
                FailureKind::Transport,
                format!("no adapter registered for {tier}"),
            )),
        };

        match result {
            Ok(payload) => {
                self.record(tier.log_label(), analysis, true).await;
                self.success(tier, payload, vec![tier])
            }
            Err(failure) => {
                warn!(tier = %tier, detail = %failure.detail, "forced tier failed");
                self.record(tier.log_label(), analysis, false).await;
                let message = format!("T{} failed: {}", tier.rank(), failure.detail);
                RouteOutcome {
                    tier: Some(tier),
                    success: false,
                    model: requested_model,
                    payload: Payload::Text(message),
                    error: Some(failure.detail),
                    attempted: vec![tier],
                    loop_guard: false,
                }
            }
        }
    }

    async fn route_escalating(
        &self,
        start: Tier,
        invocation: Invocation,
        analysis: &TaskAnalysis,
        requested_model: String,
    ) -> RouteOutcome {
        let path: Vec<Tier> = if self.routing.escalate_on_failure {
            start.escalation_path().collect()
        } else {
            vec![start]
        };

        let mut attempted = Vec::new();
        let mut last_error = None;

        for tier in path {
            if tier != start {
                warn!(to = %tier, after = ?attempted, "escalating");
            }
            let Some(adapter) = self.adapter(tier) else {
                warn!(tier = %tier, "no adapter registered, skipping tier");
                last_error = Some(format!("no adapter registered for {tier}"));
                continue;
            };

            let policy = self.policy(tier);
            for n in 1..=policy.max_retries {
                attempted.push(tier);
                match attempt(adapter.as_ref(), invocation.clone(), policy.timeout()).await {
                    Ok(payload) => {
                        debug!(tier = %tier, attempted = ?attempted, "tier succeeded");
                        self.record(tier.log_label(), analysis, true).await;
                        return self.success(tier, payload, attempted);
                    }
                    Err(failure) => {
                        warn!(
                            tier = %tier,
                            attempt = n,
                            kind = %failure.kind,
                            detail = %failure.detail,
                            "tier attempt failed"
                        );
                        let auth = failure.kind == FailureKind::AuthRequired;
                        last_error = Some(failure.detail);
                        if auth {
                            break;
                        }
                    }
                }
            }
        }

        debug!(attempted = ?attempted, "every tier failed");
        self.record(ALL_FAILED_LABEL, analysis, false).await;
        RouteOutcome {
            tier: None,
            success: false,
            model: requested_model,
            payload: Payload::Text(ALL_TIERS_FAILED.to_string()),
            error: last_error,
            attempted,
            loop_guard: false,
        }
    }

    fn success(&self, tier: Tier, payload: Payload, attempted: Vec<Tier>) -> RouteOutcome {
        let model = self
            .adapter(tier)
            .map(|a| a.model_label().to_string())
            .unwrap_or_default();
        RouteOutcome {
            tier: Some(tier),
            success: true,
            model,
            payload,
            error: None,
            attempted,
            loop_guard: false,
        }
    }

    async fn record(&self, label: &str, analysis: &TaskAnalysis, success: bool) {
        if let Some(history) = &self.history {
            history
                .append(&LogEntry {
                    ts: timestamp(),
                    tier: label.to_string(),
                    task_type: analysis.task_type.to_string(),
                    success,
                })
                .await;
        }
    }
}

/// One invoke plus read-ahead, bounded by `timeout`.
async fn attempt(
    adapter: &dyn BackendAdapter,
    invocation: Invocation,
    timeout: Duration,
) -> Result<Payload, AttemptFailure> {
    let run = async {
        let outcome = adapter.invoke(invocation).await;
        if !outcome.ok {
            let kind = outcome.failure.unwrap_or(FailureKind::Transport);
            let detail = outcome
                .payload
                .as_text()
                .unwrap_or("adapter reported failure")
                .to_string();
            return Err(AttemptFailure::new(kind, detail));
        }
        commit(outcome.payload).await
    };

    tokio::time::timeout(timeout, run)
        .await
        .unwrap_or_else(|_| {
            Err(AttemptFailure::new(
                FailureKind::Timeout,
                format!("{} timed out after {timeout:?}", adapter.name()),
            ))
        })
}

/// Accepts a payload only once it has shown non-whitespace text. Streams
/// are read ahead to that point and the consumed head is put back in front.
async fn commit(payload: Payload) -> Result<Payload, AttemptFailure> {
    match payload {
        Payload::Text(text) if text.trim().is_empty() => {
            Err(AttemptFailure::new(FailureKind::EmptyResponse, "empty response"))
        }
        Payload::Fragments(mut fragments) => {
            let mut head = String::new();
            while head.trim().is_empty() {
                match fragments.next().await {
                    Some(Ok(fragment)) => head.push_str(&fragment),
                    Some(Err(e)) => {
                        return Err(AttemptFailure::new(FailureKind::from(&e), e.to_string()));
                    }
                    None => {
                        return Err(AttemptFailure::new(
                            FailureKind::EmptyResponse,
                            "stream ended before any text",
                        ));
                    }
                }
            }
            let replay = stream::once(async move { Ok(head) }).chain(fragments);
            Ok(Payload::Fragments(Box::pin(replay)))
        }
        committed => Ok(committed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tiergate_core::{Message, MessageContent};
    use tiergate_test_utils::{MockBackend, Reply};
    use tracing_test::traced_test;

    fn chat(model: &str, text: &str) -> ChatRequest {
        ChatRequest {
            model: model.into(),
            messages: vec![Message::user(text)],
            system: None,
            stream: false,
            tools: None,
        }
    }

    fn fast_routing() -> RoutingConfig {
        let mut routing = RoutingConfig::default();
        for tier in Tier::ALL {
            routing.policy_mut(tier).timeout_secs = 5;
        }
        routing
    }

    struct Fixture {
        router: TierRouter,
        primary: MockBackend,
        secondary: MockBackend,
        last: MockBackend,
        _dir: tempfile::TempDir,
        history: HistoryLog,
    }

    fn fixture(primary: MockBackend, secondary: MockBackend, last: MockBackend) -> Fixture {
        fixture_with(fast_routing(), primary, secondary, last)
    }

    fn fixture_with(
        routing: RoutingConfig,
        primary: MockBackend,
        secondary: MockBackend,
        last: MockBackend,
    ) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let history = HistoryLog::new(dir.path());
        let router = TierRouter::new(
            &routing,
            vec![
                Arc::new(primary.clone()),
                Arc::new(secondary.clone()),
                Arc::new(last.clone()),
            ],
        )
        .with_history(history.clone());
        Fixture {
            router,
            primary,
            secondary,
            last,
            _dir: dir,
            history,
        }
    }

    fn history_entries(history: &HistoryLog) -> Vec<LogEntry> {
        std::fs::read_to_string(history.history_path())
            .unwrap_or_default()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn primary_success_is_logged_once() {
        let f = fixture(
            MockBackend::always(Tier::Primary, Reply::Text("fizzbuzz".into())),
            MockBackend::new(Tier::Secondary),
            MockBackend::new(Tier::LastResort),
        );
        let outcome = f
            .router
            .route(RouteRequest::new(chat("claude-sonnet-4-6", "write python code")))
            .await;

        assert!(outcome.success);
        assert_eq!(outcome.tier, Some(Tier::Primary));
        assert_eq!(outcome.model, "mock-primary");
        assert_eq!(outcome.payload.as_text(), Some("fizzbuzz"));
        assert_eq!(f.secondary.calls() + f.last.calls(), 0);

        let entries = history_entries(&f.history);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].tier, "T1_OLLAMA");
        assert_eq!(entries[0].task_type, "coding");
        assert!(entries[0].success);
    }

    #[tokio::test]
    async fn invocation_carries_flattened_prompt() {
        let f = fixture(
            MockBackend::new(Tier::Primary),
            MockBackend::new(Tier::Secondary),
            MockBackend::new(Tier::LastResort),
        );
        let mut request = chat("claude-sonnet-4-6", "ping");
        request.system = Some(MessageContent::Text("be terse".into()));
        request.stream = true;
        f.router
            .route(RouteRequest::new(request).native_body(serde_json::json!({"raw": 1})))
            .await;

        let seen = f.primary.invocations().await;
        assert_eq!(seen[0].prompt, "[System: be terse]\nping");
        assert_eq!(seen[0].system.as_deref(), Some("be terse"));
        assert_eq!(seen[0].model_hint.as_deref(), Some("claude-sonnet-4-6"));
        assert!(seen[0].stream);
        assert!(seen[0].native_body.is_some());
    }

    #[tokio::test]
    #[traced_test]
    async fn escalates_after_retries() {
        let f = fixture(
            MockBackend::failing(Tier::Primary),
            MockBackend::failing(Tier::Secondary),
            MockBackend::always(Tier::LastResort, Reply::Text("from claude".into())),
        );
        let outcome = f
            .router
            .route(RouteRequest::new(chat("claude-opus", "ping")))
            .await;

        // claude-opus classifies straight to LastResort.
        assert_eq!(outcome.attempted, vec![Tier::LastResort]);
        assert_eq!(f.primary.calls(), 0);

        let outcome = f
            .router
            .route(RouteRequest::new(chat("claude-sonnet-4-6", "ping")))
            .await;
        assert!(outcome.success);
        assert_eq!(outcome.payload.as_text(), Some("from claude"));
        assert_eq!(
            outcome.attempted,
            vec![
                Tier::Primary,
                Tier::Primary,
                Tier::Secondary,
                Tier::Secondary,
                Tier::LastResort
            ]
        );
        assert!(logs_contain("escalating"));
    }

    #[tokio::test]
    async fn never_escalates_backward() {
        let f = fixture(
            MockBackend::new(Tier::Primary),
            MockBackend::failing(Tier::Secondary),
            MockBackend::failing(Tier::LastResort),
        );
        let outcome = f
            .router
            .route(RouteRequest::new(chat("gemini-2.5-flash", "ping")))
            .await;

        assert!(!outcome.success);
        assert_eq!(outcome.payload.as_text(), Some(ALL_TIERS_FAILED));
        assert_eq!(f.primary.calls(), 0);
        assert_eq!(f.secondary.calls(), 2);
        assert_eq!(f.last.calls(), 2);
        assert_eq!(outcome.error.as_deref(), Some("[last_resort unavailable]"));

        let entries = history_entries(&f.history);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].tier, ALL_FAILED_LABEL);
        assert!(!entries[0].success);
    }

    #[tokio::test]
    async fn escalation_can_be_disabled() {
        let mut routing = fast_routing();
        routing.escalate_on_failure = false;
        let f = fixture_with(
            routing,
            MockBackend::failing(Tier::Primary),
            MockBackend::new(Tier::Secondary),
            MockBackend::new(Tier::LastResort),
        );
        let outcome = f
            .router
            .route(RouteRequest::new(chat("claude-sonnet-4-6", "ping")))
            .await;
        assert!(!outcome.success);
        assert_eq!(outcome.attempted, vec![Tier::Primary, Tier::Primary]);
        assert_eq!(f.secondary.calls(), 0);
    }

    #[tokio::test]
    async fn auth_required_skips_remaining_retries() {
        let f = fixture(
            MockBackend::failing(Tier::Primary),
            MockBackend::always(
                Tier::Secondary,
                Reply::Fail(FailureKind::AuthRequired, "login".into()),
            ),
            MockBackend::always(Tier::LastResort, Reply::Text("ok".into())),
        );
        let outcome = f
            .router
            .route(RouteRequest::new(chat("claude-sonnet-4-6", "ping")))
            .await;
        assert!(outcome.success);
        assert_eq!(f.secondary.calls(), 1);
        assert_eq!(outcome.tier, Some(Tier::LastResort));
    }

    #[tokio::test]
    async fn whitespace_text_is_a_failed_attempt() {
        let f = fixture(
            MockBackend::with_replies(
                Tier::Primary,
                vec![Reply::Text("  \n".into()), Reply::Text("second try".into())],
            ),
            MockBackend::new(Tier::Secondary),
            MockBackend::new(Tier::LastResort),
        );
        let outcome = f
            .router
            .route(RouteRequest::new(chat("claude-sonnet-4-6", "ping")))
            .await;
        assert_eq!(outcome.payload.as_text(), Some("second try"));
        assert_eq!(outcome.attempted, vec![Tier::Primary, Tier::Primary]);
    }

    #[tokio::test]
    async fn stream_read_ahead_keeps_every_fragment() {
        let f = fixture(
            MockBackend::with_replies(
                Tier::Primary,
                vec![
                    Reply::Fragments(vec![" ".into(), "\n".into()]),
                    Reply::FragmentsThenError(vec![" ".into()], "reset".into()),
                    Reply::Fragments(vec!["\n".into(), "Hel".into(), "lo".into()]),
                ],
            ),
            MockBackend::new(Tier::Secondary),
            MockBackend::new(Tier::LastResort),
        );
        let outcome = f
            .router
            .route(RouteRequest::new(chat("claude-sonnet-4-6", "ping")))
            .await;

        // Two failed attempts exhaust Primary; Secondary's default answers.
        assert_eq!(outcome.tier, Some(Tier::Secondary));
        assert_eq!(f.primary.calls(), 2);

        // The third scripted reply is still queued.
        let outcome = f
            .router
            .route(RouteRequest::new(chat("claude-sonnet-4-6", "ping")))
            .await;
        assert_eq!(outcome.tier, Some(Tier::Primary));
        assert!(matches!(outcome.payload, Payload::Fragments(_)));
        assert_eq!(outcome.payload.collect_text().await, "\nHello");
    }

    #[tokio::test]
    async fn slow_attempt_times_out() {
        let mut routing = fast_routing();
        routing.primary.timeout_secs = 1;
        routing.primary.max_retries = 1;
        let f = fixture_with(
            routing,
            MockBackend::always(
                Tier::Primary,
                Reply::Slow(Duration::from_secs(30), "late".into()),
            ),
            MockBackend::always(Tier::Secondary, Reply::Text("fast".into())),
            MockBackend::new(Tier::LastResort),
        );
        let started = std::time::Instant::now();
        let outcome = f
            .router
            .route(RouteRequest::new(chat("claude-sonnet-4-6", "ping")))
            .await;
        assert_eq!(outcome.payload.as_text(), Some("fast"));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn loop_guard_invokes_nothing() {
        let f = fixture(
            MockBackend::new(Tier::Primary),
            MockBackend::new(Tier::Secondary),
            MockBackend::new(Tier::LastResort),
        );
        let mut request = chat("claude-opus", "ping");
        request.messages.push(Message::assistant("pong"));
        let outcome = f
            .router
            .route(RouteRequest::new(request).forced(Some(Tier::Secondary)))
            .await;

        assert!(outcome.loop_guard);
        assert!(outcome.success);
        assert_eq!(outcome.payload.as_text(), Some(""));
        assert_eq!(f.primary.calls() + f.secondary.calls() + f.last.calls(), 0);

        let entries = history_entries(&f.history);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].tier, LOOP_GUARD_LABEL);
    }

    #[tokio::test]
    async fn forced_tier_calls_once() {
        let f = fixture(
            MockBackend::new(Tier::Primary),
            MockBackend::failing(Tier::Secondary),
            MockBackend::new(Tier::LastResort),
        );
        let outcome = f
            .router
            .route(RouteRequest::new(chat("claude-opus", "ping")).forced(Some(Tier::Secondary)))
            .await;

        assert!(!outcome.success);
        assert_eq!(f.secondary.calls(), 1);
        assert_eq!(f.primary.calls() + f.last.calls(), 0);
        assert_eq!(
            outcome.payload.as_text(),
            Some("T2 failed: [secondary unavailable]")
        );

        let outcome = f
            .router
            .route(RouteRequest::new(chat("gemini-2.5-pro", "ping")).forced(Some(Tier::Primary)))
            .await;
        assert!(outcome.success);
        assert_eq!(outcome.tier, Some(Tier::Primary));
        assert_eq!(history_entries(&f.history).len(), 2);
    }

    #[tokio::test]
    async fn missing_adapter_is_skipped() {
        let router = TierRouter::new(
            &fast_routing(),
            vec![Arc::new(MockBackend::always(
                Tier::LastResort,
                Reply::Text("only me".into()),
            ))],
        );
        let outcome = router
            .route(RouteRequest::new(chat("claude-sonnet-4-6", "ping")))
            .await;
        assert_eq!(outcome.payload.as_text(), Some("only me"));
        assert_eq!(outcome.attempted, vec![Tier::LastResort]);
    }
}
