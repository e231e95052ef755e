// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers.
//!
//! Handles GET /health, GET /v1/models and the three chat POST routes.

use axum::{
    Json,
    body::{Body, Bytes},
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::{Value, json};
use tiergate_core::prompt::word_count;
use tiergate_core::{ChatRequest, Payload, RouteOutcome, Tier};
use tiergate_router::RouteRequest;
use tracing::{debug, info};

use crate::dialect::{self, CHAT_COMPLETION, MESSAGE_BLOCK, WireDialect};
use crate::server::GatewayState;
use crate::sse::{self, StreamEmitter};

/// Header that forces a tier: `primary|secondary|last_resort|1|2|3`.
pub const TIER_HEADER: &str = "x-tiergate-tier";

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error description.
    pub error: String,
}

fn bad_request(error: impl Into<String>) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
        .into_response()
}

/// One row of the `/health` tier table.
#[derive(Debug, Serialize)]
pub struct TierInfo {
    pub tier: Tier,
    pub adapter: String,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub models: Vec<String>,
}

/// Response body for GET /health.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub routing: Value,
    pub tiers: Vec<TierInfo>,
}

/// GET /health
pub async fn get_health(State(state): State<GatewayState>) -> Json<HealthResponse> {
    let router = &state.router;
    let tiers = router
        .adapters()
        .map(|adapter| {
            let policy = router.policy(adapter.tier());
            TierInfo {
                tier: adapter.tier(),
                adapter: adapter.name().to_string(),
                model: adapter.model_label().to_string(),
                timeout_secs: policy.timeout_secs,
                max_retries: policy.max_retries,
                models: policy.models.clone(),
            }
        })
        .collect();

    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        routing: json!({
            "default": Tier::Primary,
            "order": Tier::ALL,
            "escalate_on_failure": router.escalates(),
        }),
        tiers,
    })
}

/// GET /v1/models
pub async fn get_models(State(state): State<GatewayState>) -> Json<Value> {
    let data: Vec<Value> = state
        .router
        .adapters()
        .map(|adapter| {
            json!({
                "type": "model",
                "id": adapter.model_label(),
                "display_name": format!(
                    "T{} · {} ({})",
                    adapter.tier().rank(),
                    adapter.model_label(),
                    adapter.name()
                ),
                "created_at": "2025-01-01T00:00:00Z",
            })
        })
        .collect();
    let first_id = data.first().map(|m| m["id"].clone()).unwrap_or(Value::Null);
    let last_id = data.last().map(|m| m["id"].clone()).unwrap_or(Value::Null);

    Json(json!({
        "data": data,
        "has_more": false,
        "first_id": first_id,
        "last_id": last_id,
    }))
}

/// POST /
///
/// Dialect is inferred from the request.
pub async fn post_root(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match parse_body(&body) {
        Ok(value) => {
            let dialect = dialect::detect(&headers, &value);
            handle_chat(state, &headers, value, dialect).await
        }
        Err(response) => response,
    }
}

/// POST /v1/messages
pub async fn post_messages(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match parse_body(&body) {
        Ok(value) => handle_chat(state, &headers, value, &MESSAGE_BLOCK).await,
        Err(response) => response,
    }
}

/// POST /v1/chat/completions
pub async fn post_chat_completions(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match parse_body(&body) {
        Ok(value) => handle_chat(state, &headers, value, &CHAT_COMPLETION).await,
        Err(response) => response,
    }
}

/// The body must be a JSON object; an empty body counts as `{}`.
fn parse_body(body: &[u8]) -> Result<Value, Response> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(json!({}));
    }
    match serde_json::from_slice::<Value>(body) {
        Ok(value) if value.is_object() => Ok(value),
        Ok(_) => Err(bad_request("request body must be a JSON object")),
        Err(e) => Err(bad_request(format!("malformed JSON: {e}"))),
    }
}

fn forced_tier(headers: &HeaderMap) -> Result<Option<Tier>, Response> {
    let Some(raw) = headers.get(TIER_HEADER) else {
        return Ok(None);
    };
    raw.to_str()
        .ok()
        .and_then(Tier::parse_directive)
        .map(Some)
        .ok_or_else(|| bad_request(format!("invalid {TIER_HEADER} header")))
}

async fn handle_chat(
    state: GatewayState,
    headers: &HeaderMap,
    value: Value,
    dialect: &'static dyn WireDialect,
) -> Response {
    let forced = match forced_tier(headers) {
        Ok(forced) => forced,
        Err(response) => return response,
    };
    let native_body = (dialect.name() == MESSAGE_BLOCK.name()).then(|| value.clone());
    let chat: ChatRequest = match serde_json::from_value(value) {
        Ok(chat) => chat,
        Err(e) => return bad_request(format!("invalid request: {e}")),
    };

    let stream = chat.stream;
    info!(model = %chat.model, stream, dialect = dialect.name(), forced = ?forced, "chat request");

    let mut request = RouteRequest::new(chat).forced(forced);
    if let Some(body) = native_body {
        request = request.native_body(body);
    }
    let outcome = state.router.route(request).await;
    debug!(tier = ?outcome.tier, success = outcome.success, attempted = ?outcome.attempted, "routed");

    let tier_label = tier_header_value(&outcome);
    let mut response = respond(outcome.payload, dialect, &outcome.model, stream).await;
    response
        .headers_mut()
        .insert(TIER_HEADER, HeaderValue::from_static(tier_label));
    response
}

fn tier_header_value(outcome: &RouteOutcome) -> &'static str {
    match (outcome.loop_guard, outcome.tier) {
        (true, _) => "loop_guard",
        (false, Some(Tier::Primary)) => "primary",
        (false, Some(Tier::Secondary)) => "secondary",
        (false, Some(Tier::LastResort)) => "last_resort",
        (false, None) => "none",
    }
}

async fn respond(
    payload: Payload,
    dialect: &'static dyn WireDialect,
    model: &str,
    stream: bool,
) -> Response {
    match payload {
        Payload::Passthrough { content_type, body } => {
            let mut response = Body::from_stream(body).into_response();
            if let Ok(value) = HeaderValue::from_str(&content_type) {
                response.headers_mut().insert(header::CONTENT_TYPE, value);
            }
            response
        }
        payload if stream => {
            let emitter = StreamEmitter::new(dialect, model);
            sse::into_sse(sse::frames(emitter, payload)).into_response()
        }
        payload => {
            let text = payload.collect_text().await;
            let meta = dialect.meta(model);
            Json(dialect.complete(&meta, &text, word_count(&text))).into_response()
        }
    }
}
