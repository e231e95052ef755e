// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `tiergate route` command implementation.
//!
//! Sends a single prompt through the same router the gateway uses and
//! writes the answer to stdout as it arrives.

use futures::StreamExt;
use tiergate_config::TiergateConfig;
use tiergate_core::types::DEFAULT_REQUEST_MODEL;
use tiergate_core::{ChatRequest, Message, Payload, Tier, TiergateError};
use tiergate_router::RouteRequest;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::info;

use crate::serve::{build_adapters, build_router};

/// Builds the one-shot request. An unparseable `tier` is a config error.
pub fn build_request(
    prompt: String,
    tier: Option<&str>,
    model: Option<String>,
) -> Result<RouteRequest, TiergateError> {
    let forced = tier
        .map(|raw| {
            Tier::parse_directive(raw).ok_or_else(|| {
                TiergateError::Config(format!(
                    "invalid tier '{raw}': expected 1, 2, 3, primary, secondary or last_resort"
                ))
            })
        })
        .transpose()?;

    let chat = ChatRequest {
        model: model.unwrap_or_else(|| DEFAULT_REQUEST_MODEL.to_string()),
        messages: vec![Message::user(prompt)],
        system: None,
        stream: true,
        tools: None,
    };
    Ok(RouteRequest::new(chat).forced(forced))
}

async fn read_stdin() -> Result<String, TiergateError> {
    let mut prompt = String::new();
    tokio::io::stdin()
        .read_to_string(&mut prompt)
        .await
        .map_err(|e| TiergateError::Process {
            message: "failed to read prompt from stdin".into(),
            source: Some(e),
        })?;
    Ok(prompt)
}

async fn write_payload(
    out: &mut (impl AsyncWriteExt + Unpin),
    payload: Payload,
) -> std::io::Result<()> {
    match payload {
        Payload::Fragments(mut fragments) => {
            while let Some(fragment) = fragments.next().await {
                match fragment {
                    Ok(text) => out.write_all(text.as_bytes()).await?,
                    Err(e) => {
                        out.write_all(format!("\n[stream error: {e}]").as_bytes())
                            .await?;
                        break;
                    }
                }
                out.flush().await?;
            }
        }
        other => out.write_all(other.collect_text().await.as_bytes()).await?,
    }
    out.write_all(b"\n").await?;
    out.flush().await
}

/// Run the `tiergate route` command.
pub async fn run_route(
    config: &TiergateConfig,
    prompt: Option<String>,
    tier: Option<String>,
    model: Option<String>,
) -> Result<(), TiergateError> {
    let prompt = match prompt {
        Some(prompt) => prompt,
        None => read_stdin().await?,
    };
    if prompt.trim().is_empty() {
        return Err(TiergateError::Config("prompt is empty".into()));
    }
    let request = build_request(prompt, tier.as_deref(), model)?;

    let (router, _history) = build_router(config, build_adapters(config)?);
    let outcome = router.route(request).await;
    info!(tier = ?outcome.tier, model = %outcome.model, attempted = ?outcome.attempted, "routed");

    let mut stdout = tokio::io::stdout();
    write_payload(&mut stdout, outcome.payload)
        .await
        .map_err(|e| TiergateError::Process {
            message: "failed to write answer".into(),
            source: Some(e),
        })?;

    if outcome.success {
        Ok(())
    } else {
        Err(TiergateError::Internal(
            outcome.error.unwrap_or_else(|| "routing failed".into()),
        ))
    }
}
