// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `tiergate serve` command implementation.
//!
//! Builds the three tier adapters from config, probes them once, writes the
//! session snapshot and serves the gateway until SIGINT or SIGTERM.

use std::sync::Arc;

use futures::future::join_all;
use tiergate_anthropic::ClaudeAdapter;
use tiergate_config::TiergateConfig;
use tiergate_core::{BackendAdapter, HealthStatus, SessionSnapshot, Tier, TiergateError};
use tiergate_gateway::GatewayState;
use tiergate_gemini::GeminiAdapter;
use tiergate_ollama::OllamaAdapter;
use tiergate_router::{HistoryLog, TierRouter, timestamp};
use tracing::{info, warn};

/// One adapter per tier, in tier order.
pub fn build_adapters(
    config: &TiergateConfig,
) -> Result<Vec<Arc<dyn BackendAdapter>>, TiergateError> {
    Ok(vec![
        Arc::new(OllamaAdapter::new(config)?),
        Arc::new(GeminiAdapter::new(config)),
        Arc::new(ClaudeAdapter::new(config)?),
    ])
}

/// Health of every adapter, probed concurrently.
pub async fn probe(adapters: &[Arc<dyn BackendAdapter>]) -> Vec<(Tier, HealthStatus)> {
    let checks = adapters.iter().map(|adapter| async move {
        (adapter.tier(), adapter.health_check().await)
    });
    join_all(checks).await
}

/// Availability snapshot for `session.json`.
pub fn snapshot(health: &[(Tier, HealthStatus)]) -> SessionSnapshot {
    let available = |tier: Tier| {
        health
            .iter()
            .any(|(t, status)| *t == tier && status.is_available())
    };
    SessionSnapshot {
        started: timestamp(),
        t1_available: available(Tier::Primary),
        t2_available: available(Tier::Secondary),
        t3_available: available(Tier::LastResort),
    }
}

/// Router over the configured adapters, logging history when a history
/// directory can be resolved.
pub fn build_router(
    config: &TiergateConfig,
    adapters: Vec<Arc<dyn BackendAdapter>>,
) -> (TierRouter, Option<HistoryLog>) {
    let router = TierRouter::new(&config.routing, adapters);
    match config.history.resolved_dir() {
        Some(dir) => {
            let history = HistoryLog::new(dir);
            (router.with_history(history.clone()), Some(history))
        }
        None => {
            warn!("no home directory, routing history disabled");
            (router, None)
        }
    }
}

/// Runs the `tiergate serve` command.
pub async fn run_serve(config: TiergateConfig) -> Result<(), TiergateError> {
    info!("starting tiergate serve");

    let adapters = build_adapters(&config)?;
    let health = probe(&adapters).await;
    for (tier, status) in &health {
        match status {
            HealthStatus::Healthy => info!(tier = %tier, "tier available"),
            HealthStatus::Degraded(reason) => warn!(tier = %tier, reason, "tier degraded"),
            HealthStatus::Unhealthy(reason) => warn!(tier = %tier, reason, "tier unavailable"),
        }
    }

    let (router, history) = build_router(&config, adapters);
    if let Some(history) = &history {
        history.write_session_snapshot(&snapshot(&health)).await;
    }

    let state = GatewayState::new(Arc::new(router));
    tiergate_gateway::serve(
        &config.server.host,
        config.server.port,
        state,
        shutdown_signal(),
    )
    .await?;

    info!("tiergate serve shutdown complete");
    Ok(())
}

/// Resolves on SIGINT, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT (Ctrl+C), initiating shutdown"),
        _ = terminate => info!("received SIGTERM, initiating shutdown"),
    }
}

/// Initializes the tracing subscriber with the given log level.
///
/// Logs go to stderr so `route` output on stdout stays clean.
pub fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("tiergate={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use tiergate_test_utils::MockBackend;

    fn mocks() -> Vec<Arc<dyn BackendAdapter>> {
        vec![
            Arc::new(MockBackend::new(Tier::Primary)),
            Arc::new(
                MockBackend::new(Tier::Secondary)
                    .with_health(HealthStatus::Unhealthy("not logged in".into())),
            ),
            Arc::new(
                MockBackend::new(Tier::LastResort)
                    .with_health(HealthStatus::Degraded("slow".into())),
            ),
        ]
    }

    #[tokio::test]
    async fn snapshot_reflects_probe_results() {
        let health = probe(&mocks()).await;
        assert_eq!(health.len(), 3);

        let snapshot = snapshot(&health);
        assert!(snapshot.t1_available);
        assert!(!snapshot.t2_available);
        assert!(snapshot.t3_available);
    }

    #[test]
    fn missing_tier_is_unavailable() {
        let snapshot = snapshot(&[(Tier::Primary, HealthStatus::Healthy)]);
        assert!(snapshot.t1_available);
        assert!(!snapshot.t3_available);
    }

    #[test]
    fn router_uses_configured_history_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = TiergateConfig::default();
        config.history.dir = Some(dir.path().display().to_string());

        let (router, history) = build_router(&config, mocks());
        assert_eq!(router.adapters().count(), 3);
        assert_eq!(
            history.unwrap().session_path(),
            dir.path().join("session.json")
        );
    }

    #[test]
    fn default_config_builds_every_adapter() {
        let adapters = build_adapters(&TiergateConfig::default()).unwrap();
        let tiers: Vec<Tier> = adapters.iter().map(|a| a.tier()).collect();
        assert_eq!(tiers, Tier::ALL.to_vec());
    }
}
