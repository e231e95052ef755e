// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `tiergate status` command implementation.
//!
//! Probes every tier adapter directly and asks the gateway's health
//! endpoint whether a server is already running.

use std::io::IsTerminal;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tiergate_config::TiergateConfig;
use tiergate_core::{BackendAdapter, HealthStatus, Tier, TiergateError};

use crate::serve::{build_adapters, probe};

/// Health endpoint response from the gateway.
#[derive(Debug, Deserialize)]
struct GatewayHealth {
    uptime_secs: u64,
}

/// One tier row.
#[derive(Debug, Serialize)]
pub struct TierStatus {
    pub tier: Tier,
    pub adapter: String,
    pub model: String,
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Structured status output for `--json` mode.
#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub gateway_running: bool,
    pub gateway_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uptime_secs: Option<u64>,
    pub tiers: Vec<TierStatus>,
}

/// Format seconds into a human-readable duration string.
fn format_uptime(secs: u64) -> String {
    let days = secs / 86400;
    let hours = (secs % 86400) / 3600;
    let minutes = (secs % 3600) / 60;

    if days > 0 {
        format!("{days}d {hours}h {minutes}m")
    } else if hours > 0 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}

fn tier_rows(
    adapters: &[std::sync::Arc<dyn BackendAdapter>],
    health: Vec<(Tier, HealthStatus)>,
) -> Vec<TierStatus> {
    adapters
        .iter()
        .zip(health)
        .map(|(adapter, (tier, status))| {
            let detail = match &status {
                HealthStatus::Healthy => None,
                HealthStatus::Degraded(reason) | HealthStatus::Unhealthy(reason) => {
                    Some(reason.clone())
                }
            };
            TierStatus {
                tier,
                adapter: adapter.name().to_string(),
                model: adapter.model_label().to_string(),
                available: status.is_available(),
                detail,
            }
        })
        .collect()
}

async fn gateway_uptime(url: &str) -> Option<u64> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(3))
        .build()
        .ok()?;
    let resp = client.get(url).send().await.ok()?;
    if !resp.status().is_success() {
        return None;
    }
    resp.json::<GatewayHealth>().await.ok().map(|h| h.uptime_secs)
}

/// Run the `tiergate status` command.
pub async fn run_status(config: &TiergateConfig, json: bool) -> Result<(), TiergateError> {
    let adapters = build_adapters(config)?;
    let health = probe(&adapters).await;

    let gateway_url = format!(
        "http://{}:{}/health",
        config.server.host, config.server.port
    );
    let uptime_secs = gateway_uptime(&gateway_url).await;

    let report = StatusReport {
        gateway_running: uptime_secs.is_some(),
        gateway_url,
        uptime_secs,
        tiers: tier_rows(&adapters, health),
    };

    if json {
        let body = serde_json::to_string_pretty(&report)
            .map_err(|e| TiergateError::Internal(format!("failed to encode status: {e}")))?;
        println!("{body}");
    } else {
        print_report(&report, std::io::stdout().is_terminal());
    }
    Ok(())
}

fn print_report(report: &StatusReport, use_color: bool) {
    use colored::Colorize;

    println!();
    println!("  tiergate status");
    println!("  {}", "-".repeat(35));

    match report.uptime_secs {
        Some(secs) if use_color => println!(
            "    Gateway:  {} running (uptime: {})",
            "✓".green(),
            format_uptime(secs)
        ),
        Some(secs) => println!("    Gateway:  [OK] running (uptime: {})", format_uptime(secs)),
        None if use_color => println!("    Gateway:  {} {}", "✗".red(), "not running".red()),
        None => println!("    Gateway:  [FAIL] not running"),
    }
    println!("    Endpoint: {}", report.gateway_url);
    println!();

    for row in &report.tiers {
        let mark = match (row.available, use_color) {
            (true, true) => "✓".green().to_string(),
            (false, true) => "✗".red().to_string(),
            (true, false) => "[OK]".to_string(),
            (false, false) => "[FAIL]".to_string(),
        };
        let detail = row
            .detail
            .as_deref()
            .map(|d| format!(" - {d}"))
            .unwrap_or_default();
        println!(
            "    T{} {:<12} {mark} {} ({}){detail}",
            row.tier.rank(),
            row.adapter,
            row.model,
            row.tier
        );
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tiergate_test_utils::MockBackend;

    #[test]
    fn format_uptime_minutes() {
        assert_eq!(format_uptime(120), "2m");
    }

    #[test]
    fn format_uptime_hours() {
        assert_eq!(format_uptime(3720), "1h 2m");
    }

    #[test]
    fn format_uptime_days() {
        assert_eq!(format_uptime(90060), "1d 1h 1m");
    }

    #[tokio::test]
    async fn rows_carry_health_detail() {
        let adapters: Vec<Arc<dyn BackendAdapter>> = vec![
            Arc::new(MockBackend::new(Tier::Primary).with_label("qwen")),
            Arc::new(
                MockBackend::new(Tier::Secondary)
                    .with_health(HealthStatus::Unhealthy("gemini not found".into())),
            ),
        ];
        let rows = tier_rows(&adapters, probe(&adapters).await);

        assert_eq!(rows.len(), 2);
        assert!(rows[0].available);
        assert_eq!(rows[0].model, "qwen");
        assert_eq!(rows[0].detail, None);
        assert!(!rows[1].available);
        assert_eq!(rows[1].detail.as_deref(), Some("gemini not found"));
    }

    #[test]
    fn report_serializes_without_empty_fields() {
        let report = StatusReport {
            gateway_running: false,
            gateway_url: "http://127.0.0.1:4000/health".into(),
            uptime_secs: None,
            tiers: vec![TierStatus {
                tier: Tier::LastResort,
                adapter: "claude-cli".into(),
                model: "claude-opus-4-6".into(),
                available: true,
                detail: None,
            }],
        };
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"gateway_running\":false"));
        assert!(json.contains("\"tier\":\"last_resort\""));
        assert!(!json.contains("uptime_secs"));
        assert!(!json.contains("detail"));
    }

    #[tokio::test]
    async fn unreachable_gateway_has_no_uptime() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        assert_eq!(gateway_uptime(&format!("http://127.0.0.1:{port}/health")).await, None);
    }
}
