// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tiergate - a tiered LLM router.
//!
//! This is the binary entry point: `serve` runs the HTTP gateway, `status`
//! probes every tier and `route` sends one prompt through the router.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod route;
mod serve;
mod status;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Tiergate - routes chat requests across local, cloud and premium backends.
#[derive(Parser, Debug)]
#[command(name = "tiergate", version, about, long_about = None)]
struct Cli {
    /// Explicit config file (skips the standard search path).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP gateway (default).
    Serve,
    /// Probe every tier and print its availability.
    Status {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Route one prompt and print the answer.
    Route {
        /// Prompt text. Read from stdin when omitted.
        prompt: Option<String>,
        /// Force a tier: 1, 2, 3 or primary, secondary, last_resort.
        #[arg(long)]
        tier: Option<String>,
        /// Requested model id, used for tier classification.
        #[arg(long)]
        model: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => tiergate_config::load_and_validate_path(path),
        None => tiergate_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            tiergate_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    serve::init_tracing(&config.server.log_level);

    let result = match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve::run_serve(config).await,
        Commands::Status { json } => status::run_status(&config, json).await,
        Commands::Route {
            prompt,
            tier,
            model,
        } => route::run_route(&config, prompt, tier, model).await,
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    #[cfg(not(target_env = "msvc"))]
    fn jemalloc_is_active() {
        use tikv_jemalloc_ctl::{epoch, stats};
        epoch::advance().unwrap();
        let allocated = stats::allocated::read().unwrap();
        assert!(allocated > 0, "jemalloc should report non-zero allocation");
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn no_subcommand_means_serve() {
        let cli = Cli::try_parse_from(["tiergate"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn route_accepts_tier_and_model() {
        let cli = Cli::try_parse_from([
            "tiergate", "route", "hello", "--tier", "2", "--model", "gemini-2.5-pro",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Route {
                prompt,
                tier,
                model,
            }) => {
                assert_eq!(prompt.as_deref(), Some("hello"));
                assert_eq!(tier.as_deref(), Some("2"));
                assert_eq!(model.as_deref(), Some("gemini-2.5-pro"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn status_json_flag() {
        let cli = Cli::try_parse_from(["tiergate", "status", "--json"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Status { json: true })));
    }
}
