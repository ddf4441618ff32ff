//! mcpmux CLI: spawns the configured backend fleet, aggregates them behind
//! one [`mcpmux::Orchestrator`], and serves the combined catalog to a single
//! downstream client over stdio.
//!
//! Everything outside this thin wiring layer — compose-style config
//! loading, container lifecycle, OAuth, dashboards — is out of scope for
//! the core engine (§1) and, for this CLI, out of scope entirely: `run`
//! spawns plain child processes and reads a flat TOML list of them.

#![forbid(unsafe_code)]

mod config;
mod process_runtime;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use mcpmux::{Orchestrator, ServerRuntime};
use mcpmux_protocol::types::{ClientInfo, ServerInfo};
use mcpmux_transport::{StdioTransport, Transport};

use config::FleetConfig;
use process_runtime::ProcessRuntime;

/// mcpmux: orchestrate and multiplex a fleet of MCP servers behind one
/// endpoint.
#[derive(Parser)]
#[command(name = "mcpmux", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the orchestrator: connect every configured backend, then serve
    /// the aggregated catalog to a downstream client over stdio.
    Run {
        /// Path to a TOML fleet config (see [`config::FleetConfig`]).
        #[arg(long, short = 'c')]
        config: PathBuf,
    },
    /// Validate a fleet config without connecting to anything.
    Check {
        /// Path to a TOML fleet config.
        #[arg(long, short = 'c')]
        config: PathBuf,
    },
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to start async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    runtime.block_on(async move {
        match cli.command {
            Commands::Run { config } => run(config).await,
            Commands::Check { config } => check(config),
        }
    })
}

fn check(path: PathBuf) -> ExitCode {
    match FleetConfig::load(&path) {
        Ok(fleet) => {
            println!("{} server(s) configured:", fleet.servers.len());
            for server in &fleet.servers {
                println!("  {} -> {} {}", server.name, server.command, server.args.join(" "));
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(path: PathBuf) -> ExitCode {
    let fleet = match FleetConfig::load(&path) {
        Ok(fleet) => fleet,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };
    if fleet.servers.is_empty() {
        eprintln!("no servers configured in {}", path.display());
        return ExitCode::FAILURE;
    }

    let orchestrator = Orchestrator::new(ClientInfo {
        name: "mcpmux".to_owned(),
        version: env!("CARGO_PKG_VERSION").to_owned(),
    });

    for server in &fleet.servers {
        let name = server.name.clone();
        let runtime: Arc<dyn ServerRuntime> = Arc::new(ProcessRuntime::new(server.clone()));
        log::info!(target: "mcpmux", "connecting backend {name}");
        if let Err(err) = orchestrator.register_backend(name.clone(), runtime).await {
            eprintln!("failed to connect backend {name}: {}", err.message);
            return ExitCode::FAILURE;
        }
    }

    let client_transport: Arc<dyn Transport> = Arc::new(StdioTransport::stdio());
    let client = orchestrator
        .register_client(
            "local",
            client_transport,
            ServerInfo {
                name: "mcpmux".to_owned(),
                version: env!("CARGO_PKG_VERSION").to_owned(),
            },
        )
        .await;

    log::info!(target: "mcpmux", "serving {} backend(s) over stdio", fleet.servers.len());
    let _ = tokio::signal::ctrl_c().await;
    client.close().await;
    ExitCode::SUCCESS
}
