#![deny(clippy::all)]
#![warn(clippy::pedantic)]

//! # appium-service
//!
//! Runs a local Appium server under supervision.
//!
//! ## Subcommands
//!
//! - `appium-service run` — start the server, stream its output, stop it on
//!   Ctrl-C or when it stops answering its status endpoint
//! - `appium-service status` — probe the configured status endpoint once
//!
//! Configuration comes from `--config <path>` (or `appium-service.toml` in
//! CWD) with `APPIUM_*` env var overrides; see `config.rs`.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use appium_service::service::probe;
use appium_service::{Config, LocalService};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

/// Supervisor for a locally launched Appium server.
#[derive(Parser)]
#[command(name = "appium-service", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the server and keep it running until Ctrl-C.
    Run {
        /// Path to TOML config file.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Seconds between liveness checks.
        #[arg(long, default_value_t = 5)]
        watch_interval: u64,
    },
    /// Check whether a server answers the configured status endpoint.
    Status {
        /// Path to TOML config file.
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config_path = match &cli.command {
        Commands::Run { config, .. } | Commands::Status { config } => config.clone(),
    };
    let config = match Config::load(config_path.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("appium-service: configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| config.logging.level.clone());
    tracing_subscriber::fmt().with_env_filter(log_filter).init();

    match cli.command {
        Commands::Run { watch_interval, .. } => run(&config, watch_interval).await,
        Commands::Status { .. } => status(&config).await,
    }
}

async fn run(config: &Config, watch_interval: u64) -> ExitCode {
    let service = LocalService::new(config.service_config());
    service.on_output(|line| info!(target: "appium", "{line}"));

    info!("appium-service v{} starting", env!("CARGO_PKG_VERSION"));
    if let Err(e) = service.start().await {
        error!("{e}");
        return ExitCode::FAILURE;
    }
    if let Ok(url) = service.service_url() {
        info!("Appium server running at {url} (pid {:?})", service.pid().await);
    }

    let mut ticker = tokio::time::interval(Duration::from_secs(watch_interval.max(1)));
    ticker.tick().await;

    let code = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl-C received, stopping server");
                break ExitCode::SUCCESS;
            }
            _ = ticker.tick() => {
                if !service.is_running().await {
                    warn!("Server stopped answering its status endpoint");
                    break ExitCode::FAILURE;
                }
            }
        }
    };

    service.stop().await;
    info!("Server stopped");
    code
}

async fn status(config: &Config) -> ExitCode {
    let service = config.service_config();
    let url = match appium_service::service::status::status_url(
        service.arguments(),
        service.bind_address(),
        service.port(),
    ) {
        Ok(u) => u,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };
    let client = match probe::build_client() {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to build HTTP client: {e}");
            return ExitCode::FAILURE;
        }
    };

    if probe::probe(&client, &url, probe::LIVENESS_TIMEOUT).await {
        println!("running ({url})");
        ExitCode::SUCCESS
    } else {
        println!("not running ({url})");
        ExitCode::FAILURE
    }
}
