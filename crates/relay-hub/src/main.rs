//! # relay-hub
//!
//! Relay hub server binary: loads settings, initializes logging and metrics,
//! and serves the WebSocket broadcast hub until Ctrl-C.

#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use relay_server::metrics;
use relay_server::{RelayServer, ServerConfig};
use relay_settings::{LogFormat, RelaySettings};

/// WebSocket broadcast hub server.
#[derive(Parser, Debug)]
#[command(name = "relay-hub", about = "WebSocket broadcast hub server")]
struct Cli {
    /// Settings file (defaults to `~/.relay/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Hub that `/api/ws` joins (overrides settings).
    #[arg(long)]
    hub_name: Option<String>,

    /// Log level or filter directive (overrides settings).
    #[arg(long)]
    log_level: Option<String>,

    /// Log output format: `compact` or `json` (overrides settings).
    #[arg(long, value_parser = parse_log_format)]
    log_format: Option<LogFormat>,
}

fn parse_log_format(raw: &str) -> std::result::Result<LogFormat, String> {
    LogFormat::parse(raw).ok_or_else(|| format!("unknown log format '{raw}'"))
}

impl Cli {
    /// Load settings from `--config` or the default path.
    fn load_settings(&self) -> Result<RelaySettings> {
        let path = self
            .config
            .clone()
            .unwrap_or_else(relay_settings::settings_path);
        relay_settings::load_settings_from_path(&path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))
    }

    /// Apply CLI flags on top of loaded settings.
    fn apply_overrides(&self, settings: &mut RelaySettings) {
        if let Some(ref host) = self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(ref name) = self.hub_name {
            settings.hub.name.clone_from(name);
        }
        if let Some(ref level) = self.log_level {
            settings.logging.level.clone_from(level);
        }
        if let Some(format) = self.log_format {
            settings.logging.format = format;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let mut settings = args.load_settings()?;
    args.apply_overrides(&mut settings);
    settings.validate().context("Invalid settings")?;

    relay_logging::init_from_settings(&settings.logging);

    let metrics_handle =
        metrics::install_recorder().context("Failed to install metrics recorder")?;

    let config = ServerConfig::from(&settings);
    let shutdown_timeout = config.shutdown_timeout();
    let server = RelayServer::new(config, metrics_handle);

    let (addr, handle) = server
        .listen()
        .await
        .context("Failed to bind server")?;

    tracing::info!(
        hub = %settings.hub.name,
        "relay hub listening on http://{addr} (ws://{addr}/api/ws)"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    let clean = server
        .shutdown()
        .graceful_shutdown(vec![handle], Some(shutdown_timeout))
        .await;

    tracing::info!(clean, "Shutdown complete");
    Ok(())
}
