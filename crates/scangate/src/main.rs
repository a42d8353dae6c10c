//! # scangate
//!
//! Gateway binary: loads settings, wires the upstream stack into the
//! JSON-RPC registry, and serves it over HTTP until ctrl-c.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use scangate_rpc::{MethodRegistry, RpcContext, register_all};
use scangate_server::metrics::install_recorder;
use scangate_server::{GatewayServer, ServerConfig};
use scangate_settings::GatewaySettings;
use scangate_upstream::{HttpTransport, ScanService};

/// JSON-RPC gateway to a rate-limited scanning service.
#[derive(Parser, Debug)]
#[command(name = "scangate", version, about = "JSON-RPC gateway to a scanning service")]
struct Cli {
    /// Settings file (defaults to `~/.scangate/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Log level or `EnvFilter` directive (overrides settings).
    #[arg(long)]
    log_level: Option<String>,

    /// Emit JSON log lines.
    #[arg(long)]
    json_logs: bool,
}

impl Cli {
    fn settings_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(scangate_settings::settings_path)
    }

    /// Fold command-line overrides into loaded settings.
    fn apply(&self, settings: &mut GatewaySettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        if self.json_logs {
            settings.logging.json = true;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let path = args.settings_path();
    let mut settings = scangate_settings::load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;
    args.apply(&mut settings);
    settings.validate().context("Invalid settings")?;

    scangate_core::logging::init_subscriber(&settings.logging.level, settings.logging.json);
    let metrics = install_recorder();
    tracing::info!(settings = %path.display(), "settings loaded");
    if settings.upstream.api_key.is_none() {
        tracing::warn!("SCANGATE_API_KEY is not set; upstream calls will be rejected");
    }

    let transport = HttpTransport::new(&settings.upstream).context("Failed to build upstream client")?;
    let scans = Arc::new(ScanService::new(&settings, Arc::new(transport)));

    let mut registry = MethodRegistry::new();
    register_all(&mut registry);
    let method_count = registry.methods().len();

    let config = ServerConfig::from_settings(&settings.server, &settings.streaming);
    let shutdown_timeout = config.shutdown_timeout;
    let server = GatewayServer::new(config, registry, RpcContext::new(scans)).with_metrics(metrics);

    let (addr, handle) = server.listen().await.context("Failed to bind server")?;
    tracing::info!("scangate listening on http://{addr} ({method_count} RPC methods registered)");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    server
        .shutdown()
        .graceful_shutdown(vec![handle], Some(shutdown_timeout))
        .await;

    tracing::info!("Shutdown complete");
    Ok(())
}
