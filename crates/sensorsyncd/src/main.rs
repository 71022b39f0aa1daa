//! sensorsyncd - sensorsync gateway daemon
//!
//! Bridges a sensor radio gateway (TCP, semicolon-delimited lines) to a
//! remote device registry (HTTP).
//!
//! # Usage
//!
//! ```bash
//! # Log-only gateway against localhost:1315
//! sensorsyncd
//!
//! # With config file
//! sensorsyncd --config sensorsync.toml
//!
//! # Override registry and link from the command line
//! sensorsyncd --registry-url http://mysensors:4711 --link-host radio.local
//! ```

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use sensorsyncd::config::RegistryConfig;
use sensorsyncd::{build_engine, logging, GatewayConfig, Link};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "sensorsyncd")]
#[command(about = "Bridges a sensor radio gateway to a remote device registry")]
struct Args {
    /// Configuration file path (TOML format)
    #[arg(short, long, env = "SENSORSYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Radio gateway host
    #[arg(long)]
    link_host: Option<String>,

    /// Radio gateway port
    #[arg(long)]
    link_port: Option<u16>,

    /// Device registry base URL (enables registry sync)
    #[arg(long)]
    registry_url: Option<String>,

    /// Local store file
    #[arg(long)]
    store: Option<PathBuf>,

    /// Owner id attached to every sensor stream
    #[arg(long)]
    user_id: Option<String>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    /// Apply command-line overrides on top of the file configuration
    fn apply(self, config: &mut GatewayConfig) {
        if let Some(host) = self.link_host {
            config.link.host = host;
        }
        if let Some(port) = self.link_port {
            config.link.port = port;
        }
        if let Some(url) = self.registry_url {
            match config.registry.as_mut() {
                Some(registry) => registry.base_url = url,
                None => config.registry = Some(RegistryConfig::new(url)),
            }
        }
        if let Some(path) = self.store {
            config.store.path = Some(path);
        }
        if let Some(user_id) = self.user_id {
            config.user_id = user_id;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => GatewayConfig::load(path)?,
        None => GatewayConfig::default(),
    };
    let verbose = args.verbose;
    args.apply(&mut config);

    logging::init(config.log_format, verbose);
    info!("Starting sensorsyncd");

    let engine = build_engine(&config).await?;
    let link = Link::new(config.link.clone(), engine);

    tokio::select! {
        _ = link.run() => {}
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("Shutting down");
        }
    }

    Ok(())
}
