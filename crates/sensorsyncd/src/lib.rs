//! sensorsyncd - sensorsync gateway daemon
//!
//! Wires the engine to its collaborators: the local store selected by
//! configuration, the HTTP registry client and the TCP link to the radio
//! gateway.

pub mod config;
pub mod link;
pub mod logging;

use std::sync::Arc;

use sensorsync_core::{JsonFileStore, LocalStore, MemoryStore};
use sensorsync_engine::{OutboundWriter, SyncEngine};
use sensorsync_registry::{HttpRegistryTransport, RegistryClient};
use tracing::info;

pub use config::GatewayConfig;
pub use link::{Link, TcpSink};

/// Open the configured local store
pub async fn open_store(config: &GatewayConfig) -> anyhow::Result<Arc<dyn LocalStore>> {
    match &config.store.path {
        Some(path) => Ok(Arc::new(JsonFileStore::open(path).await?)),
        None => {
            info!("No store path configured, records are kept in memory only");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

/// Build the registry client, `None` when no registry is configured
pub fn registry_client(config: &GatewayConfig) -> anyhow::Result<Option<RegistryClient>> {
    let Some(registry) = &config.registry else {
        info!("No registry configured, running in log-only mode");
        return Ok(None);
    };

    let transport = HttpRegistryTransport::with_config(
        &registry.base_url,
        registry.timeout(),
        registry.connect_timeout(),
    )?;
    info!(url = %registry.base_url, "Using device registry");
    Ok(Some(RegistryClient::with_timeout(
        Arc::new(transport),
        registry.timeout(),
    )))
}

/// Build a fully wired engine from configuration
pub async fn build_engine(config: &GatewayConfig) -> anyhow::Result<Arc<SyncEngine>> {
    let store = open_store(config).await?;
    let registry = registry_client(config)?;
    Ok(Arc::new(SyncEngine::new(
        config.engine_config(),
        store,
        registry,
        Arc::new(OutboundWriter::new()),
    )))
}
