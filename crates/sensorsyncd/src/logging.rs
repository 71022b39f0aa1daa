//! Tracing initialization

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LogFormat;

const DEFAULT_FILTER: &str = "sensorsyncd=info,sensorsync_engine=info,sensorsync_registry=info,sensorsync_core=info";
const VERBOSE_FILTER: &str = "sensorsyncd=debug,sensorsync_engine=debug,sensorsync_registry=debug,sensorsync_core=debug";

/// Install the global subscriber; `RUST_LOG` overrides the default filter
pub fn init(format: LogFormat, verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            VERBOSE_FILTER.into()
        } else {
            DEFAULT_FILTER.into()
        }
    });

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
    }
}
