//! Startup errors.
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal, the process never serves traffic
//!   with a partially valid configuration or registry

use thiserror::Error;

use crate::config::ConfigError;
use crate::routing::RegistryError;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("invalid service registry: {0}")]
    Registry(#[from] RegistryError),

    #[error("failed to initialize logging: {0}")]
    Logging(#[from] tracing_subscriber::util::TryInitError),

    #[error("failed to start metrics exporter: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[from] std::io::Error),
}
