//! Service registry.
//!
//! # Responsibilities
//! - Store validated service descriptors
//! - Resolve the first path segment under `/api` to a descriptor
//! - Enumerate valid prefixes for diagnostics
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - O(1) key lookup via HashMap
//! - Construction fails on the first bad entry; nothing partial is served

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::config::ServiceConfig;
use crate::routing::descriptor::{self, OriginError, ServiceDescriptor};

/// Fatal registry construction failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("service key '{0}' is registered more than once")]
    DuplicateKey(String),
    #[error("service key '{0}' is not a valid path segment")]
    InvalidKey(String),
    #[error("service '{key}' has an invalid base address: {source}")]
    InvalidAddress {
        key: String,
        #[source]
        source: OriginError,
    },
    #[error("no services registered")]
    Empty,
}

/// Route prefix → upstream descriptor table.
#[derive(Debug)]
pub struct ServiceRegistry {
    /// Registration order, kept for stable diagnostics.
    services: Vec<Arc<ServiceDescriptor>>,
    by_key: HashMap<String, usize>,
}

impl ServiceRegistry {
    /// Build the registry from configuration.
    pub fn from_config(configs: &[ServiceConfig]) -> Result<Self, RegistryError> {
        if configs.is_empty() {
            return Err(RegistryError::Empty);
        }

        let mut services = Vec::with_capacity(configs.len());
        let mut by_key = HashMap::with_capacity(configs.len());

        for config in configs {
            if !descriptor::is_valid_key(&config.key) {
                return Err(RegistryError::InvalidKey(config.key.clone()));
            }
            if by_key.contains_key(&config.key) {
                return Err(RegistryError::DuplicateKey(config.key.clone()));
            }
            let service = ServiceDescriptor::from_config(config).map_err(|source| {
                RegistryError::InvalidAddress {
                    key: config.key.clone(),
                    source,
                }
            })?;

            tracing::debug!(
                key = %service.key,
                name = %service.display_name,
                upstream = %service.origin,
                strip_prefix = service.strip_prefix,
                "Service registered"
            );

            by_key.insert(service.key.clone(), services.len());
            services.push(Arc::new(service));
        }

        Ok(Self { services, by_key })
    }

    /// Look up the descriptor owning a prefix segment.
    pub fn resolve(&self, key: &str) -> Option<&Arc<ServiceDescriptor>> {
        self.by_key.get(key).map(|&idx| &self.services[idx])
    }

    /// Every public prefix, in registration order.
    pub fn prefixes(&self) -> Vec<String> {
        self.services.iter().map(|s| s.prefix()).collect()
    }

    pub fn services(&self) -> &[Arc<ServiceDescriptor>] {
        &self.services
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}
