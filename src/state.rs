//! Application state shared by all request handlers

use std::sync::Arc;

use crate::config::ServerConfig;
use crate::resolver::{MountResolver, PathCache};

/// Shared application state
pub struct AppState {
    /// Server configuration
    pub config: ServerConfig,

    /// Resolved-path cache, also owned by the resolver
    pub cache: Arc<PathCache>,

    /// Multi-mount resolver
    pub resolver: MountResolver,
}

impl AppState {
    /// Create new application state
    pub fn new(config: ServerConfig) -> Self {
        let cache = Arc::new(PathCache::from_config(&config.cache));
        let resolver =
            MountResolver::new(config.mounts.clone(), Arc::clone(&cache), &config.search);
        Self {
            config,
            cache,
            resolver,
        }
    }

    pub fn secret(&self) -> &str {
        &self.config.secret
    }
}
