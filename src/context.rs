//! Application context shared by hooks and handlers.
//!
//! Replaces process-wide globals: the configuration store and the backend
//! slots travel together and are passed explicitly. The logger stays the
//! global `tracing` dispatcher.

use std::sync::Arc;

use crate::backend::Backends;
use crate::config::{AppConfig, ConfigStore};

/// Configuration and backend handles for one service.
#[derive(Debug, Clone)]
pub struct AppContext {
    config: Arc<ConfigStore>,
    backends: Arc<Backends>,
}

impl AppContext {
    /// Context with empty backend slots.
    pub fn new(config: Arc<ConfigStore>) -> Self {
        Self {
            config,
            backends: Arc::new(Backends::new()),
        }
    }

    /// Context over an in-memory configuration, without a backing file.
    pub fn from_config(config: AppConfig) -> Self {
        Self::new(Arc::new(ConfigStore::new(config)))
    }

    pub fn config(&self) -> &Arc<ConfigStore> {
        &self.config
    }

    /// Current configuration snapshot.
    pub fn snapshot(&self) -> Arc<AppConfig> {
        self.config.snapshot()
    }

    pub fn backends(&self) -> &Arc<Backends> {
        &self.backends
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_store_and_backends() {
        let context = AppContext::from_config(AppConfig::default());
        let clone = context.clone();

        let mut updated = AppConfig::default();
        updated.system.addr = 9191;
        context.config().replace(updated);

        assert_eq!(clone.snapshot().system.addr, 9191);
        assert!(Arc::ptr_eq(context.backends(), clone.backends()));
        assert!(!clone.backends().redis.is_initialized());
    }
}
