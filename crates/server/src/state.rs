use std::sync::Arc;

use mdraft_core::{Config, ConversionEngine, IdentityResolver, SanitizedConfig};

/// Shared application state
pub struct AppState {
    config: Config,
    resolver: Arc<dyn IdentityResolver>,
    engine: ConversionEngine,
}

impl AppState {
    pub fn new(
        config: Config,
        resolver: Arc<dyn IdentityResolver>,
        engine: ConversionEngine,
    ) -> Self {
        Self {
            config,
            resolver,
            engine,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn resolver(&self) -> &dyn IdentityResolver {
        self.resolver.as_ref()
    }

    pub fn engine(&self) -> &ConversionEngine {
        &self.engine
    }
}
