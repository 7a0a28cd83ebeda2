//! Shared state handed to the flow handlers.

use std::sync::Arc;

use super::rate_limit::RateLimiter;
use crate::flow::{FlowConfig, FlowEngine};

pub struct FlowState {
    engine: FlowEngine,
    rate_limiter: Arc<dyn RateLimiter>,
}

impl FlowState {
    pub fn new(engine: FlowEngine, rate_limiter: Arc<dyn RateLimiter>) -> Self {
        Self {
            engine,
            rate_limiter,
        }
    }

    #[must_use]
    pub fn engine(&self) -> &FlowEngine {
        &self.engine
    }

    #[must_use]
    pub fn config(&self) -> &FlowConfig {
        self.engine.config()
    }

    pub(super) fn rate_limiter(&self) -> &dyn RateLimiter {
        self.rate_limiter.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::super::rate_limit::NoopRateLimiter;
    use super::*;
    use crate::flow::memory::{MemoryAccountRepository, MemoryArtifactRepository};

    #[test]
    fn state_exposes_engine_config() {
        let engine = FlowEngine::new(
            Arc::new(MemoryAccountRepository::new()),
            Arc::new(MemoryArtifactRepository::new()),
            FlowConfig::new("https://profile.example.com".to_string()),
        );
        let state = FlowState::new(engine, Arc::new(NoopRateLimiter));
        assert_eq!(
            state.config().frontend_base_url(),
            "https://profile.example.com"
        );
    }
}
