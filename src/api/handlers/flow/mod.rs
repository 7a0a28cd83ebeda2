//! Verification flow endpoints: issuance, consumption, and peek.

pub mod consume;
pub mod issue;
pub mod peek;
pub mod rate_limit;
pub mod state;
pub mod types;

mod utils;

pub use rate_limit::{NoopRateLimiter, RateLimiter};
pub use state::FlowState;

#[cfg(test)]
mod test_support {
    use std::sync::Arc;

    use super::rate_limit::NoopRateLimiter;
    use super::state::FlowState;
    use crate::flow::memory::{MemoryAccountRepository, MemoryArtifactRepository};
    use crate::flow::{FlowConfig, FlowEngine};
    use anyhow::Result;
    use sqlx::PgPool;
    use sqlx::postgres::PgPoolOptions;

    /// Memory-backed state for handler tests that never reach Postgres.
    pub(super) fn flow_state() -> Arc<FlowState> {
        let engine = FlowEngine::new(
            Arc::new(MemoryAccountRepository::new()),
            Arc::new(MemoryArtifactRepository::new()),
            FlowConfig::new("https://profile.example.com".to_string()),
        );
        Arc::new(FlowState::new(engine, Arc::new(NoopRateLimiter)))
    }

    pub(super) fn lazy_pool() -> Result<PgPool> {
        Ok(PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?)
    }
}
