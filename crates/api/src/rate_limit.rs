//! Ingest Rate Limiting
//!
//! Per-peer-IP limits on the ingest routes using tower_governor (GCRA).
//! Requires the server to run with
//! `into_make_service_with_connect_info::<SocketAddr>()`.

use governor::middleware::StateInformationMiddleware;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_governor::governor::{GovernorConfig, GovernorConfigBuilder};
use tower_governor::key_extractor::PeerIpKeyExtractor;

use crate::error::ApiError;

/// Governor config keyed by peer IP that also emits `X-RateLimit-*` headers
pub type IngestGovernorConfig = GovernorConfig<PeerIpKeyExtractor, StateInformationMiddleware>;

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Apply limits to the ingest routes
    pub enabled: bool,
    /// Seconds between quota replenishments
    pub per_second: u64,
    /// Burst size (max requests that can be made immediately)
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            per_second: 1,
            burst_size: 10,
        }
    }
}

/// Build the governor config, or `None` when limiting is disabled
pub fn create_governor_config(
    config: &RateLimitConfig,
) -> Result<Option<Arc<IngestGovernorConfig>>, ApiError> {
    if !config.enabled {
        return Ok(None);
    }

    GovernorConfigBuilder::default()
        .per_second(config.per_second)
        .burst_size(config.burst_size)
        .use_headers()
        .finish()
        .map(|governor| Some(Arc::new(governor)))
        .ok_or_else(|| {
            ApiError::RateLimit(format!(
                "per_second ({}) and burst_size ({}) must both be non-zero",
                config.per_second, config.burst_size
            ))
        })
}
