//! # Rates Sources
//!
//! Concrete rate source implementations (adapters) for the rate engine.
//! This crate provides vendor adapters that implement the `RateSource` port,
//! plus the session pool and tiered cache they are built on.

use rates_types::RateSource;
use std::sync::Arc;
use std::time::Duration;

pub mod cache;
pub mod http;
pub mod json_api;
pub mod market;
pub mod session;

pub use cache::{Freshness, RateCache, RateSample};
pub use json_api::{JsonApiConfig, JsonApiSource, JsonApiVendor};
pub use market::{MarketDataConfig, MarketDataSource, SymbolVariant, symbol_variants};
pub use session::{SessionInfo, SessionLease, SessionPool, SessionPoolConfig};

/// Settings for the default source chain.
#[derive(Debug, Clone)]
pub struct SourcesConfig {
    /// JSON vendors in priority order, most trusted first.
    pub json_apis: Vec<JsonApiConfig>,
    pub market: MarketDataConfig,
    pub session_pool: SessionPoolConfig,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            json_apis: JsonApiVendor::all()
                .iter()
                .map(|vendor| JsonApiConfig::for_vendor(*vendor))
                .collect(),
            market: MarketDataConfig::default(),
            session_pool: SessionPoolConfig::default(),
        }
    }
}

impl SourcesConfig {
    /// Applies one request timeout to every source.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        for api in &mut self.json_apis {
            api.timeout = timeout;
        }
        self.market.timeout = timeout;
        self
    }
}

/// Build the source chain in priority order.
///
/// The JSON vendors come first in configured order; the rate-limited
/// market-data source comes last.
///
/// # Examples
///
/// ```ignore
/// let sources = build_default_sources(SourcesConfig::default());
/// let resolver = RateResolver::new(sources, EngineConfig::default());
/// ```
pub fn build_default_sources(config: SourcesConfig) -> Vec<Arc<dyn RateSource>> {
    let mut sources: Vec<Arc<dyn RateSource>> = config
        .json_apis
        .into_iter()
        .map(|api| Arc::new(JsonApiSource::new(api)) as Arc<dyn RateSource>)
        .collect();

    let pool = SessionPool::new(config.session_pool);
    sources.push(Arc::new(MarketDataSource::new(config.market, pool)));

    tracing::info!(
        sources = ?sources.iter().map(|s| s.name()).collect::<Vec<_>>(),
        "Rate source chain built"
    );
    sources
}
