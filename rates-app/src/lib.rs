//! # Rates Application
//!
//! Wiring shared by the daemon and the CLI:
//! - Load configuration from environment
//! - Install the tracing subscriber
//! - Build the source chain and the currency service

pub mod config;
pub mod persistence;

use std::sync::Arc;

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use rates_engine::{CurrencyService, RateResolver};
use rates_sources::build_default_sources;

pub use config::{Config, LogFormat};
pub use persistence::LogPersistence;

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "info,rates_engine=debug,rates_sources=debug";

/// Installs the global subscriber. Output goes to stderr so stdout stays
/// free for command output.
pub fn init_tracing(format: LogFormat, default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Pretty => registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

/// Builds the service over the default source chain.
pub fn build_service(config: &Config) -> CurrencyService {
    let sources = build_default_sources(config.sources_config());
    let resolver = RateResolver::new(sources, config.engine_config());
    CurrencyService::new(resolver)
}

/// Builds the service with the logging persistence collaborator attached.
pub fn build_daemon_service(config: &Config) -> CurrencyService {
    build_service(config).with_persistence(Arc::new(LogPersistence))
}
