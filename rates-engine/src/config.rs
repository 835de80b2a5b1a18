//! Engine configuration.

use exchange_rates::CurrencyCode;
use rates_types::CurrencyPair;
use std::time::Duration;

/// Default pair for the USD/TRY-centric public surface.
pub const DEFAULT_FROM: &str = "USD";
pub const DEFAULT_TO: &str = "TRY";

/// Resolver and background task settings.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Outer cache: answers younger than this skip every source.
    pub outer_fresh_ttl: Duration,
    /// Outer cache: answers younger than this are a last-resort fallback.
    pub outer_stale_ttl: Duration,
    pub prefetch_interval: Duration,
    pub prefetch_pairs: Vec<CurrencyPair>,
    /// Pause between prefetched pairs.
    pub prefetch_pair_delay: Duration,
    pub auto_update_interval: Duration,
    /// Currencies refreshed against `base_currency` by auto-update and force-update.
    pub tracked_currencies: Vec<String>,
    pub base_currency: String,
    /// Day stride for monthly averages.
    pub monthly_sample_stride: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let prefetch_pairs = [("USD", "TRY"), ("EUR", "TRY"), ("GBP", "TRY"), ("EUR", "USD")]
            .iter()
            .filter_map(|(from, to)| CurrencyPair::new(from, to).ok())
            .collect();

        Self {
            outer_fresh_ttl: Duration::from_secs(60),
            outer_stale_ttl: Duration::from_secs(6 * 60 * 60),
            prefetch_interval: Duration::from_secs(30 * 60),
            prefetch_pairs,
            prefetch_pair_delay: Duration::from_secs(2),
            auto_update_interval: Duration::from_secs(15 * 60),
            tracked_currencies: CurrencyCode::all()
                .iter()
                .filter(|code| **code != CurrencyCode::TRY)
                .map(|code| code.code().to_string())
                .collect(),
            base_currency: CurrencyCode::TRY.code().to_string(),
            monthly_sample_stride: 5,
        }
    }
}
