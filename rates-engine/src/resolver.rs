//! Rate resolution orchestrator.
//!
//! Walks the outer cache, the source chain, the inverse pair, stale source
//! values, the stale outer cache and finally the static fallback table. Every path yields a
//! rate; callers never see an error.

use chrono::{Datelike, Months, NaiveDate, Utc};
use rates_sources::RateCache;
use rates_types::{CacheKey, CurrencyPair, DetailedStats, RateSource, SourceStats};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::config::{DEFAULT_FROM, DEFAULT_TO, EngineConfig};

/// Where a resolved rate came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateOrigin {
    Identity,
    /// Fresh outer cache hit
    Cache,
    Source(String),
    /// Recovered as `1 / rate` of the inverted pair
    InverseSource(String),
    /// Aged value from a source's own cache; no live source answered
    StaleSource(String),
    StaleCache,
    FallbackTable,
    Default,
}

impl RateOrigin {
    /// True for answers backed by a live fetch (directly or via the fresh cache).
    pub fn is_live(&self) -> bool {
        matches!(
            self,
            RateOrigin::Identity
                | RateOrigin::Cache
                | RateOrigin::Source(_)
                | RateOrigin::InverseSource(_)
        )
    }

    /// Label recorded alongside persisted rates.
    pub fn label(&self) -> String {
        match self {
            RateOrigin::Identity => "identity".to_string(),
            RateOrigin::Cache => "cache".to_string(),
            RateOrigin::Source(name) => name.clone(),
            RateOrigin::InverseSource(name) => format!("{name} (inverse)"),
            RateOrigin::StaleSource(name) => format!("{name} (stale)"),
            RateOrigin::StaleCache => "stale-cache".to_string(),
            RateOrigin::FallbackTable => "fallback-table".to_string(),
            RateOrigin::Default => "default".to_string(),
        }
    }
}

impl fmt::Display for RateOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// A rate together with its origin.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub rate: Decimal,
    pub origin: RateOrigin,
}

impl Resolution {
    fn new(rate: Decimal, origin: RateOrigin) -> Self {
        Self { rate, origin }
    }
}

/// Resolves exchange rates through an ordered chain of sources.
pub struct RateResolver {
    sources: Vec<Arc<dyn RateSource>>,
    cache: RateCache,
    config: EngineConfig,
}

impl RateResolver {
    /// Creates a resolver over `sources`, highest priority first.
    pub fn new(sources: Vec<Arc<dyn RateSource>>, config: EngineConfig) -> Self {
        let cache = RateCache::new(config.outer_fresh_ttl, config.outer_stale_ttl);
        Self {
            sources,
            cache,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn sources(&self) -> &[Arc<dyn RateSource>] {
        &self.sources
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Resolution
    // ─────────────────────────────────────────────────────────────────────────

    /// Resolves `from -> to`, for `date` or the current rate when `None`.
    #[instrument(skip(self))]
    pub async fn resolve(&self, from: &str, to: &str, date: Option<NaiveDate>) -> Resolution {
        if from.trim().to_uppercase() == to.trim().to_uppercase() {
            return Resolution::new(Decimal::ONE, RateOrigin::Identity);
        }

        let pair = match CurrencyPair::new(from, to) {
            Ok(pair) => pair,
            Err(err) => {
                warn!(%err, "Invalid currency pair, using fallback rate");
                return static_fallback(from, to);
            }
        };

        let date = date.filter(|d| *d < today());
        let key = CacheKey::new(pair.clone(), date);

        if let Some(rate) = self.cache.get_fresh(&key) {
            debug!(key = %key, %rate, "Outer cache hit");
            return Resolution::new(rate, RateOrigin::Cache);
        }

        let mut stale = None;
        if let Some((rate, source)) = self.first_live(&pair, date, false, &mut stale).await {
            self.cache.insert(key, rate);
            return Resolution::new(rate, RateOrigin::Source(source));
        }

        let inverse = pair.inverse();
        let mut inverse_stale = None;
        if let Some((raw, source)) = self.first_live(&inverse, date, true, &mut inverse_stale).await {
            if let Some(rate) = Decimal::ONE.checked_div(raw) {
                info!(key = %key, source = %source, %rate, "Rate recovered from inverse pair");
                self.cache.insert(key, rate);
                return Resolution::new(rate, RateOrigin::InverseSource(source));
            }
        }

        let stale = stale.or_else(|| {
            let (raw, source) = inverse_stale?;
            Some((Decimal::ONE.checked_div(raw)?, source))
        });
        if let Some((rate, source)) = stale {
            warn!(key = %key, source = %source, %rate, "No live source answered, serving stale source value");
            return Resolution::new(rate, RateOrigin::StaleSource(source));
        }

        if let Some(rate) = self.cache.get_stale(&key) {
            warn!(key = %key, %rate, "All sources failed, serving stale cached rate");
            return Resolution::new(rate, RateOrigin::StaleCache);
        }

        static_fallback(pair.from_code(), pair.to_code())
    }

    /// Asks each source in order; returns the first positive live rate and
    /// its source name.
    ///
    /// The first positive stale value seen is kept in `stale`. On the
    /// `inverse` pass, sources that already tried the inverted pair are
    /// skipped.
    async fn first_live(
        &self,
        pair: &CurrencyPair,
        date: Option<NaiveDate>,
        inverse: bool,
        stale: &mut Option<(Decimal, String)>,
    ) -> Option<(Decimal, String)> {
        for source in &self.sources {
            if inverse && source.covers_inverse() {
                debug!(source = source.name(), %pair, "Source already tried this pair");
                continue;
            }
            match source.fetch(pair, date).await {
                Ok(fetched) if fetched.value <= Decimal::ZERO => {
                    warn!(source = source.name(), %pair, rate = %fetched.value, "Source returned a non-positive rate");
                }
                Ok(fetched) if fetched.stale => {
                    debug!(source = source.name(), %pair, rate = %fetched.value, "Source only has a stale value, trying next");
                    stale.get_or_insert_with(|| (fetched.value, source.name().to_string()));
                }
                Ok(fetched) => {
                    debug!(source = source.name(), %pair, rate = %fetched.value, "Source answered");
                    return Some((fetched.value, source.name().to_string()));
                }
                Err(err) if err.is_rate_limit() => {
                    warn!(source = source.name(), %pair, %err, "Source rate limited, trying next");
                }
                Err(err) if err.is_no_data() => {
                    debug!(source = source.name(), %pair, "Source has no data for this date");
                }
                Err(err) => {
                    debug!(source = source.name(), %pair, %err, "Source failed, trying next");
                }
            }
        }
        None
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Convenience Lookups
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn get_exchange_rate(&self, from: &str, to: &str, date: Option<NaiveDate>) -> Decimal {
        self.resolve(from, to, date).await.rate
    }

    pub async fn get_current_rate(&self, from: &str, to: &str) -> Decimal {
        self.get_exchange_rate(from, to, None).await
    }

    pub async fn get_historical_rate(&self, date: NaiveDate, from: &str, to: &str) -> Decimal {
        self.get_exchange_rate(from, to, Some(date)).await
    }

    /// Mean of live rates sampled across the month.
    ///
    /// Samples every `monthly_sample_stride` days starting on the 1st and
    /// skips days after today. Degraded samples are ignored. When nothing
    /// live was sampled, or the month is invalid, the current rate is
    /// returned instead.
    pub async fn get_monthly_average_rate(
        &self,
        year: i32,
        month: u32,
        from: &str,
        to: &str,
    ) -> Decimal {
        let Some(first) = NaiveDate::from_ymd_opt(year, month, 1) else {
            warn!(year, month, "Invalid month for average, using current rate");
            return self.get_current_rate(from, to).await;
        };

        let today = today();
        let mut samples = Vec::new();
        for day in (1..=days_in_month(first)).step_by(self.config.monthly_sample_stride.max(1)) {
            let Some(date) = first.with_day(day) else {
                continue;
            };
            if date > today {
                break;
            }

            let resolution = self.resolve(from, to, Some(date)).await;
            if resolution.origin.is_live() {
                samples.push(resolution.rate);
            } else {
                debug!(%date, origin = %resolution.origin, "Skipping degraded sample");
            }
        }

        if samples.is_empty() {
            warn!(year, month, from, to, "No live samples for month, using current rate");
            return self.get_current_rate(from, to).await;
        }

        let count = Decimal::from(samples.len());
        let average = samples.iter().sum::<Decimal>() / count;
        debug!(year, month, samples = samples.len(), %average, "Monthly average computed");
        average
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Maintenance & Observability
    // ─────────────────────────────────────────────────────────────────────────

    /// Empties the outer cache and every source cache.
    pub fn clear_cache(&self) {
        self.cache.clear();
        for source in &self.sources {
            source.clear_cache();
        }
        info!("Rate caches cleared");
    }

    pub fn outer_cache_len(&self) -> usize {
        self.cache.len()
    }

    /// Test-fetches the default pair from each source.
    pub async fn get_provider_status(&self) -> BTreeMap<String, bool> {
        let mut status = BTreeMap::new();
        let Ok(pair) = CurrencyPair::new(DEFAULT_FROM, DEFAULT_TO) else {
            return status;
        };

        for source in &self.sources {
            let healthy = match source.fetch(&pair, None).await {
                Ok(fetched) if fetched.stale => {
                    debug!(source = source.name(), "Provider check only reached the stale cache");
                    false
                }
                Ok(_) => true,
                Err(err) => {
                    debug!(source = source.name(), %err, "Provider check failed");
                    false
                }
            };
            status.insert(source.name().to_string(), healthy);
        }
        status
    }

    /// Cache sizes and session pool counters. Task flags are left false.
    pub fn get_detailed_stats(&self) -> DetailedStats {
        let sources = self
            .sources
            .iter()
            .map(|source| {
                let stats = SourceStats {
                    cache_entries: source.cache_len(),
                    session_pool: source.session_stats(),
                };
                (source.name().to_string(), stats)
            })
            .collect();

        DetailedStats {
            outer_cache_entries: self.cache.len(),
            sources,
            auto_update_running: false,
            prefetch_running: false,
        }
    }
}

fn static_fallback(from: &str, to: &str) -> Resolution {
    match exchange_rates::fallback_rate(from, to) {
        Some(rate) => {
            warn!(from, to, %rate, "Serving static fallback rate");
            Resolution::new(rate, RateOrigin::FallbackTable)
        }
        None => {
            let rate = exchange_rates::ULTIMATE_FALLBACK_RATE;
            warn!(from, to, %rate, "No fallback for pair, serving default rate");
            Resolution::new(rate, RateOrigin::Default)
        }
    }
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

fn days_in_month(first: NaiveDate) -> u32 {
    first
        .checked_add_months(Months::new(1))
        .and_then(|next| next.pred_opt())
        .map(|last| last.day())
        .unwrap_or(28)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_days_in_month() {
        let feb_leap = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        let feb = NaiveDate::from_ymd_opt(2023, 2, 1).unwrap();
        let dec = NaiveDate::from_ymd_opt(2023, 12, 1).unwrap();
        assert_eq!(days_in_month(feb_leap), 29);
        assert_eq!(days_in_month(feb), 28);
        assert_eq!(days_in_month(dec), 31);
    }

    #[test]
    fn test_origin_liveness() {
        assert!(RateOrigin::Source("frankfurter".into()).is_live());
        assert!(RateOrigin::Cache.is_live());
        assert!(!RateOrigin::StaleSource("frankfurter".into()).is_live());
        assert!(!RateOrigin::StaleCache.is_live());
        assert!(!RateOrigin::FallbackTable.is_live());
        assert!(!RateOrigin::Default.is_live());
    }

    #[test]
    fn test_origin_label() {
        assert_eq!(RateOrigin::InverseSource("market-data".into()).label(), "market-data (inverse)");
        assert_eq!(RateOrigin::StaleSource("frankfurter".into()).label(), "frankfurter (stale)");
        assert_eq!(RateOrigin::FallbackTable.to_string(), "fallback-table");
    }

    #[test]
    fn test_static_fallback_tiers() {
        let table = static_fallback("usd", "try");
        assert_eq!(table.origin, RateOrigin::FallbackTable);
        assert_eq!(table.rate, exchange_rates::ULTIMATE_FALLBACK_RATE);

        let default = static_fallback("JPY", "CHF");
        assert_eq!(default.origin, RateOrigin::Default);
        assert_eq!(default.rate, exchange_rates::ULTIMATE_FALLBACK_RATE);
    }
}
