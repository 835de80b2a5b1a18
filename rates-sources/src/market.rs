//! Market-data (chart API) rate source.
//!
//! The vendor rate-limits aggressively, so every request goes through the
//! [`SessionPool`]. A logical pair is looked up under several ticker formats;
//! the formats are plain data evaluated by [`evaluate_variants`].

use async_trait::async_trait;
use chrono::{DateTime, Days, NaiveDate};
use rates_types::{CacheKey, CurrencyPair, Fetched, RateSource, SessionPoolStats, SourceError};
use reqwest::Client;
use rust_decimal::Decimal;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::cache::RateCache;
use crate::http::{build_client, decimal_from_json, get_json, invert, is_plausible};
use crate::session::SessionPool;

pub const MARKET_SOURCE_NAME: &str = "market-data";

/// Market-data source settings.
#[derive(Debug, Clone)]
pub struct MarketDataConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub fresh_ttl: Duration,
    pub stale_ttl: Duration,
    /// Furthest a daily bar may be from the requested date.
    pub history_window_days: u64,
}

impl Default for MarketDataConfig {
    fn default() -> Self {
        Self {
            base_url: "https://query1.finance.yahoo.com".to_string(),
            timeout: Duration::from_secs(10),
            fresh_ttl: Duration::from_secs(5 * 60),
            stale_ttl: Duration::from_secs(24 * 60 * 60),
            history_window_days: 7,
        }
    }
}

/// One ticker format to try for a pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolVariant {
    pub symbol: String,
    /// The symbol quotes the inverted pair; its value must be flipped.
    pub inverse: bool,
}

impl SymbolVariant {
    fn new(symbol: String, inverse: bool) -> Self {
        Self { symbol, inverse }
    }
}

/// Ticker formats for `pair`, in the order they are tried.
///
/// Direct `FROMTO=X` and its inverse come first, then the USD-based
/// target-only form, then the bare concatenations.
pub fn symbol_variants(pair: &CurrencyPair) -> Vec<SymbolVariant> {
    let (from, to) = (pair.from_code(), pair.to_code());
    let mut candidates = vec![
        SymbolVariant::new(format!("{from}{to}=X"), false),
        SymbolVariant::new(format!("{to}{from}=X"), true),
    ];
    if from == "USD" {
        candidates.push(SymbolVariant::new(format!("{to}=X"), false));
    }
    if to == "USD" {
        candidates.push(SymbolVariant::new(format!("{from}=X"), true));
    }
    candidates.push(SymbolVariant::new(format!("{from}{to}"), false));
    candidates.push(SymbolVariant::new(format!("{to}{from}"), true));

    let mut variants: Vec<SymbolVariant> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if !variants.iter().any(|v| v.symbol == candidate.symbol) {
            variants.push(candidate);
        }
    }
    variants
}

/// Tries each variant in order and returns the first plausible rate.
///
/// Inverse variants are flipped before the plausibility check. A rate-limit
/// error stops the loop immediately.
pub async fn evaluate_variants<F, Fut>(
    source_name: &str,
    variants: &[SymbolVariant],
    mut fetch: F,
) -> Result<Decimal, SourceError>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<Decimal, SourceError>>,
{
    let mut last_error = None;

    for variant in variants {
        match fetch(variant.symbol.clone()).await {
            Ok(raw) => {
                let value = if variant.inverse { invert(raw) } else { Some(raw) };
                match value.filter(|v| is_plausible(*v)) {
                    Some(value) => {
                        debug!(symbol = %variant.symbol, inverse = variant.inverse, %value, "Symbol variant resolved");
                        return Ok(value);
                    }
                    None => {
                        debug!(symbol = %variant.symbol, %raw, "Implausible value, trying next variant");
                        last_error = Some(SourceError::unavailable(
                            source_name,
                            format!("implausible value {} for {}", raw, variant.symbol),
                        ));
                    }
                }
            }
            Err(err) if err.is_rate_limit() => return Err(err),
            Err(err) => {
                debug!(symbol = %variant.symbol, error = %err, "Symbol variant failed");
                last_error = Some(err);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| SourceError::unavailable(source_name, "no symbol variants")))
}

/// Picks the bar closest to `target`, at most `window_days` away.
///
/// On a tie the earlier bar wins.
pub fn closest_bar(bars: &[(NaiveDate, Decimal)], target: NaiveDate, window_days: u64) -> Option<Decimal> {
    bars.iter()
        .map(|(date, close)| ((*date - target).num_days(), *date, *close))
        .filter(|(diff, _, _)| diff.unsigned_abs() <= window_days)
        .min_by_key(|(diff, date, _)| (diff.unsigned_abs(), *date))
        .map(|(_, _, close)| close)
}

/// Rate source backed by the market-data chart API.
pub struct MarketDataSource {
    client: Client,
    config: MarketDataConfig,
    pool: SessionPool,
    cache: RateCache,
}

impl MarketDataSource {
    pub fn new(config: MarketDataConfig, pool: SessionPool) -> Self {
        Self {
            client: build_client(config.timeout),
            cache: RateCache::new(config.fresh_ttl, config.stale_ttl),
            config,
            pool,
        }
    }

    pub fn pool(&self) -> &SessionPool {
        &self.pool
    }

    fn chart_url(&self, symbol: &str, date: Option<NaiveDate>) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        match date {
            None => format!("{base}/v8/finance/chart/{symbol}?range=1d&interval=1d"),
            Some(date) => {
                let start = date
                    .checked_sub_days(Days::new(self.config.history_window_days))
                    .unwrap_or(date);
                let end = date.checked_add_days(Days::new(1)).unwrap_or(date);
                format!(
                    "{base}/v8/finance/chart/{symbol}?period1={}&period2={}&interval=1d",
                    unix_midnight(start),
                    unix_midnight(end)
                )
            }
        }
    }

    async fn fetch_symbol(&self, symbol: String, date: Option<NaiveDate>) -> Result<Decimal, SourceError> {
        let Some(lease) = self.pool.checkout().await else {
            return Err(SourceError::unavailable(MARKET_SOURCE_NAME, "no session available"));
        };

        let url = self.chart_url(&symbol, date);
        let response = get_json(&self.client, MARKET_SOURCE_NAME, &url, Some(lease.identity_tag())).await;
        match response {
            Ok(body) => {
                self.pool.report_success(lease);
                self.extract(&body, &symbol, date)
            }
            Err(err) => {
                self.pool.report_failure(lease, err.is_rate_limit());
                Err(err)
            }
        }
    }

    fn extract(&self, body: &Value, symbol: &str, date: Option<NaiveDate>) -> Result<Decimal, SourceError> {
        let chart = &body["chart"];
        if let Some(description) = chart["error"]["description"].as_str() {
            return Err(SourceError::unavailable(
                MARKET_SOURCE_NAME,
                format!("{}: {}", symbol, description),
            ));
        }
        let result = &chart["result"][0];

        match date {
            None => decimal_from_json(&result["meta"]["regularMarketPrice"]).ok_or_else(|| {
                SourceError::unavailable(MARKET_SOURCE_NAME, format!("{}: missing regularMarketPrice", symbol))
            }),
            Some(target) => {
                let bars = daily_bars(result);
                closest_bar(&bars, target, self.config.history_window_days).ok_or_else(|| SourceError::NoData {
                    source_name: MARKET_SOURCE_NAME.to_string(),
                    key: format!("{}:{}", symbol, target),
                })
            }
        }
    }
}

fn unix_midnight(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or_default()
}

/// Zips bar timestamps with close prices, skipping missing closes.
fn daily_bars(result: &Value) -> Vec<(NaiveDate, Decimal)> {
    let Some(timestamps) = result["timestamp"].as_array() else {
        return Vec::new();
    };
    let closes = result["indicators"]["quote"][0]["close"]
        .as_array()
        .cloned()
        .unwrap_or_default();

    timestamps
        .iter()
        .zip(closes.iter())
        .filter_map(|(ts, close)| {
            let date = DateTime::from_timestamp(ts.as_i64()?, 0)?.date_naive();
            Some((date, decimal_from_json(close)?))
        })
        .collect()
}

#[async_trait]
impl RateSource for MarketDataSource {
    fn name(&self) -> &str {
        MARKET_SOURCE_NAME
    }

    #[instrument(skip(self, pair), fields(source = MARKET_SOURCE_NAME, pair = %pair))]
    async fn fetch(&self, pair: &CurrencyPair, date: Option<NaiveDate>) -> Result<Fetched, SourceError> {
        let key = CacheKey::new(pair.clone(), date);
        if let Some(value) = self.cache.get_fresh(&key) {
            debug!(%key, "Source cache hit");
            return Ok(Fetched::live(value));
        }

        let variants = symbol_variants(pair);
        let result = evaluate_variants(MARKET_SOURCE_NAME, &variants, |symbol| {
            self.fetch_symbol(symbol, date)
        })
        .await;

        match result {
            Ok(value) => {
                self.cache.insert(key, value);
                Ok(Fetched::live(value))
            }
            Err(err) => match self.cache.get_stale(&key) {
                Some(stale) => {
                    warn!(%key, error = %err, %stale, "Live lookup failed, serving stale source cache");
                    Ok(Fetched::stale(stale))
                }
                None => Err(err),
            },
        }
    }

    fn cache_len(&self) -> usize {
        self.cache.len()
    }

    fn clear_cache(&self) {
        self.cache.clear();
    }

    fn session_stats(&self) -> Option<SessionPoolStats> {
        Some(self.pool.stats())
    }

    fn covers_inverse(&self) -> bool {
        true
    }
}
