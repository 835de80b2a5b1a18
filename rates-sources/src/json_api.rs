//! Plain JSON currency-conversion API sources.
//!
//! Each vendor is described by a [`JsonApiVendor`] value (URL shape, response
//! shape, history support), so adding a vendor means adding a variant rather
//! than a new adapter. Every source keeps its own request quota and cache.

use async_trait::async_trait;
use chrono::NaiveDate;
use governor::{DefaultDirectRateLimiter, Quota};
use rates_types::{CacheKey, CurrencyPair, Fetched, RateSource, SourceError, classify_failure};
use reqwest::Client;
use rust_decimal::Decimal;
use serde_json::Value;
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::cache::RateCache;
use crate::http::{build_client, decimal_from_json, get_json, is_plausible};

/// Supported JSON vendors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JsonApiVendor {
    /// `GET {base}/v4/latest/{FROM}`; current rates only.
    ExchangeRateApi,
    /// `GET {base}{date|latest}/v1/currencies/{from}.json`; date in the path.
    CurrencyApi,
    /// `GET {base}/{date|latest}?from=FROM&to=TO`.
    Frankfurter,
}

impl JsonApiVendor {
    pub fn all() -> &'static [JsonApiVendor] {
        &[
            JsonApiVendor::ExchangeRateApi,
            JsonApiVendor::CurrencyApi,
            JsonApiVendor::Frankfurter,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            JsonApiVendor::ExchangeRateApi => "exchangerate-api",
            JsonApiVendor::CurrencyApi => "currency-api",
            JsonApiVendor::Frankfurter => "frankfurter",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            JsonApiVendor::ExchangeRateApi => "https://api.exchangerate-api.com",
            JsonApiVendor::CurrencyApi => "https://cdn.jsdelivr.net/npm/@fawazahmed0/currency-api@",
            JsonApiVendor::Frankfurter => "https://api.frankfurter.app",
        }
    }

    pub fn default_requests_per_minute(&self) -> u32 {
        match self {
            JsonApiVendor::ExchangeRateApi => 30,
            JsonApiVendor::CurrencyApi => 60,
            JsonApiVendor::Frankfurter => 60,
        }
    }

    pub fn supports_history(&self) -> bool {
        !matches!(self, JsonApiVendor::ExchangeRateApi)
    }

    /// Request URL for a pair, or `None` if the vendor cannot serve the date.
    pub fn url(&self, base_url: &str, pair: &CurrencyPair, date: Option<NaiveDate>) -> Option<String> {
        if date.is_some() && !self.supports_history() {
            return None;
        }
        let tag = date.map(|d| d.to_string()).unwrap_or_else(|| "latest".to_string());

        let url = match self {
            JsonApiVendor::ExchangeRateApi => {
                format!("{}/v4/latest/{}", base_url.trim_end_matches('/'), pair.from_code())
            }
            JsonApiVendor::CurrencyApi => format!(
                "{}{}/v1/currencies/{}.json",
                base_url,
                tag,
                pair.from_code().to_ascii_lowercase()
            ),
            JsonApiVendor::Frankfurter => format!(
                "{}/{}?from={}&to={}",
                base_url.trim_end_matches('/'),
                tag,
                pair.from_code(),
                pair.to_code()
            ),
        };
        Some(url)
    }

    /// Reads the rate out of a vendor response.
    ///
    /// Dated responses must carry exactly the requested date; vendors that
    /// silently answer with a neighbouring day yield `NoData`.
    pub fn extract(&self, body: &Value, pair: &CurrencyPair, date: Option<NaiveDate>) -> Result<Decimal, SourceError> {
        let name = self.name();
        if let Some(message) = vendor_error(body) {
            return Err(classify_failure(name, None, &message));
        }

        if let Some(requested) = date {
            let answered = body["date"].as_str().and_then(|d| d.parse::<NaiveDate>().ok());
            if answered != Some(requested) {
                debug!(source = name, %requested, ?answered, "Vendor answered for a different date");
                return Err(SourceError::no_data(name, &CacheKey::new(pair.clone(), date)));
            }
        }

        let raw = match self {
            JsonApiVendor::ExchangeRateApi | JsonApiVendor::Frankfurter => &body["rates"][pair.to_code()],
            JsonApiVendor::CurrencyApi => {
                &body[pair.from_code().to_ascii_lowercase()][pair.to_code().to_ascii_lowercase()]
            }
        };

        decimal_from_json(raw)
            .ok_or_else(|| SourceError::unavailable(name, format!("no rate for {} in response", pair)))
    }
}

/// Error text some vendors embed in a 200 response.
fn vendor_error(body: &Value) -> Option<String> {
    if body["result"].as_str() == Some("error") {
        let kind = body["error-type"].as_str().unwrap_or("unknown error");
        return Some(kind.to_string());
    }
    match &body["error"] {
        Value::String(message) => Some(message.clone()),
        Value::Object(obj) => obj
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| Some(body["error"].to_string())),
        _ => body["message"]
            .as_str()
            .filter(|_| body["rates"].is_null())
            .map(str::to_string),
    }
}

/// JSON source settings.
#[derive(Debug, Clone)]
pub struct JsonApiConfig {
    pub vendor: JsonApiVendor,
    pub base_url: String,
    pub timeout: Duration,
    pub requests_per_minute: u32,
    pub fresh_ttl: Duration,
    pub stale_ttl: Duration,
}

impl JsonApiConfig {
    pub fn for_vendor(vendor: JsonApiVendor) -> Self {
        Self {
            vendor,
            base_url: vendor.default_base_url().to_string(),
            timeout: Duration::from_secs(10),
            requests_per_minute: vendor.default_requests_per_minute(),
            fresh_ttl: Duration::from_secs(5 * 60),
            stale_ttl: Duration::from_secs(6 * 60 * 60),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

/// Rate source backed by one JSON vendor.
pub struct JsonApiSource {
    client: Client,
    config: JsonApiConfig,
    cache: RateCache,
    limiter: DefaultDirectRateLimiter,
}

impl JsonApiSource {
    pub fn new(config: JsonApiConfig) -> Self {
        let per_minute = NonZeroU32::new(config.requests_per_minute).unwrap_or(NonZeroU32::MIN);
        Self {
            client: build_client(config.timeout),
            cache: RateCache::new(config.fresh_ttl, config.stale_ttl),
            limiter: DefaultDirectRateLimiter::direct(Quota::per_minute(per_minute)),
            config,
        }
    }

    pub fn vendor(&self) -> JsonApiVendor {
        self.config.vendor
    }

    async fn fetch_live(&self, key: &CacheKey) -> Result<Decimal, SourceError> {
        let vendor = self.config.vendor;
        let Some(url) = vendor.url(&self.config.base_url, &key.pair, key.date) else {
            return Err(SourceError::no_data(vendor.name(), key));
        };

        if self.limiter.check().is_err() {
            return Err(SourceError::unavailable(vendor.name(), "request quota exhausted"));
        }

        let body = get_json(&self.client, vendor.name(), &url, None).await?;
        let value = vendor.extract(&body, &key.pair, key.date)?;
        if !is_plausible(value) {
            return Err(SourceError::unavailable(
                vendor.name(),
                format!("implausible value {}", value),
            ));
        }
        Ok(value)
    }
}

#[async_trait]
impl RateSource for JsonApiSource {
    fn name(&self) -> &str {
        self.config.vendor.name()
    }

    #[instrument(skip(self, pair), fields(pair = %pair))]
    async fn fetch(&self, pair: &CurrencyPair, date: Option<NaiveDate>) -> Result<Fetched, SourceError> {
        let key = CacheKey::new(pair.clone(), date);
        if let Some(value) = self.cache.get_fresh(&key) {
            debug!(source = self.name(), %key, "Source cache hit");
            return Ok(Fetched::live(value));
        }

        match self.fetch_live(&key).await {
            Ok(value) => {
                self.cache.insert(key, value);
                Ok(Fetched::live(value))
            }
            Err(err) => match self.cache.get_stale(&key) {
                Some(stale) => {
                    warn!(source = self.name(), %key, error = %err, %stale, "Live lookup failed, serving stale source cache");
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn usd_try() -> CurrencyPair {
        CurrencyPair::new("USD", "TRY").unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_urls() {
        let pair = usd_try();
        assert_eq!(
            JsonApiVendor::ExchangeRateApi.url("https://x.test/", &pair, None).unwrap(),
            "https://x.test/v4/latest/USD"
        );
        assert_eq!(
            JsonApiVendor::CurrencyApi
                .url("https://cdn.test/currency-api@", &pair, Some(date(2024, 3, 6)))
                .unwrap(),
            "https://cdn.test/currency-api@2024-03-06/v1/currencies/usd.json"
        );
        assert_eq!(
            JsonApiVendor::Frankfurter.url("https://fx.test", &pair, None).unwrap(),
            "https://fx.test/latest?from=USD&to=TRY"
        );
    }

    #[test]
    fn test_current_only_vendor_has_no_dated_url() {
        assert!(JsonApiVendor::ExchangeRateApi
            .url("https://x.test", &usd_try(), Some(date(2024, 3, 6)))
            .is_none());
    }

    #[test]
    fn test_extract_shapes() {
        let pair = usd_try();
        let body = json!({"base": "USD", "rates": {"TRY": 34.5, "EUR": 0.92}});
        assert_eq!(JsonApiVendor::ExchangeRateApi.extract(&body, &pair, None).unwrap(), dec!(34.5));

        let body = json!({"date": "2024-03-06", "usd": {"try": 31.9}});
        assert_eq!(
            JsonApiVendor::CurrencyApi.extract(&body, &pair, Some(date(2024, 3, 6))).unwrap(),
            dec!(31.9)
        );

        let body = json!({"amount": 1.0, "base": "USD", "date": "2024-03-06", "rates": {"TRY": 31.95}});
        assert_eq!(
            JsonApiVendor::Frankfurter.extract(&body, &pair, Some(date(2024, 3, 6))).unwrap(),
            dec!(31.95)
        );
    }

    #[test]
    fn test_extract_rejects_substituted_date() {
        let body = json!({"date": "2024-03-08", "rates": {"TRY": 31.95}});
        let err = JsonApiVendor::Frankfurter
            .extract(&body, &usd_try(), Some(date(2024, 3, 10)))
            .unwrap_err();
        assert!(err.is_no_data());
    }

    #[test]
    fn test_extract_missing_field_is_unavailable() {
        let body = json!({"rates": {"EUR": 0.92}});
        let err = JsonApiVendor::ExchangeRateApi.extract(&body, &usd_try(), None).unwrap_err();
        assert!(matches!(err, SourceError::Unavailable { .. }));
    }

    #[test]
    fn test_embedded_quota_error_is_rate_limit() {
        let body = json!({"result": "error", "error-type": "quota-reached"});
        let err = JsonApiVendor::ExchangeRateApi.extract(&body, &usd_try(), None).unwrap_err();
        assert!(err.is_rate_limit());
    }
}
