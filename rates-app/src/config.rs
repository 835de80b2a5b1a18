//! Configuration loading from environment.

use anyhow::Context;
use rates_engine::{DEFAULT_TO, EngineConfig};
use rates_sources::{JsonApiVendor, SourcesConfig};
use rates_types::CurrencyPair;
use std::env;
use std::time::Duration;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub tracked_currencies: Vec<String>,
    pub auto_update_interval: Duration,
    pub prefetch_interval: Duration,
    pub http_timeout: Duration,
    pub session_pool_size: usize,
    pub market_url: Option<String>,
    pub exchangerate_api_url: Option<String>,
    pub currency_api_url: Option<String>,
    pub frankfurter_url: Option<String>,
    pub log_format: LogFormat,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Loads configuration through `lookup`, which maps a variable name to its value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let tracked_currencies = parse_currencies(
            &lookup("RATES_TRACKED_CURRENCIES").unwrap_or_else(|| "USD,EUR,GBP".to_string()),
        )?;

        let auto_update_interval = secs(&lookup, "RATES_AUTO_UPDATE_SECS", 900)?;
        let prefetch_interval = secs(&lookup, "RATES_PREFETCH_SECS", 1800)?;
        let http_timeout = secs(&lookup, "RATES_HTTP_TIMEOUT_SECS", 10)?;

        let session_pool_size = match lookup("RATES_SESSION_POOL_SIZE") {
            Some(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("RATES_SESSION_POOL_SIZE is not a number: {raw}"))?,
            None => 5,
        };

        let log_format = match lookup("RATES_LOG_FORMAT").as_deref().map(str::trim) {
            Some(f) if f.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        Ok(Self {
            tracked_currencies,
            auto_update_interval,
            prefetch_interval,
            http_timeout,
            session_pool_size,
            market_url: lookup("RATES_MARKET_URL"),
            exchangerate_api_url: lookup("RATES_EXCHANGERATE_API_URL"),
            currency_api_url: lookup("RATES_CURRENCY_API_URL"),
            frankfurter_url: lookup("RATES_FRANKFURTER_URL"),
            log_format,
        })
    }

    /// Source chain settings with URL and timeout overrides applied.
    pub fn sources_config(&self) -> SourcesConfig {
        let mut sources = SourcesConfig::default().with_timeout(self.http_timeout);

        for api in &mut sources.json_apis {
            let url = match api.vendor {
                JsonApiVendor::ExchangeRateApi => &self.exchangerate_api_url,
                JsonApiVendor::CurrencyApi => &self.currency_api_url,
                JsonApiVendor::Frankfurter => &self.frankfurter_url,
            };
            if let Some(url) = url {
                api.base_url = url.clone();
            }
        }
        if let Some(url) = &self.market_url {
            sources.market.base_url = url.clone();
        }
        sources.session_pool.pool_size = self.session_pool_size;
        sources
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            auto_update_interval: self.auto_update_interval,
            prefetch_interval: self.prefetch_interval,
            tracked_currencies: self.tracked_currencies.clone(),
            ..EngineConfig::default()
        }
    }
}

fn secs(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: u64,
) -> anyhow::Result<Duration> {
    let Some(raw) = lookup(key) else {
        return Ok(Duration::from_secs(default));
    };
    let secs: u64 = raw
        .trim()
        .parse()
        .with_context(|| format!("{key} is not a number of seconds: {raw}"))?;
    if secs == 0 {
        anyhow::bail!("{key} must be greater than zero");
    }
    Ok(Duration::from_secs(secs))
}

fn parse_currencies(raw: &str) -> anyhow::Result<Vec<String>> {
    let mut currencies = Vec::new();
    for code in raw.split(',').map(str::trim).filter(|c| !c.is_empty()) {
        let pair = CurrencyPair::new(code, DEFAULT_TO)
            .with_context(|| format!("Invalid tracked currency: {code}"))?;
        let code = pair.from_code().to_string();
        if !currencies.contains(&code) {
            currencies.push(code);
        }
    }
    Ok(currencies)
}
