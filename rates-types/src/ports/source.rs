//! Rate source port.
//!
//! One implementation per upstream vendor. Implementations can be HTTP
//! clients, mock providers, etc.

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::domain::CurrencyPair;
use crate::dto::SessionPoolStats;
use crate::error::SourceError;

/// A value returned by a source, with its freshness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fetched {
    pub value: Decimal,
    /// Served from the source's own cache after a failed live lookup.
    pub stale: bool,
}

impl Fetched {
    pub fn live(value: Decimal) -> Self {
        Self {
            value,
            stale: false,
        }
    }

    pub fn stale(value: Decimal) -> Self {
        Self { value, stale: true }
    }
}

/// Port trait for exchange rate sources.
#[async_trait::async_trait]
pub trait RateSource: Send + Sync {
    /// Stable name used in logs, stats and persisted records.
    fn name(&self) -> &str;

    /// Fetches how many `to` units one `from` unit buys.
    ///
    /// `date` of `None` asks for the current rate. Implementations consult
    /// their own cache before touching the network, and mark a value as
    /// stale when the live lookup failed and only an aged entry was left.
    async fn fetch(&self, pair: &CurrencyPair, date: Option<NaiveDate>)
    -> Result<Fetched, SourceError>;

    /// True when `fetch` already tries the inverted pair on its own, so
    /// asking it for the inverse again would repeat the same requests.
    fn covers_inverse(&self) -> bool {
        false
    }

    /// Number of entries in the source's own cache.
    fn cache_len(&self) -> usize {
        0
    }

    /// Drops the source's own cache.
    fn clear_cache(&self) {}

    /// Session pool counters, for sources that rotate identities.
    fn session_stats(&self) -> Option<SessionPoolStats> {
        None
    }
}
