//! Tiered (fresh/stale) rate cache.
//!
//! Uses `DashMap` for concurrent access. Entries are never evicted one by
//! one; they are superseded by newer samples or judged by age on read.

use dashmap::DashMap;
use rates_types::CacheKey;
use rust_decimal::Decimal;
use std::time::Duration;
use tokio::time::Instant;

/// How old a cached sample is relative to the cache's TTLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Younger than the fresh TTL; usable without any network call.
    Fresh,
    /// Past the fresh TTL but inside the stale TTL; last-resort only.
    Stale,
    /// Past the stale TTL; unusable.
    Expired,
}

/// A rate value and the instant it was fetched.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateSample {
    pub value: Decimal,
    pub fetched_at: Instant,
}

impl RateSample {
    pub fn new(value: Decimal) -> Self {
        Self {
            value,
            fetched_at: Instant::now(),
        }
    }

    pub fn age(&self) -> Duration {
        self.fetched_at.elapsed()
    }
}

/// Concurrent cache from `CacheKey` to `RateSample` with two freshness tiers.
#[derive(Debug)]
pub struct RateCache {
    fresh_ttl: Duration,
    stale_ttl: Duration,
    map: DashMap<CacheKey, RateSample>,
}

impl RateCache {
    pub fn new(fresh_ttl: Duration, stale_ttl: Duration) -> Self {
        Self {
            fresh_ttl,
            stale_ttl: stale_ttl.max(fresh_ttl),
            map: DashMap::new(),
        }
    }

    pub fn classify(&self, sample: &RateSample) -> Freshness {
        let age = sample.age();
        if age < self.fresh_ttl {
            Freshness::Fresh
        } else if age < self.stale_ttl {
            Freshness::Stale
        } else {
            Freshness::Expired
        }
    }

    /// Returns the cached value if it is still fresh.
    pub fn get_fresh(&self, key: &CacheKey) -> Option<Decimal> {
        let sample = *self.map.get(key)?;
        (self.classify(&sample) == Freshness::Fresh).then_some(sample.value)
    }

    /// Returns any value younger than the stale TTL, fresh ones included.
    pub fn get_stale(&self, key: &CacheKey) -> Option<Decimal> {
        let sample = *self.map.get(key)?;
        (self.classify(&sample) != Freshness::Expired).then_some(sample.value)
    }

    /// Stores a value fetched just now.
    pub fn insert(&self, key: CacheKey, value: Decimal) {
        self.map.insert(key, RateSample::new(value));
    }

    /// Stores a sample with an explicit fetch instant.
    pub fn insert_sample(&self, key: CacheKey, sample: RateSample) {
        self.map.insert(key, sample);
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn clear(&self) {
        self.map.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rates_types::CurrencyPair;
    use rust_decimal_macros::dec;

    fn key() -> CacheKey {
        CacheKey::current(CurrencyPair::new("USD", "TRY").unwrap())
    }

    fn cache() -> RateCache {
        RateCache::new(Duration::from_secs(60), Duration::from_secs(3600))
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_entry_is_served() {
        let cache = cache();
        cache.insert(key(), dec!(34.50));

        assert_eq!(cache.get_fresh(&key()), Some(dec!(34.50)));
        assert_eq!(cache.get_stale(&key()), Some(dec!(34.50)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_turns_stale_then_expires() {
        let cache = cache();
        cache.insert(key(), dec!(34.50));

        tokio::time::advance(Duration::from_secs(120)).await;
        assert_eq!(cache.get_fresh(&key()), None);
        assert_eq!(cache.get_stale(&key()), Some(dec!(34.50)));

        tokio::time::advance(Duration::from_secs(3600)).await;
        assert_eq!(cache.get_stale(&key()), None);
        // Expired entries stay until superseded or cleared.
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_newer_sample_supersedes() {
        let cache = cache();
        cache.insert(key(), dec!(34.50));
        tokio::time::advance(Duration::from_secs(120)).await;
        cache.insert(key(), dec!(34.75));

        assert_eq!(cache.get_fresh(&key()), Some(dec!(34.75)));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_seeded_sample_is_judged_by_its_age() {
        tokio::time::advance(Duration::from_secs(600)).await;
        let cache = cache();
        let sample = RateSample {
            value: dec!(33.90),
            fetched_at: Instant::now() - Duration::from_secs(300),
        };

        cache.insert_sample(key(), sample);

        assert_eq!(cache.classify(&sample), Freshness::Stale);
        assert_eq!(cache.get_fresh(&key()), None);
        assert_eq!(cache.get_stale(&key()), Some(dec!(33.90)));
    }

    #[test]
    fn test_clear() {
        let cache = cache();
        cache.insert(key(), dec!(1));
        cache.clear();
        assert!(cache.is_empty());
    }
}
