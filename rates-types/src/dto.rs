//! Data Transfer Objects (DTOs) for observability and persistence.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::CurrencyPair;

// ─────────────────────────────────────────────────────────────────────────────
// Persistence DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// A resolved rate handed to the persistence collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateRecord {
    pub pair: CurrencyPair,
    pub rate: Decimal,
    /// Name of the source (or fallback tier) that produced the rate
    pub source_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bid: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ask: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<Decimal>,
    pub recorded_at: DateTime<Utc>,
}

impl RateRecord {
    pub fn new(pair: CurrencyPair, rate: Decimal, source_name: impl Into<String>) -> Self {
        Self {
            pair,
            rate,
            source_name: source_name.into(),
            bid: None,
            ask: None,
            volume: None,
            recorded_at: Utc::now(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Stats DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// Snapshot of one pooled session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    pub id: usize,
    pub identity_tag: String,
    pub call_count: u64,
    pub success_count: u64,
    pub fail_count: u64,
    pub is_blocked: bool,
    /// Seconds until the block lifts, if blocked
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked_for_secs: Option<f64>,
    pub checked_out: bool,
}

/// Snapshot of a session pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionPoolStats {
    pub sessions: Vec<SessionStats>,
    pub total_calls: u64,
    pub total_success: u64,
    pub total_fail: u64,
    pub adaptive_delay_secs: f64,
}

/// Per-source counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceStats {
    pub cache_entries: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_pool: Option<SessionPoolStats>,
}

/// Full observability surface of the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailedStats {
    pub outer_cache_entries: usize,
    pub sources: BTreeMap<String, SourceStats>,
    pub auto_update_running: bool,
    pub prefetch_running: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn test_rate_record_omits_missing_market_fields() {
        let pair = CurrencyPair::new("USD", "TRY").unwrap();
        let record = RateRecord::new(pair, Decimal::new(3450, 2), "exchangerate-api");

        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["source_name"], "exchangerate-api");
        assert!(json.get("bid").is_none());
        assert!(json.get("volume").is_none());
    }
}
