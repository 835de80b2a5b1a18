//! Persistence collaborator that records refreshed rates in the log stream.

use async_trait::async_trait;
use rates_types::{PersistError, RatePersistence, RateRecord};

/// Emits each refreshed rate as a structured `info!` event.
///
/// Consumers with a real store implement `RatePersistence` themselves; the
/// daemon ships this one so auto-update has somewhere to report to.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogPersistence;

#[async_trait]
impl RatePersistence for LogPersistence {
    async fn store_rate(&self, record: RateRecord) -> Result<(), PersistError> {
        tracing::info!(
            target: "rates::persist",
            pair = %record.pair,
            rate = %record.rate,
            source = %record.source_name,
            recorded_at = %record.recorded_at,
            "Rate refreshed"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rates_types::CurrencyPair;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_log_persistence_accepts_records() {
        let pair = CurrencyPair::new("USD", "TRY").unwrap();
        let record = RateRecord::new(pair, dec!(34.10), "frankfurter");

        assert!(LogPersistence.store_rate(record).await.is_ok());
    }
}
