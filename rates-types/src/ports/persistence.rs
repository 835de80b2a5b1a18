//! Persistence port.
//!
//! Storage and history of resolved rates belong to the consumer; the engine
//! only hands records over.

use crate::dto::RateRecord;
use crate::error::PersistError;

/// Port trait for the external rate store.
#[async_trait::async_trait]
pub trait RatePersistence: Send + Sync + 'static {
    /// Stores one resolved rate.
    async fn store_rate(&self, record: RateRecord) -> Result<(), PersistError>;
}
