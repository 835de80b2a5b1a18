//! # Rates Types
//!
//! Domain types and port traits for the currency rate engine.
//! This crate has ZERO external IO dependencies - only data structures,
//! validation rules, and trait definitions.
//!
//! ## Architecture
//!
//! This crate represents the **innermost core** of the engine:
//! - `domain/` - Pure domain types (CurrencyPair, CacheKey)
//! - `ports/` - Trait definitions that adapters must implement
//! - `dto/` - Observability snapshots and persistence records
//! - `error/` - Source, validation and persistence error types

pub mod domain;
pub mod dto;
pub mod error;
pub mod ports;

// Re-export commonly used types
pub use domain::{CacheKey, CurrencyPair};
pub use dto::*;
pub use error::{PersistError, RateError, SourceError, classify_failure, is_rate_limit_signal};
pub use exchange_rates::CurrencyCode;
pub use ports::{Fetched, RatePersistence, RateSource};
