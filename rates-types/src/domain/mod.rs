//! Domain models for the rate engine.

pub mod pair;

pub use pair::{CacheKey, CurrencyPair};
