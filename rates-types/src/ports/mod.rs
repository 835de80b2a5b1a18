//! Port traits (interfaces for adapters).
//!
//! These are the contracts that adapters must implement.
//! The resolver depends on these traits, not concrete implementations.

mod persistence;
mod source;

pub use persistence::RatePersistence;
pub use source::{Fetched, RateSource};
