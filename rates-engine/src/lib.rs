//! # Rates Engine
//!
//! Resolution orchestrator and application service for currency rates.
//!
//! ## Architecture
//!
//! - `resolver` - Source chain walk with caching and tiered fallbacks
//! - `tasks` - Prefetch and auto-update background tasks
//! - `service` - Public `CurrencyService` facade
//!
//! Sources are injected as `Arc<dyn RateSource>`, so tests run the whole
//! chain against in-memory mocks.

pub mod config;
pub mod resolver;
pub mod service;
pub mod tasks;


pub use config::{DEFAULT_FROM, DEFAULT_TO, EngineConfig};
pub use resolver::{RateOrigin, RateResolver, Resolution};
pub use service::CurrencyService;
pub use tasks::{BackgroundTask, RefreshReport};
