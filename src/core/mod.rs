//! Core business logic abstractions

pub mod cache;
pub mod categorizer;
pub mod category;
pub mod clock;
pub mod config;
pub mod currency;
pub mod log;
pub mod rates;
pub mod store;

// Re-export main types for cleaner imports
pub use categorizer::{CategorizationEngine, CategorizationPolicy};
pub use category::{CategorizationResult, CategoryDirectory, CategoryId, CategoryInference};
pub use clock::{Clock, SystemClock};
pub use currency::{CurrencyRateProvider, ExchangeRateRecord, RateSnapshotProvider};
pub use rates::{DatedRate, RateResolver};
pub use store::{MappingStore, RateStore};
