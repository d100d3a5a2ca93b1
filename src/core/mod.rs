//! Core business logic abstractions

pub mod config;
pub mod error;
pub mod log;
pub mod quote;
pub mod store;

// Re-export main types for cleaner imports
pub use error::{ClientError, ConfigError, FetchError, QuoteError, StoreError};
pub use quote::{Bid, QuotePair, QuoteProvider, QuoteRecord, QuoteResponse};
pub use store::QuoteStore;
