pub mod memory;
pub mod sqlite;

use crate::core::config::{StoreBackend, StoreConfig};
use crate::core::quote::QuotePair;
use crate::core::store::QuoteStore;
use memory::MemoryQuoteStore;
use sqlite::SqliteQuoteStore;
use std::sync::Arc;
use tracing::debug;

/// Builds the store backend selected in the config.
pub fn from_config(config: &StoreConfig, pair: &QuotePair) -> Arc<dyn QuoteStore> {
    match config.backend {
        StoreBackend::Sqlite => {
            let store = SqliteQuoteStore::new(&config.data_dir, pair);
            debug!("Using SQLite store at {}", store.path().display());
            Arc::new(store)
        }
        StoreBackend::Memory => {
            debug!("Using in-memory store");
            Arc::new(MemoryQuoteStore::new())
        }
    }
}
