//! Storage capability used by the request handler

use crate::core::error::StoreError;
use crate::core::quote::QuoteRecord;
use async_trait::async_trait;
use std::time::Duration;

/// Append-only target for quote records.
///
/// Both operations must give up once `deadline` has passed, and must do so
/// while the operation is running, not after it returns.
#[async_trait]
pub trait QuoteStore: Send + Sync {
    /// Creates the quote table if it does not exist yet. Idempotent.
    async fn ensure_schema(&self, deadline: Duration) -> Result<(), StoreError>;

    /// Appends one record.
    async fn insert(&self, record: &QuoteRecord, deadline: Duration) -> Result<(), StoreError>;
}
