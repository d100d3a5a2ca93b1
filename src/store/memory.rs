use crate::core::error::{BoxError, StoreError};
use crate::core::quote::QuoteRecord;
use crate::core::store::QuoteStore;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Default)]
struct Table {
    created: bool,
    rows: Vec<QuoteRecord>,
}

/// In-memory quote store. Rows live as long as the process.
#[derive(Clone, Default)]
pub struct MemoryQuoteStore {
    inner: Arc<Mutex<Table>>,
}

impl MemoryQuoteStore {
    /// Creates a new MemoryQuoteStore instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all stored records in insertion order.
    pub async fn records(&self) -> Vec<QuoteRecord> {
        self.inner.lock().await.rows.clone()
    }
}

#[async_trait]
impl QuoteStore for MemoryQuoteStore {
    async fn ensure_schema(&self, deadline: Duration) -> Result<(), StoreError> {
        let mut table = tokio::time::timeout(deadline, self.inner.lock())
            .await
            .map_err(|_| StoreError::Timeout { deadline })?;
        if !table.created {
            debug!("Creating in-memory quote table");
            table.created = true;
        }
        Ok(())
    }

    async fn insert(&self, record: &QuoteRecord, deadline: Duration) -> Result<(), StoreError> {
        let mut table = tokio::time::timeout(deadline, self.inner.lock())
            .await
            .map_err(|_| StoreError::Timeout { deadline })?;
        if !table.created {
            let cause: BoxError = "no such table: cotacao".into();
            return Err(StoreError::Insert(cause));
        }
        debug!(bid = record.bid, "Inserting quote into memory");
        table.rows.push(*record);
        Ok(())
    }
}
