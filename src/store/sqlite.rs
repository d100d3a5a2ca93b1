use crate::core::error::{BoxError, StoreError};
use crate::core::quote::{QuotePair, QuoteRecord};
use crate::core::store::QuoteStore;
use async_trait::async_trait;
use rusqlite::{Connection, ErrorCode, params};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::debug;

const CREATE_TABLE: &str =
    "CREATE TABLE IF NOT EXISTS cotacao (id INTEGER PRIMARY KEY AUTOINCREMENT, cotacao FLOAT)";
const INSERT_QUOTE: &str = "INSERT INTO cotacao (cotacao) VALUES (?1)";

/// VM instructions between deadline checks.
const PROGRESS_STEPS: i32 = 4;

/// SQLite-backed quote store. Every call opens its own connection and
/// closes it before returning.
pub struct SqliteQuoteStore {
    path: PathBuf,
}

impl SqliteQuoteStore {
    pub fn new<P: AsRef<Path>>(data_dir: P, pair: &QuotePair) -> Self {
        Self {
            path: data_dir.as_ref().join(pair.store_file_name()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Runs `op` in a transaction on a fresh connection on the blocking pool.
    /// The deadline is enforced inside SQLite: the progress handler interrupts
    /// running statements and the busy timeout bounds lock waits. The deadline
    /// is checked once more before `COMMIT`, so a `Timeout` result always means
    /// nothing was committed.
    async fn with_transaction<F>(
        &self,
        deadline: Duration,
        wrap: fn(BoxError) -> StoreError,
        op: F,
    ) -> Result<(), StoreError>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<()> + Send + 'static,
    {
        let path = self.path.clone();
        let expires_at = Instant::now() + deadline;
        tokio::task::spawn_blocking(move || {
            let mut conn = open(&path, expires_at, deadline)?;
            let result = run_transaction(&mut conn, expires_at, deadline, wrap, op);
            if let Err((_, e)) = conn.close() {
                debug!("Failed to close store connection: {}", e);
            }
            result
        })
        .await?
    }
}

fn run_transaction<F>(
    conn: &mut Connection,
    expires_at: Instant,
    deadline: Duration,
    wrap: fn(BoxError) -> StoreError,
    op: F,
) -> Result<(), StoreError>
where
    F: FnOnce(&Connection) -> rusqlite::Result<()>,
{
    let tx = conn
        .transaction()
        .map_err(|e| classify(e, deadline, wrap))?;
    op(&tx).map_err(|e| classify(e, deadline, wrap))?;

    // Dropping `tx` rolls back.
    if Instant::now() >= expires_at {
        return Err(StoreError::Timeout { deadline });
    }
    // Past this point the outcome is whatever COMMIT reports.
    tx.progress_handler(0, None::<fn() -> bool>);
    tx.commit().map_err(|e| classify(e, deadline, wrap))
}

fn open(path: &Path, expires_at: Instant, deadline: Duration) -> Result<Connection, StoreError> {
    let open_error = |source: BoxError| StoreError::Open {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| open_error(e.into()))?;
    }
    if !path.exists() {
        debug!("Creating store file {}", path.display());
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| open_error(e.into()))?;
    }

    let conn = Connection::open(path).map_err(|e| open_error(e.into()))?;
    conn.busy_timeout(deadline)
        .map_err(|e| open_error(e.into()))?;
    conn.progress_handler(PROGRESS_STEPS, Some(move || Instant::now() >= expires_at));
    Ok(conn)
}

/// Interrupted or lock-starved statements ran out of budget.
fn is_deadline_error(e: &rusqlite::Error) -> bool {
    matches!(
        e.sqlite_error_code(),
        Some(ErrorCode::OperationInterrupted | ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
    )
}

fn classify(e: rusqlite::Error, deadline: Duration, wrap: fn(BoxError) -> StoreError) -> StoreError {
    if is_deadline_error(&e) {
        StoreError::Timeout { deadline }
    } else {
        wrap(e.into())
    }
}

#[async_trait]
impl QuoteStore for SqliteQuoteStore {
    async fn ensure_schema(&self, deadline: Duration) -> Result<(), StoreError> {
        debug!("Ensuring quote table in {}", self.path.display());
        self.with_transaction(deadline, StoreError::Schema, |conn| {
            conn.execute(CREATE_TABLE, []).map(|_| ())
        })
        .await
    }

    async fn insert(&self, record: &QuoteRecord, deadline: Duration) -> Result<(), StoreError> {
        debug!(bid = record.bid, "Inserting quote into {}", self.path.display());
        let bid = record.bid;
        self.with_transaction(deadline, StoreError::Insert, move |conn| {
            conn.execute(INSERT_QUOTE, params![bid]).map(|_| ())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const DEADLINE: Duration = Duration::from_secs(5);

    fn rows(path: &Path) -> Vec<f64> {
        let conn = Connection::open(path).unwrap();
        let mut stmt = conn
            .prepare("SELECT cotacao FROM cotacao ORDER BY id")
            .unwrap();
        stmt.query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap()
    }

    #[tokio::test]
    async fn test_store_file_named_after_pair() {
        let dir = tempdir().unwrap();
        let store = SqliteQuoteStore::new(dir.path(), &QuotePair::default());
        assert_eq!(store.path(), dir.path().join("cotacao_BRL_USD.db"));
        assert!(!store.path().exists());

        store.ensure_schema(DEADLINE).await.unwrap();
        assert!(store.path().exists());
    }

    #[tokio::test]
    async fn test_creates_missing_data_dir() {
        let dir = tempdir().unwrap();
        let store = SqliteQuoteStore::new(dir.path().join("nested/data"), &QuotePair::default());

        store.ensure_schema(DEADLINE).await.unwrap();
        assert!(store.path().exists());
    }

    #[tokio::test]
    async fn test_ensure_schema_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = SqliteQuoteStore::new(dir.path(), &QuotePair::default());

        store.ensure_schema(DEADLINE).await.unwrap();
        store.ensure_schema(DEADLINE).await.unwrap();

        let conn = Connection::open(store.path()).unwrap();
        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'cotacao'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 1);
    }

    #[tokio::test]
    async fn test_insert_appends_rows() {
        let dir = tempdir().unwrap();
        let store = SqliteQuoteStore::new(dir.path(), &QuotePair::default());

        store.ensure_schema(DEADLINE).await.unwrap();
        store
            .insert(&QuoteRecord { bid: 5.4321 }, DEADLINE)
            .await
            .unwrap();
        store
            .insert(&QuoteRecord { bid: 5.5 }, DEADLINE)
            .await
            .unwrap();

        assert_eq!(rows(store.path()), vec![5.4321, 5.5]);
    }

    #[tokio::test]
    async fn test_insert_without_schema_fails() {
        let dir = tempdir().unwrap();
        let store = SqliteQuoteStore::new(dir.path(), &QuotePair::default());

        let result = store.insert(&QuoteRecord { bid: 1.0 }, DEADLINE).await;
        assert!(matches!(result, Err(StoreError::Insert(_))));
    }

    #[tokio::test]
    async fn test_expired_deadline_writes_nothing() {
        let dir = tempdir().unwrap();
        let store = SqliteQuoteStore::new(dir.path(), &QuotePair::default());
        store.ensure_schema(DEADLINE).await.unwrap();

        let result = store
            .insert(&QuoteRecord { bid: 1.0 }, Duration::ZERO)
            .await;
        assert!(result.unwrap_err().is_timeout());
        assert!(rows(store.path()).is_empty());
    }

    #[tokio::test]
    async fn test_timeout_result_matches_committed_rows() {
        let dir = tempdir().unwrap();
        let store = SqliteQuoteStore::new(dir.path(), &QuotePair::default());
        store.ensure_schema(DEADLINE).await.unwrap();

        // Typical cost of one uncontended insert on this machine.
        let warmup = 5;
        let started = Instant::now();
        for _ in 0..warmup {
            store
                .insert(&QuoteRecord { bid: 1.0 }, DEADLINE)
                .await
                .unwrap();
        }
        let typical = started.elapsed() / warmup;

        // Deadlines from 0.3x to 1.6x of the typical insert time.
        let mut ok = 0;
        let mut timeouts = 0;
        for i in 0..200u32 {
            let deadline = typical * (30 + i % 131) / 100;
            match store.insert(&QuoteRecord { bid: 2.0 }, deadline).await {
                Ok(()) => ok += 1,
                Err(e) => {
                    assert!(e.is_timeout(), "unexpected error: {e}");
                    timeouts += 1;
                }
            }
        }

        let committed = rows(store.path()).len() - warmup as usize;
        assert_eq!(committed, ok, "{timeouts} inserts reported as timed out");
    }

    #[tokio::test]
    async fn test_unopenable_path() {
        let dir = tempdir().unwrap();
        // A regular file where the data directory should be.
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "").unwrap();
        let store = SqliteQuoteStore::new(&blocker, &QuotePair::default());

        let result = store.ensure_schema(DEADLINE).await;
        assert!(matches!(result, Err(StoreError::Open { .. })));
    }
}
