//! Error types for each stage of the quote pipeline

use reqwest::StatusCode;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid currency code: {0:?}")]
    InvalidCurrency(String),
    #[error("invalid currency pair {0:?}, expected DEST-SRC")]
    InvalidPair(String),
    #[error("configuration field `{0}` must not be empty")]
    Empty(&'static str),
}

/// Failures of the outbound call to the upstream quote source.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to build upstream request: {0}")]
    RequestBuild(#[source] reqwest::Error),
    #[error("upstream request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("upstream request exceeded {deadline:?}")]
    Timeout { deadline: Duration },
    #[error("upstream returned HTTP {0}")]
    Status(StatusCode),
    #[error("failed to decode upstream response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("upstream response has no entry for {key}")]
    MissingEntry { key: String },
    #[error("invalid bid value {value:?}")]
    Parse { value: String },
}

impl FetchError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, FetchError::Timeout { .. })
    }
}

/// Failures of the persistence step, independent of the backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to open store {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: BoxError,
    },
    #[error("failed to create schema: {0}")]
    Schema(#[source] BoxError),
    #[error("failed to insert quote: {0}")]
    Insert(#[source] BoxError),
    #[error("store write exceeded {deadline:?}")]
    Timeout { deadline: Duration },
    #[error("store worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

impl StoreError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, StoreError::Timeout { .. })
    }
}

/// Everything that can end a `GET /cotacao` request early.
#[derive(Debug, Error)]
pub enum QuoteError {
    #[error("fetching quote failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("storing quote failed: {0}")]
    Store(#[from] StoreError),
    #[error("encoding response failed: {0}")]
    Encode(#[from] serde_json::Error),
}

impl QuoteError {
    pub fn is_timeout(&self) -> bool {
        match self {
            QuoteError::Fetch(e) => e.is_timeout(),
            QuoteError::Store(e) => e.is_timeout(),
            QuoteError::Encode(_) => false,
        }
    }

    /// Pipeline stage the request was in when it failed.
    pub fn stage(&self) -> &'static str {
        match self {
            QuoteError::Fetch(_) => "fetching",
            QuoteError::Store(_) => "storing",
            QuoteError::Encode(_) => "responding",
        }
    }
}

/// Failures of the companion client; all of them abort the run.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to build request: {0}")]
    RequestBuild(#[source] reqwest::Error),
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("request exceeded {deadline:?}")]
    Timeout { deadline: Duration },
    #[error("server returned HTTP {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("failed to decode server response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
