//! Quote abstractions and core types

use crate::core::error::{ConfigError, FetchError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

/// Price of one unit of the destination currency in source currency units.
pub type Bid = f64;

/// The (source, destination) currency codes identifying an exchange rate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "QuotePairDto", into = "QuotePairDto")]
pub struct QuotePair {
    source: String,
    destination: String,
}

impl QuotePair {
    pub fn new(source: &str, destination: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            source: normalize_code(source)?,
            destination: normalize_code(destination)?,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Path segment used by the upstream API, e.g. `USD-BRL`.
    pub fn path_segment(&self) -> String {
        format!("{}-{}", self.destination, self.source)
    }

    /// Key of the upstream envelope, e.g. `USDBRL`.
    pub fn envelope_key(&self) -> String {
        format!("{}{}", self.destination, self.source)
    }

    /// Name of the store file, unique per pair, e.g. `cotacao_BRL_USD.db`.
    pub fn store_file_name(&self) -> String {
        format!("cotacao_{}_{}.db", self.source, self.destination)
    }
}

impl Default for QuotePair {
    fn default() -> Self {
        Self {
            source: "BRL".to_string(),
            destination: "USD".to_string(),
        }
    }
}

impl Display for QuotePair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.destination, self.source)
    }
}

impl FromStr for QuotePair {
    type Err = ConfigError;

    /// Parses `DEST-SRC`, the same shape as the upstream path segment.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (destination, source) = s
            .split_once('-')
            .ok_or_else(|| ConfigError::InvalidPair(s.to_string()))?;
        Self::new(source, destination)
    }
}

fn normalize_code(code: &str) -> Result<String, ConfigError> {
    let code = code.trim();
    if code.is_empty() || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(ConfigError::InvalidCurrency(code.to_string()));
    }
    Ok(code.to_ascii_uppercase())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct QuotePairDto {
    source: String,
    destination: String,
}

impl Default for QuotePairDto {
    fn default() -> Self {
        QuotePair::default().into()
    }
}

impl From<QuotePair> for QuotePairDto {
    fn from(value: QuotePair) -> Self {
        Self {
            source: value.source,
            destination: value.destination,
        }
    }
}

impl TryFrom<QuotePairDto> for QuotePair {
    type Error = ConfigError;

    fn try_from(value: QuotePairDto) -> Result<Self, Self::Error> {
        QuotePair::new(&value.source, &value.destination)
    }
}

/// A row appended to the quote store.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuoteRecord {
    pub bid: Bid,
}

/// Body returned by `GET /cotacao`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuoteResponse {
    pub bid: Bid,
}

#[async_trait]
pub trait QuoteProvider: Send + Sync {
    /// Fetches the current bid for `pair`. `deadline` bounds the whole call,
    /// body read included.
    async fn fetch_bid(&self, pair: &QuotePair, deadline: Duration) -> Result<Bid, FetchError>;
}
