use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::core::error::FetchError;
use crate::core::quote::{Bid, QuotePair, QuoteProvider};

const USER_AGENT: &str = concat!("cotacao/", env!("CARGO_PKG_VERSION"));

// AwesomeApiProvider implementation for QuoteProvider
pub struct AwesomeApiProvider {
    base_url: String,
    client: reqwest::Client,
}

impl AwesomeApiProvider {
    pub fn new(base_url: &str) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(FetchError::RequestBuild)?;
        Ok(AwesomeApiProvider {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }
}

/// Inner object of the upstream envelope; fields other than `bid` are ignored.
#[derive(Debug, Deserialize)]
struct QuoteEnvelopeEntry {
    bid: String,
}

type QuoteEnvelope = HashMap<String, QuoteEnvelopeEntry>;

fn decode_bid(body: &[u8], key: &str) -> Result<Bid, FetchError> {
    let mut envelope: QuoteEnvelope = serde_json::from_slice(body)?;
    let entry = envelope
        .remove(key)
        .ok_or_else(|| FetchError::MissingEntry {
            key: key.to_string(),
        })?;
    parse_bid(&entry.bid)
}

fn parse_bid(value: &str) -> Result<Bid, FetchError> {
    match value.parse::<f64>() {
        Ok(bid) if bid.is_finite() => Ok(bid),
        _ => Err(FetchError::Parse {
            value: value.to_string(),
        }),
    }
}

#[async_trait]
impl QuoteProvider for AwesomeApiProvider {
    #[instrument(
        name = "AwesomeApiFetch",
        skip(self),
        fields(pair = %pair)
    )]
    async fn fetch_bid(&self, pair: &QuotePair, deadline: Duration) -> Result<Bid, FetchError> {
        let url = format!("{}/{}", self.base_url, pair.path_segment());
        debug!("Requesting quote from {}", url);

        let transport_error = |source: reqwest::Error| {
            if source.is_timeout() {
                FetchError::Timeout { deadline }
            } else {
                FetchError::Transport {
                    url: url.clone(),
                    source,
                }
            }
        };

        // The timeout covers connect, headers and body, so a stalled body
        // read fails instead of hanging.
        let request = self
            .client
            .get(&url)
            .timeout(deadline)
            .build()
            .map_err(FetchError::RequestBuild)?;
        let response = self
            .client
            .execute(request)
            .await
            .map_err(transport_error)?;

        debug!(status = %response.status(), "Received upstream response");
        if !response.status().is_success() {
            return Err(FetchError::Status(response.status()));
        }

        let body = response.bytes().await.map_err(transport_error)?;
        debug!(stage = "decoding", size = body.len(), "Decoding upstream quote");
        let bid = decode_bid(&body, &pair.envelope_key())?;
        debug!(bid, "Decoded upstream quote");
        Ok(bid)
    }
}
