//! Companion client: asks the server for a quote and writes it to a file.

use crate::core::config::ClientConfig;
use crate::core::error::ClientError;
use crate::core::quote::QuoteResponse;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

pub struct QuoteClient {
    endpoint: String,
    timeout: Duration,
    output_file: PathBuf,
    client: reqwest::Client,
}

impl QuoteClient {
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(ClientError::RequestBuild)?;
        Ok(Self {
            endpoint: config.endpoint.clone(),
            timeout: config.timeout(),
            output_file: config.output_file.clone(),
            client,
        })
    }

    pub fn output_file(&self) -> &Path {
        &self.output_file
    }

    /// One GET against the server, bounded by the client deadline.
    pub async fn fetch(&self) -> Result<QuoteResponse, ClientError> {
        let deadline = self.timeout;
        let transport_error = |source: reqwest::Error| {
            if source.is_timeout() {
                ClientError::Timeout { deadline }
            } else {
                ClientError::Transport {
                    url: self.endpoint.clone(),
                    source,
                }
            }
        };

        let request = self
            .client
            .get(&self.endpoint)
            .timeout(deadline)
            .build()
            .map_err(ClientError::RequestBuild)?;
        debug!("Requesting quote from {}", self.endpoint);
        let response = self
            .client
            .execute(request)
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let body = response.bytes().await.map_err(transport_error)?;
        if !status.is_success() {
            return Err(ClientError::Status {
                status,
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        let quote: QuoteResponse = serde_json::from_slice(&body)?;
        info!(bid = quote.bid, "Received quote");
        Ok(quote)
    }

    /// Writes the rendered quote. The file either ends up complete or is
    /// left untouched.
    pub fn write(&self, quote: &QuoteResponse) -> Result<(), ClientError> {
        let write_error = |source: std::io::Error| ClientError::Write {
            path: self.output_file.clone(),
            source,
        };

        let staging = staging_path(&self.output_file);
        fs::write(&staging, render(quote)).map_err(write_error)?;
        if let Err(e) = fs::rename(&staging, &self.output_file) {
            let _ = fs::remove_file(&staging);
            return Err(write_error(e));
        }
        debug!("Wrote quote to {}", self.output_file.display());
        Ok(())
    }

    pub async fn run(&self) -> Result<(), ClientError> {
        let quote = self.fetch().await?;
        self.write(&quote)
    }
}

pub fn render(quote: &QuoteResponse) -> String {
    format!("Dólar: {}", quote.bid)
}

fn staging_path(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    target.with_file_name(name)
}
