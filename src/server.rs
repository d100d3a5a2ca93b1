//! HTTP front end: `GET /cotacao` runs fetch, store and respond for one request.

use crate::core::config::{AppConfig, ServerConfig};
use crate::core::error::{QuoteError, StoreError};
use crate::core::quote::{QuotePair, QuoteProvider, QuoteRecord, QuoteResponse};
use crate::core::store::QuoteStore;
use crate::providers::AwesomeApiProvider;
use crate::store;
use actix_web::dev::Server;
use actix_web::http::{StatusCode, header::ContentType};
use actix_web::{App, HttpResponse, HttpServer, ResponseError, get, web};
use anyhow::{Context, Result};
use std::net::TcpListener;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument};

/// Everything one request needs. Immutable, so workers share it freely.
pub struct QuoteService {
    provider: Arc<dyn QuoteProvider>,
    store: Arc<dyn QuoteStore>,
    pair: QuotePair,
    fetch_timeout: Duration,
    store_timeout: Duration,
}

impl QuoteService {
    pub fn new(
        provider: Arc<dyn QuoteProvider>,
        store: Arc<dyn QuoteStore>,
        pair: QuotePair,
        config: &ServerConfig,
    ) -> Self {
        Self {
            provider,
            store,
            pair,
            fetch_timeout: config.fetch_timeout(),
            store_timeout: config.store_timeout(),
        }
    }

    /// Fetches a quote and persists it. The record is written before the
    /// response value is handed back.
    #[instrument(name = "Quote", skip(self), fields(pair = %self.pair))]
    pub async fn quote(&self) -> Result<QuoteResponse, QuoteError> {
        debug!(stage = "fetching", deadline = ?self.fetch_timeout, "Fetching quote");
        let bid = self.provider.fetch_bid(&self.pair, self.fetch_timeout).await?;

        debug!(stage = "storing", deadline = ?self.store_timeout, "Storing quote");
        let record = QuoteRecord { bid };
        self.store_record(&record).await?;

        Ok(QuoteResponse { bid: record.bid })
    }

    /// Schema setup and insert share one budget that starts here, separate
    /// from the fetch budget.
    async fn store_record(&self, record: &QuoteRecord) -> Result<(), StoreError> {
        let started = Instant::now();
        let remaining = || self.store_timeout.saturating_sub(started.elapsed());

        self.store.ensure_schema(remaining()).await?;
        self.store.insert(record, remaining()).await
    }
}

impl ResponseError for QuoteError {
    fn status_code(&self) -> StatusCode {
        if self.is_timeout() {
            StatusCode::REQUEST_TIMEOUT
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .content_type(ContentType::plaintext())
            .body(self.to_string())
    }
}

async fn respond(service: &QuoteService) -> Result<HttpResponse, QuoteError> {
    let response = service.quote().await?;

    debug!(stage = "responding", "Encoding response");
    let body = serde_json::to_vec(&response)?;
    info!(bid = response.bid, "Quote served");
    Ok(HttpResponse::Ok()
        .content_type(ContentType::json())
        .body(body))
}

#[get("/cotacao")]
pub async fn cotacao(service: web::Data<QuoteService>) -> Result<HttpResponse, QuoteError> {
    info!("Received a request on /cotacao");
    respond(&service).await.inspect_err(|e| {
        error!(stage = e.stage(), error = %e, "Request failed");
    })
}

/// Wires the quote route and service into an actix app.
pub fn configure(service: web::Data<QuoteService>) -> impl FnOnce(&mut web::ServiceConfig) {
    move |cfg| {
        cfg.app_data(service).service(cotacao);
    }
}

/// Builds the service graph described by `config`.
pub fn build_service(config: &AppConfig) -> Result<QuoteService> {
    let provider = AwesomeApiProvider::new(&config.provider.base_url)
        .context("Failed to create quote provider")?;
    let store = store::from_config(&config.store, &config.pair);
    Ok(QuoteService::new(
        Arc::new(provider),
        store,
        config.pair.clone(),
        &config.server,
    ))
}

/// Starts serving on an already bound listener.
pub fn run(service: QuoteService, listener: TcpListener) -> Result<Server> {
    let service = web::Data::new(service);
    let server = HttpServer::new(move || App::new().configure(configure(service.clone())))
        .listen(listener)
        .context("Failed to listen")?
        .run();
    Ok(server)
}

pub async fn serve(config: &AppConfig) -> Result<()> {
    let service = build_service(config)?;
    let listener = TcpListener::bind(("0.0.0.0", config.server.port))
        .with_context(|| format!("Failed to bind port {}", config.server.port))?;
    info!(
        pair = %config.pair,
        upstream = %config.provider.base_url,
        "Listening on {}",
        config.server.port
    );
    run(service, listener)?.await.context("Server failed")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::FetchError;
    use crate::store::memory::MemoryQuoteStore;
    use actix_web::test;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedProvider(Result<f64, fn() -> FetchError>);

    #[async_trait]
    impl QuoteProvider for FixedProvider {
        async fn fetch_bid(
            &self,
            _pair: &QuotePair,
            _deadline: Duration,
        ) -> Result<f64, FetchError> {
            self.0.map_err(|make| make())
        }
    }

    /// Store that fails every call with the given error.
    struct FailingStore {
        error: fn() -> StoreError,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl QuoteStore for FailingStore {
        async fn ensure_schema(&self, _deadline: Duration) -> Result<(), StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err((self.error)())
        }

        async fn insert(
            &self,
            _record: &QuoteRecord,
            _deadline: Duration,
        ) -> Result<(), StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err((self.error)())
        }
    }

    fn service(provider: FixedProvider, store: Arc<dyn QuoteStore>) -> web::Data<QuoteService> {
        web::Data::new(QuoteService::new(
            Arc::new(provider),
            store,
            QuotePair::default(),
            &ServerConfig::default(),
        ))
    }

    async fn get_cotacao(service: web::Data<QuoteService>) -> actix_web::dev::ServiceResponse {
        let app = test::init_service(App::new().configure(configure(service))).await;
        let req = test::TestRequest::get().uri("/cotacao").to_request();
        test::call_service(&app, req).await
    }

    #[actix_web::test]
    async fn test_success_returns_json_and_stores_record() {
        let store = MemoryQuoteStore::new();
        let res = get_cotacao(service(FixedProvider(Ok(5.4321)), Arc::new(store.clone()))).await;

        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(
            res.headers().get("content-type").unwrap(),
            "application/json"
        );
        let body: QuoteResponse = test::read_body_json(res).await;
        assert_eq!(body, QuoteResponse { bid: 5.4321 });
        assert_eq!(store.records().await, vec![QuoteRecord { bid: 5.4321 }]);
    }

    #[actix_web::test]
    async fn test_fetch_timeout_maps_to_408_and_skips_store() {
        let store = Arc::new(FailingStore {
            error: || StoreError::Schema("unused".into()),
            calls: AtomicUsize::new(0),
        });
        let provider = FixedProvider(Err(|| FetchError::Timeout {
            deadline: Duration::from_millis(200),
        }));
        let res = get_cotacao(service(provider, store.clone())).await;

        assert_eq!(res.status(), StatusCode::REQUEST_TIMEOUT);
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
    }

    #[actix_web::test]
    async fn test_parse_error_maps_to_500() {
        let store = MemoryQuoteStore::new();
        let provider = FixedProvider(Err(|| FetchError::Parse {
            value: "abc".to_string(),
        }));
        let res = get_cotacao(service(provider, Arc::new(store.clone()))).await;

        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            res.headers().get("content-type").unwrap(),
            "text/plain; charset=utf-8"
        );
        let body = test::read_body(res).await;
        assert_eq!(
            std::str::from_utf8(&body).unwrap(),
            "fetching quote failed: invalid bid value \"abc\""
        );
        assert!(store.records().await.is_empty());
    }

    #[actix_web::test]
    async fn test_store_timeout_maps_to_408() {
        let store = Arc::new(FailingStore {
            error: || StoreError::Timeout {
                deadline: Duration::from_millis(10),
            },
            calls: AtomicUsize::new(0),
        });
        let res = get_cotacao(service(FixedProvider(Ok(5.0)), store.clone())).await;

        assert_eq!(res.status(), StatusCode::REQUEST_TIMEOUT);
        let body = test::read_body(res).await;
        assert!(!std::str::from_utf8(&body).unwrap().contains("bid"));
        // First error wins; insert is never attempted after a failed schema step.
        assert_eq!(store.calls.load(Ordering::SeqCst), 1);
    }

    #[actix_web::test]
    async fn test_store_failure_maps_to_500() {
        let store = Arc::new(FailingStore {
            error: || StoreError::Schema("disk I/O error".into()),
            calls: AtomicUsize::new(0),
        });
        let res = get_cotacao(service(FixedProvider(Ok(5.0)), store)).await;

        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[actix_web::test]
    async fn test_only_get_is_routed() {
        let store = MemoryQuoteStore::new();
        let service = service(FixedProvider(Ok(1.0)), Arc::new(store.clone()));
        let app = test::init_service(App::new().configure(configure(service))).await;
        let req = test::TestRequest::post().uri("/cotacao").to_request();
        let res = test::call_service(&app, req).await;

        assert!(!res.status().is_success());
        assert!(store.records().await.is_empty());
    }
}
