//! The five caching strategies.
//!
//! | Strategy | Order | Writes to | When everything fails |
//! |----------|-------|-----------|-----------------------|
//! | Page | network, cache | `dynamic` | offline page |
//! | Static | cache, network | `static` | error |
//! | Api | network, cache | `dynamic` | error |
//! | Image | cache, network | `dynamic` | SVG placeholder |
//! | Generic | network, cache | nothing | error |
//!
//! Only 2xx responses are written; anything else goes back to the page
//! without touching the stored copy. The partition lock is never held
//! across a network call.

use std::sync::Arc;

use http::header::{CACHE_CONTROL, CONTENT_TYPE};
use http::{HeaderValue, StatusCode};
use makerhub_net::{Fetcher, NetError, Request, Response};
use tokio::sync::RwLock;
use tracing::{debug, trace, warn};
use url::Url;

use crate::cache::CacheStorage;
use crate::classify::Strategy;
use crate::config::WorkerConfig;
use crate::partitions::PartitionNames;
use crate::ServiceWorkerError;

/// Served in place of an image that is neither cached nor reachable.
pub const IMAGE_PLACEHOLDER_SVG: &str = concat!(
    r##"<svg xmlns="http://www.w3.org/2000/svg" width="200" height="200" viewBox="0 0 200 200">"##,
    r##"<rect width="200" height="200" fill="#f3f4f6"/>"##,
    r##"<text x="100" y="100" text-anchor="middle" dominant-baseline="middle" "##,
    r##"font-family="sans-serif" font-size="14" fill="#9ca3af">Imagen no disponible</text>"##,
    r##"</svg>"##
);

/// Where a response handed back to the page came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Network,
    Cache,
    /// The precached offline page standing in for a navigation.
    OfflineFallback,
    /// A synthesized response.
    Placeholder,
}

/// Response chosen by a strategy.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub response: Response,
    pub source: ResponseSource,
}

impl FetchResponse {
    fn new(response: Response, source: ResponseSource) -> Self {
        Self { response, source }
    }

    pub fn from_cache(&self) -> bool {
        matches!(
            self.source,
            ResponseSource::Cache | ResponseSource::OfflineFallback
        )
    }
}

/// Strategy handlers sharing the partition store and the network.
pub struct Strategies {
    caches: Arc<RwLock<CacheStorage>>,
    fetcher: Arc<dyn Fetcher>,
    names: PartitionNames,
    offline_url: Url,
}

impl Strategies {
    pub fn new(
        config: &WorkerConfig,
        caches: Arc<RwLock<CacheStorage>>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Result<Self, ServiceWorkerError> {
        Ok(Self {
            caches,
            fetcher,
            names: config.partition_names(),
            offline_url: config.resolve(&config.offline_page)?,
        })
    }

    /// Run `strategy` for `request`.
    pub async fn handle(
        &self,
        strategy: Strategy,
        request: Request,
    ) -> Result<FetchResponse, ServiceWorkerError> {
        trace!(url = %request.url, strategy = strategy.as_str(), "Handling fetch");
        match strategy {
            Strategy::Page => Ok(self.page(request).await),
            Strategy::Static => self.static_asset(request).await,
            Strategy::Api => self.api(request).await,
            Strategy::Image => Ok(self.image(request).await),
            Strategy::Generic => self.network_first(request).await,
        }
    }

    /// Navigations always resolve.
    async fn page(&self, request: Request) -> FetchResponse {
        let url = request.url.clone();
        match self.fetcher.fetch(request).await {
            Ok(response) => {
                self.store(&self.names.dynamic, &url, &response).await;
                FetchResponse::new(response, ResponseSource::Network)
            }
            Err(error) => {
                debug!(url = %url, %error, "Navigation failed, serving from cache");
                if let Some(cached) = self.lookup(&url).await {
                    return FetchResponse::new(cached, ResponseSource::Cache);
                }
                if let Some(offline) = self.lookup(&self.offline_url).await {
                    return FetchResponse::new(offline, ResponseSource::OfflineFallback);
                }
                warn!(url = %url, "Offline page is not cached");
                FetchResponse::new(
                    Response::new(url, StatusCode::SERVICE_UNAVAILABLE)
                        .with_header(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"))
                        .with_body("Sin conexión"),
                    ResponseSource::OfflineFallback,
                )
            }
        }
    }

    /// A missing static asset is a deploy bug, so network failures propagate.
    async fn static_asset(&self, request: Request) -> Result<FetchResponse, ServiceWorkerError> {
        if let Some(cached) = self.lookup(&request.url).await {
            return Ok(FetchResponse::new(cached, ResponseSource::Cache));
        }

        let url = request.url.clone();
        let response = self.fetcher.fetch(request).await?;
        self.store(&self.names.static_assets, &url, &response).await;
        Ok(FetchResponse::new(response, ResponseSource::Network))
    }

    async fn api(&self, request: Request) -> Result<FetchResponse, ServiceWorkerError> {
        let url = request.url.clone();
        match self.fetcher.fetch(request).await {
            Ok(response) => {
                self.store(&self.names.dynamic, &url, &response).await;
                Ok(FetchResponse::new(response, ResponseSource::Network))
            }
            Err(error) => self.cached_or(url, error).await,
        }
    }

    async fn image(&self, request: Request) -> FetchResponse {
        if let Some(cached) = self.lookup(&request.url).await {
            return FetchResponse::new(cached, ResponseSource::Cache);
        }

        let url = request.url.clone();
        match self.fetcher.fetch(request).await {
            Ok(response) => {
                self.store(&self.names.dynamic, &url, &response).await;
                FetchResponse::new(response, ResponseSource::Network)
            }
            Err(error) => {
                debug!(url = %url, %error, "Image unavailable, serving placeholder");
                FetchResponse::new(image_placeholder(url), ResponseSource::Placeholder)
            }
        }
    }

    async fn network_first(&self, request: Request) -> Result<FetchResponse, ServiceWorkerError> {
        let url = request.url.clone();
        match self.fetcher.fetch(request).await {
            Ok(response) => Ok(FetchResponse::new(response, ResponseSource::Network)),
            Err(error) => self.cached_or(url, error).await,
        }
    }

    async fn cached_or(
        &self,
        url: Url,
        error: NetError,
    ) -> Result<FetchResponse, ServiceWorkerError> {
        match self.lookup(&url).await {
            Some(cached) => {
                debug!(url = %url, %error, "Network failed, serving from cache");
                Ok(FetchResponse::new(cached, ResponseSource::Cache))
            }
            None => Err(error.into()),
        }
    }

    /// Cross-partition lookup.
    async fn lookup(&self, url: &Url) -> Option<Response> {
        self.caches
            .read()
            .await
            .match_url(url)
            .map(|entry| entry.to_response())
    }

    /// Write `response` unless it is an error status.
    async fn store(&self, partition: &str, url: &Url, response: &Response) {
        if !response.ok() {
            debug!(url = %url, status = %response.status, "Not caching error response");
            return;
        }
        self.caches.write().await.open(partition).put(url, response);
        trace!(url = %url, partition, "Cached response");
    }
}

/// The fixed "Imagen no disponible" graphic.
pub fn image_placeholder(url: Url) -> Response {
    Response::new(url, StatusCode::OK)
        .with_header(CONTENT_TYPE, HeaderValue::from_static("image/svg+xml"))
        .with_header(CACHE_CONTROL, HeaderValue::from_static("no-store"))
        .with_body(IMAGE_PLACEHOLDER_SVG)
}
