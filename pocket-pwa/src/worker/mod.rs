//! Network interception layer
//!
//! A long-lived intermediary in front of the app origin. Every GET is
//! classified and served with one of three strategies; the transaction POST
//! is queued for background sync when the network is gone. Cache writes are
//! last-writer-wins, so any number of pages may share one worker.

pub mod cache;
pub mod classify;
pub mod lifecycle;
pub mod server;
pub mod upstream;

use bytes::Bytes;
use hyper::StatusCode;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::NetworkError;
use crate::queue::DurableQueue;
use crate::sync::{LedgerTransaction, SyncRegistry, BACKGROUND_SYNC_TAG};

pub use cache::{CacheNames, CacheStorage, CachedResponse};
pub use classify::{RequestClass, TRANSACTION_PATH};
pub use lifecycle::{spawn_install_task, WorkerMessage, WorkerState, OFFLINE_PAGE, SHELL_ASSETS};
pub use upstream::{FetchRequest, FetchResponse, HttpUpstream, Upstream};

/// Where a worker response came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Network,
    Cache,
    /// Made up locally because nothing else was available
    Synthetic,
    /// The offline page stood in for a failed navigation
    OfflinePage,
    /// A POST stored for background sync
    Queued,
}

#[derive(Debug)]
pub struct WorkerResponse {
    pub response: FetchResponse,
    pub source: ResponseSource,
    /// Background cache refresh started by stale-while-revalidate
    pub revalidation: Option<JoinHandle<()>>,
}

impl WorkerResponse {
    fn new(response: FetchResponse, source: ResponseSource) -> Self {
        Self {
            response,
            source,
            revalidation: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// App origin pages and assets come from
    pub origin: url::Url,
    /// Ledger origin for `/api` paths
    pub api_origin: url::Url,
    pub version: u32,
}

/// Origin-scoped interception worker
pub struct ServiceWorker {
    config: WorkerConfig,
    names: CacheNames,
    caches: Arc<CacheStorage>,
    upstream: Arc<dyn Upstream>,
    queue: Arc<DurableQueue>,
    registry: Arc<SyncRegistry>,
    state: watch::Sender<WorkerState>,
}

impl ServiceWorker {
    pub fn new(
        config: WorkerConfig,
        caches: Arc<CacheStorage>,
        upstream: Arc<dyn Upstream>,
        queue: Arc<DurableQueue>,
        registry: Arc<SyncRegistry>,
    ) -> Self {
        let (state, _) = watch::channel(WorkerState::Parsed);
        Self {
            names: CacheNames::for_version(config.version),
            config,
            caches,
            upstream,
            queue,
            registry,
            state,
        }
    }

    pub fn cache_names(&self) -> &CacheNames {
        &self.names
    }

    pub fn caches(&self) -> &Arc<CacheStorage> {
        &self.caches
    }

    /// Absolute upstream URL for a path and query
    pub fn resolve(&self, path_and_query: &str) -> Result<String, NetworkError> {
        let base = if path_and_query == "/api" || path_and_query.starts_with("/api/") {
            &self.config.api_origin
        } else {
            &self.config.origin
        };
        if !path_and_query.starts_with('/') {
            return Err(NetworkError::InvalidRequest(format!(
                "path must be absolute: {}",
                path_and_query
            )));
        }
        let url = base
            .join(path_and_query)
            .map_err(|e| NetworkError::InvalidRequest(e.to_string()))?;
        // Scheme-relative paths like `//host/x` would leave the origin
        if url.origin() != base.origin() {
            return Err(NetworkError::InvalidRequest(format!(
                "path leaves the origin: {}",
                path_and_query
            )));
        }
        Ok(url.to_string())
    }

    /// Runtime copies are fresher than install-time ones, so look there first
    fn lookup_order(&self) -> [&str; 2] {
        [self.names.dynamic_name.as_str(), self.names.static_name.as_str()]
    }

    /// Serve one request. Err only when a page fetch failed with nothing to
    /// fall back on.
    pub async fn handle(&self, request: FetchRequest) -> Result<WorkerResponse, NetworkError> {
        if !self.is_controlling() {
            let response = self.upstream.fetch(&request).await?;
            return Ok(WorkerResponse::new(response, ResponseSource::Network));
        }

        let class = RequestClass::classify(&request.method, &request.path());
        debug!(url = %request.url, class = ?class, "Intercepted request");

        match class {
            RequestClass::StaticAsset => Ok(self.cache_first(request).await),
            RequestClass::Api => Ok(self.network_first(request).await),
            RequestClass::Page => self.stale_while_revalidate(request).await,
            RequestClass::TransactionPost => Ok(self.queue_on_failure(request).await),
            RequestClass::Passthrough => {
                let response = self.upstream.fetch(&request).await?;
                Ok(WorkerResponse::new(response, ResponseSource::Network))
            }
        }
    }

    // =========================================================================
    // Strategies
    // =========================================================================

    async fn cache_first(&self, request: FetchRequest) -> WorkerResponse {
        if let Some(hit) = self.caches.match_in(&self.lookup_order(), &request.url) {
            return WorkerResponse::new(hit.to_response(), ResponseSource::Cache);
        }

        match self.upstream.fetch(&request).await {
            Ok(response) => {
                if response.is_success() {
                    self.caches
                        .put(&self.names.dynamic_name, &request.url, &response);
                }
                WorkerResponse::new(response, ResponseSource::Network)
            }
            Err(e) => {
                warn!(url = %request.url, error = %e, "Static asset unavailable");
                WorkerResponse::new(
                    FetchResponse::new(
                        StatusCode::SERVICE_UNAVAILABLE,
                        "text/plain",
                        Bytes::from_static(b"Offline"),
                    ),
                    ResponseSource::Synthetic,
                )
            }
        }
    }

    async fn network_first(&self, request: FetchRequest) -> WorkerResponse {
        match self.upstream.fetch(&request).await {
            Ok(response) => {
                if response.is_success() {
                    self.caches
                        .put(&self.names.dynamic_name, &request.url, &response);
                }
                WorkerResponse::new(response, ResponseSource::Network)
            }
            Err(e) => {
                debug!(url = %request.url, error = %e, "API fetch failed, trying cache");
                match self.caches.match_in(&self.lookup_order(), &request.url) {
                    Some(hit) => WorkerResponse::new(hit.to_response(), ResponseSource::Cache),
                    None => WorkerResponse::new(
                        FetchResponse::json(
                            StatusCode::SERVICE_UNAVAILABLE,
                            &serde_json::json!({ "error": "Offline" }),
                        ),
                        ResponseSource::Synthetic,
                    ),
                }
            }
        }
    }

    async fn stale_while_revalidate(
        &self,
        request: FetchRequest,
    ) -> Result<WorkerResponse, NetworkError> {
        if let Some(hit) = self.caches.match_in(&self.lookup_order(), &request.url) {
            let revalidation = self.spawn_revalidation(request);
            return Ok(WorkerResponse {
                response: hit.to_response(),
                source: ResponseSource::Cache,
                revalidation: Some(revalidation),
            });
        }

        match self.upstream.fetch(&request).await {
            Ok(response) => {
                if response.is_success() {
                    self.caches
                        .put(&self.names.dynamic_name, &request.url, &response);
                }
                Ok(WorkerResponse::new(response, ResponseSource::Network))
            }
            Err(e) if request.navigate => {
                let offline = self.resolve(OFFLINE_PAGE)?;
                match self.caches.match_in(&self.lookup_order(), &offline) {
                    Some(page) => {
                        info!(url = %request.url, "Serving offline page");
                        Ok(WorkerResponse::new(
                            page.to_response(),
                            ResponseSource::OfflinePage,
                        ))
                    }
                    None => Err(e),
                }
            }
            Err(e) => Err(e),
        }
    }

    fn spawn_revalidation(&self, request: FetchRequest) -> JoinHandle<()> {
        let upstream = Arc::clone(&self.upstream);
        let caches = Arc::clone(&self.caches);
        let cache_name = self.names.dynamic_name.clone();
        tokio::spawn(async move {
            match upstream.fetch(&request).await {
                Ok(response) if response.is_success() => {
                    caches.put(&cache_name, &request.url, &response);
                    debug!(url = %request.url, "Revalidated cached page");
                }
                Ok(response) => {
                    debug!(url = %request.url, status = %response.status, "Revalidation skipped")
                }
                Err(e) => debug!(url = %request.url, error = %e, "Revalidation failed"),
            }
        })
    }

    /// Forward the transaction POST; without a network, keep it for
    /// background sync instead
    async fn queue_on_failure(&self, request: FetchRequest) -> WorkerResponse {
        let error = match self.upstream.fetch(&request).await {
            Ok(response) => return WorkerResponse::new(response, ResponseSource::Network),
            Err(e) => e,
        };

        let tx: LedgerTransaction = match serde_json::from_slice(&request.body) {
            Ok(tx) => tx,
            Err(e) => {
                return WorkerResponse::new(
                    FetchResponse::json(
                        StatusCode::BAD_REQUEST,
                        &serde_json::json!({ "error": format!("Invalid transaction: {}", e) }),
                    ),
                    ResponseSource::Synthetic,
                );
            }
        };

        match self.queue.put(tx.into_new_transaction()).await {
            Ok(record) => {
                info!(id = %record.id, error = %error, "Ledger unreachable, transaction queued");
                if !self.registry.register(BACKGROUND_SYNC_TAG).await {
                    warn!("Background sync unavailable; replay waits for the next drain");
                }
                WorkerResponse::new(
                    FetchResponse::json(
                        StatusCode::ACCEPTED,
                        &serde_json::json!({ "queued": true, "id": record.id }),
                    ),
                    ResponseSource::Queued,
                )
            }
            Err(e) => {
                error!(error = %e, "Could not queue transaction");
                WorkerResponse::new(
                    FetchResponse::json(
                        StatusCode::SERVICE_UNAVAILABLE,
                        &serde_json::json!({ "error": "Offline" }),
                    ),
                    ResponseSource::Synthetic,
                )
            }
        }
    }
}
