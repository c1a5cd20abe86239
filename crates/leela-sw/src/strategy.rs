//! Strategy executors.
//!
//! Each strategy orders its network and cache operations differently:
//!
//! | Strategy               | Order                                   | On failure                    |
//! |------------------------|-----------------------------------------|-------------------------------|
//! | network-first          | network, then any cached copy           | propagate                     |
//! | cache-first            | any cached copy, then network           | propagate                     |
//! | stale-while-revalidate | cached copy now, network in background  | offline page if nothing else  |
//!
//! Cache lookups try the routed partition before all others. Only 2xx
//! responses are written. Concurrent writes to the same key are
//! last-writer-wins.

use std::sync::Arc;

use leela_net::{Fetcher, Request, Response};
use tracing::{debug, error, warn};
use url::Url;

use crate::background::BackgroundTasks;
use crate::cache::CacheStorage;
use crate::config::{CacheRole, WorkerConfig};
use crate::offline;
use crate::router::{Route, Strategy};
use crate::Result;

/// Strategy executors bound to a fetcher, the cache storage and the config.
pub struct Strategies<F> {
    fetcher: Arc<F>,
    storage: CacheStorage,
    config: Arc<WorkerConfig>,
    background: BackgroundTasks,
}

impl<F> Clone for Strategies<F> {
    fn clone(&self) -> Self {
        Self {
            fetcher: Arc::clone(&self.fetcher),
            storage: self.storage.clone(),
            config: Arc::clone(&self.config),
            background: self.background.clone(),
        }
    }
}

impl<F: Fetcher> Strategies<F> {
    pub fn new(
        fetcher: Arc<F>,
        storage: CacheStorage,
        config: Arc<WorkerConfig>,
        background: BackgroundTasks,
    ) -> Self {
        Self {
            fetcher,
            storage,
            config,
            background,
        }
    }

    /// Run the routed strategy. Failures of HTML requests become the offline
    /// page; other failures propagate.
    pub async fn respond(&self, request: Request, route: Route) -> Result<Response> {
        debug!(url = %request.url, strategy = ?route.strategy, "Handling request");

        let result = match route.strategy {
            Strategy::NetworkFirst => self.network_first(&request, route.partition).await,
            Strategy::CacheFirst => self.cache_first(&request, route.partition).await,
            Strategy::StaleWhileRevalidate => {
                self.stale_while_revalidate(&request, route.partition).await
            }
        };

        match result {
            Ok(response) => Ok(response),
            Err(err) => {
                error!(url = %request.url, strategy = ?route.strategy, error = %err, "Request failed");
                if request.accepts_html() {
                    Ok(self.offline_fallback(&request.url).await)
                } else {
                    Err(err)
                }
            }
        }
    }

    /// Network first, falling back to any cached copy when the fetch rejects.
    pub async fn network_first(&self, request: &Request, partition: CacheRole) -> Result<Response> {
        match self.fetcher.fetch(request.clone()).await {
            Ok(response) => {
                if response.ok() {
                    self.store(partition, request, &response).await;
                }
                Ok(response)
            }
            Err(err) => {
                if let Some(cached) = self.lookup(partition, request).await {
                    debug!(url = %request.url, error = %err, "Network failed, serving cached copy");
                    return Ok(cached);
                }
                Err(err.into())
            }
        }
    }

    /// Any cached copy without touching the network, otherwise fetch.
    pub async fn cache_first(&self, request: &Request, partition: CacheRole) -> Result<Response> {
        if let Some(cached) = self.lookup(partition, request).await {
            return Ok(cached);
        }

        let response = self.fetcher.fetch(request.clone()).await?;
        if response.ok() {
            self.store(partition, request, &response).await;
        }
        Ok(response)
    }

    /// Cached copy immediately while a background fetch refreshes the cache.
    pub async fn stale_while_revalidate(
        &self,
        request: &Request,
        partition: CacheRole,
    ) -> Result<Response> {
        let cached = self.lookup(partition, request).await;

        let revalidation = self.background.spawn(revalidate(
            Arc::clone(&self.fetcher),
            self.storage.clone(),
            self.config.cache_name(partition),
            request.clone(),
        ));

        if let Some(cached) = cached {
            // The handle is dropped; the revalidation keeps running detached.
            return Ok(cached);
        }

        match revalidation.await {
            Ok(Some(response)) => Ok(response),
            Ok(None) => Ok(self.offline_fallback(&request.url).await),
            Err(join_err) => {
                warn!(url = %request.url, error = %join_err, "Revalidation task aborted");
                Ok(self.offline_fallback(&request.url).await)
            }
        }
    }

    /// Cached shell document, or the synthesized offline page. Never fails.
    pub async fn offline_fallback(&self, url: &Url) -> Response {
        let shell_cache = self.config.cache_name(CacheRole::Static);

        for path in &self.config.offline.shell_documents {
            let Ok(shell_url) = self.config.resolve(path) else {
                continue;
            };
            if let Some(shell) = self
                .storage
                .match_in(&shell_cache, &Request::get(shell_url))
                .await
            {
                debug!(url = %url, shell = %path, "Serving cached shell document");
                return shell;
            }
        }

        debug!(url = %url, "Serving synthesized offline page");
        Response::html(url.clone(), offline::render_page(&self.config.offline.title))
    }

    /// Look in the routed partition, then in every partition. Revalidated
    /// copies land in the routed partition and must shadow install-time ones.
    async fn lookup(&self, partition: CacheRole, request: &Request) -> Option<Response> {
        let name = self.config.cache_name(partition);
        match self.storage.match_in(&name, request).await {
            Some(hit) => Some(hit),
            None => self.storage.match_request(request).await,
        }
    }

    async fn store(&self, partition: CacheRole, request: &Request, response: &Response) {
        let name = self.config.cache_name(partition);
        self.storage.put(&name, request, response).await;
    }
}

/// Background half of stale-while-revalidate. Failures are swallowed.
async fn revalidate<F: Fetcher>(
    fetcher: Arc<F>,
    storage: CacheStorage,
    cache_name: String,
    request: Request,
) -> Option<Response> {
    match fetcher.fetch(request.clone()).await {
        Ok(response) => {
            if response.ok() {
                storage.put(&cache_name, &request, &response).await;
            }
            Some(response)
        }
        Err(err) => {
            warn!(url = %request.url, error = %err, "Background revalidation failed");
            None
        }
    }
}
