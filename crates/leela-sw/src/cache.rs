//! Cache partitions and the storage that owns them.
//!
//! A [`Cache`] maps a normalized request to a captured response and keeps
//! insertion order, which the janitor uses as its recency proxy. The
//! [`CacheStorage`] handle is shared by every task; each call takes the lock
//! once, so single operations are atomic but sequences are not.

use std::collections::BTreeMap;
use std::sync::Arc;

use hashbrown::HashMap;
use http::header::VARY;
use http::{HeaderName, HeaderValue, Method};
use leela_net::{Request, Response};
use tokio::sync::RwLock;
use tracing::{debug, trace};
use url::Url;

// ==================== Keys ====================

/// Normalized request used as a cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    method: Method,
    url: String,
}

impl CacheKey {
    /// Key for a request; the URL fragment is ignored.
    pub fn from_request(request: &Request) -> Self {
        Self::new(request.method.clone(), &request.url)
    }

    /// Key for a GET of `url`.
    pub fn get(url: &Url) -> Self {
        Self::new(Method::GET, url)
    }

    fn new(method: Method, url: &Url) -> Self {
        let mut url = url.clone();
        url.set_fragment(None);
        Self {
            method,
            url: url.into(),
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

// ==================== Entries ====================

/// A cached request/response pair.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub response: Response,
    /// Request header values named by the response's `Vary` header.
    vary: Vec<(HeaderName, Option<HeaderValue>)>,
}

impl CacheEntry {
    /// Capture an entry, or `None` if the response varies on `*`.
    fn capture(request: &Request, response: &Response) -> Option<Self> {
        let mut vary = Vec::new();
        for value in response.headers.get_all(VARY) {
            let Ok(value) = value.to_str() else {
                continue;
            };
            for name in value.split(',').map(str::trim).filter(|n| !n.is_empty()) {
                if name == "*" {
                    return None;
                }
                if let Ok(name) = HeaderName::try_from(name) {
                    let captured = request.headers.get(&name).cloned();
                    vary.push((name, captured));
                }
            }
        }

        Some(Self {
            key: CacheKey::from_request(request),
            response: response.clone(),
            vary,
        })
    }

    /// Whether the request's varying headers match the captured ones.
    fn matches_vary(&self, request: &Request) -> bool {
        self.vary
            .iter()
            .all(|(name, value)| request.headers.get(name) == value.as_ref())
    }
}

// ==================== Cache ====================

/// A cache partition.
#[derive(Debug, Default)]
pub struct Cache {
    /// Cache name.
    pub name: String,

    /// Entries with their insertion sequence number.
    entries: HashMap<CacheKey, (u64, CacheEntry)>,

    /// Insertion order, oldest first.
    order: BTreeMap<u64, CacheKey>,

    next_seq: u64,
}

impl Cache {
    /// Create a new cache.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// Match a request.
    pub fn match_request(&self, request: &Request) -> Option<&CacheEntry> {
        self.entries
            .get(&CacheKey::from_request(request))
            .map(|(_, entry)| entry)
            .filter(|entry| entry.matches_vary(request))
    }

    /// Store a response. An existing entry for the same key is replaced and
    /// becomes the newest. Returns false if the response cannot be cached.
    pub fn put(&mut self, request: &Request, response: &Response) -> bool {
        let Some(entry) = CacheEntry::capture(request, response) else {
            debug!(cache = %self.name, url = %request.url, "Vary: * response not cached");
            return false;
        };

        let seq = self.next_seq;
        self.next_seq += 1;

        let key = entry.key.clone();
        if let Some((old_seq, _)) = self.entries.insert(key.clone(), (seq, entry)) {
            self.order.remove(&old_seq);
        }
        self.order.insert(seq, key);
        true
    }

    /// Delete entry.
    pub fn delete(&mut self, key: &CacheKey) -> bool {
        match self.entries.remove(key) {
            Some((seq, _)) => {
                self.order.remove(&seq);
                true
            }
            None => false,
        }
    }

    /// Delete the `count` oldest entries. Returns how many were removed.
    pub fn delete_oldest(&mut self, count: usize) -> usize {
        let oldest: Vec<u64> = self.order.keys().take(count).copied().collect();
        for seq in &oldest {
            if let Some(key) = self.order.remove(seq) {
                self.entries.remove(&key);
            }
        }
        oldest.len()
    }

    /// All keys, oldest first.
    pub fn keys(&self) -> Vec<CacheKey> {
        self.order.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ==================== Cache Storage ====================

#[derive(Debug, Default)]
struct StorageInner {
    caches: HashMap<String, Cache>,
    /// Partition names in creation order.
    order: Vec<String>,
}

impl StorageInner {
    fn open(&mut self, name: &str) -> &mut Cache {
        if !self.caches.contains_key(name) {
            debug!(cache = %name, "Creating cache partition");
            self.order.push(name.to_string());
        }
        self.caches
            .entry(name.to_string())
            .or_insert_with(|| Cache::new(name))
    }
}

/// Shared cache storage (the `caches` global).
#[derive(Debug, Clone, Default)]
pub struct CacheStorage {
    inner: Arc<RwLock<StorageInner>>,
}

impl CacheStorage {
    /// Create new cache storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the partition if it does not exist.
    pub async fn open(&self, name: &str) {
        self.inner.write().await.open(name);
    }

    /// Check if cache exists.
    pub async fn has(&self, name: &str) -> bool {
        self.inner.read().await.caches.contains_key(name)
    }

    /// Delete a cache.
    pub async fn delete(&self, name: &str) -> bool {
        let mut inner = self.inner.write().await;
        inner.order.retain(|n| n != name);
        inner.caches.remove(name).is_some()
    }

    /// All cache names in creation order.
    pub async fn keys(&self) -> Vec<String> {
        self.inner.read().await.order.clone()
    }

    /// Match across all caches, oldest partition first.
    pub async fn match_request(&self, request: &Request) -> Option<Response> {
        let inner = self.inner.read().await;
        let found = inner
            .order
            .iter()
            .filter_map(|name| inner.caches.get(name))
            .find_map(|cache| cache.match_request(request));

        trace!(url = %request.url, hit = found.is_some(), "Cache lookup");
        found.map(|entry| entry.response.clone().into_cached())
    }

    /// Match within one partition. A missing partition is a miss.
    pub async fn match_in(&self, name: &str, request: &Request) -> Option<Response> {
        let inner = self.inner.read().await;
        inner
            .caches
            .get(name)
            .and_then(|cache| cache.match_request(request))
            .map(|entry| entry.response.clone().into_cached())
    }

    /// Store a response, creating the partition if needed.
    pub async fn put(&self, name: &str, request: &Request, response: &Response) -> bool {
        let stored = self.inner.write().await.open(name).put(request, response);
        if stored {
            debug!(cache = %name, url = %request.url, status = %response.status, "Cached response");
        }
        stored
    }

    /// Delete one entry from a partition.
    pub async fn delete_entry(&self, name: &str, key: &CacheKey) -> bool {
        match self.inner.write().await.caches.get_mut(name) {
            Some(cache) => cache.delete(key),
            None => false,
        }
    }

    /// Keys of one partition, oldest first.
    pub async fn entry_keys(&self, name: &str) -> Vec<CacheKey> {
        self.inner
            .read()
            .await
            .caches
            .get(name)
            .map(Cache::keys)
            .unwrap_or_default()
    }

    /// Entry count of one partition.
    pub async fn len(&self, name: &str) -> usize {
        self.inner
            .read()
            .await
            .caches
            .get(name)
            .map(Cache::len)
            .unwrap_or(0)
    }

    /// Run `f` on a partition under the write lock.
    pub async fn with_cache<T>(&self, name: &str, f: impl FnOnce(&mut Cache) -> T) -> Option<T> {
        self.inner.write().await.caches.get_mut(name).map(f)
    }
}
