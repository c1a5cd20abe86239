//! # Leela Net
//!
//! Request/response model and network access for the Leela offline worker.
//!
//! ## Design Goals
//!
//! 1. **Owned, cloneable responses**: a response can be handed to the page
//!    and written into a cache partition without re-reading the body
//! 2. **A single fetch seam**: everything above this crate talks to the
//!    network through [`Fetcher`], so strategies can be driven offline
//! 3. **fetch() semantics**: a connection failure rejects, any HTTP status
//!    resolves

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use http::header::{ACCEPT, CACHE_CONTROL, CONTENT_TYPE, ORIGIN, PRAGMA};
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use mime::Mime;
use reqwest::Client;
use thiserror::Error;
use tracing::{debug, info, trace};

pub use url::Url;

/// Errors that can occur in networking.
#[derive(Error, Debug)]
pub enum NetError {
    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Network unreachable: {0}")]
    Offline(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl NetError {
    /// True when the failure means the network could not be reached at all.
    pub fn is_offline(&self) -> bool {
        matches!(self, NetError::Offline(_))
    }
}

/// Unique identifier for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(u64);

impl RequestId {
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

/// How the request interacts with the HTTP-level cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMode {
    #[default]
    Default,
    /// Revalidate with the origin, bypassing any HTTP cache.
    NoCache,
    /// Use any HTTP-cached copy regardless of freshness.
    ForceCache,
}

/// CORS mode for requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestMode {
    #[default]
    SameOrigin,
    Cors,
    NoCors,
}

/// HTTP request.
#[derive(Debug, Clone)]
pub struct Request {
    pub id: RequestId,
    pub url: Url,
    pub method: Method,
    pub headers: HeaderMap,
    pub cache: CacheMode,
    pub mode: RequestMode,
    pub timeout: Option<Duration>,
}

impl Request {
    /// Create a GET request.
    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    /// Create a request with an arbitrary method.
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            id: RequestId::new(),
            url,
            method,
            headers: HeaderMap::new(),
            cache: CacheMode::Default,
            mode: RequestMode::SameOrigin,
            timeout: None,
        }
    }

    /// Parse `url` and create a GET request.
    pub fn parse(url: &str) -> Result<Self, NetError> {
        let url = Url::parse(url).map_err(|e| NetError::InvalidUrl(format!("{url}: {e}")))?;
        Ok(Self::get(url))
    }

    /// Add a header.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Set the `Accept` header.
    pub fn accept(self, value: &'static str) -> Self {
        self.header(ACCEPT, HeaderValue::from_static(value))
    }

    /// Set the HTTP cache mode.
    pub fn cache_mode(mut self, cache: CacheMode) -> Self {
        self.cache = cache;
        self
    }

    /// Set the CORS mode.
    pub fn mode(mut self, mode: RequestMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set timeout.
    pub fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }

    /// Get a header value as a string.
    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Whether the `Accept` header asks for an HTML document.
    pub fn accepts_html(&self) -> bool {
        let Some(accept) = self.header_str(ACCEPT.as_str()) else {
            return false;
        };
        accept
            .split(',')
            .filter_map(|range| range.trim().parse::<Mime>().ok())
            .any(|m| m.type_() == mime::TEXT && m.subtype() == mime::HTML)
    }

    /// Whether the URL scheme is http or https.
    pub fn is_http(&self) -> bool {
        matches!(self.url.scheme(), "http" | "https")
    }
}

/// HTTP response with a fully buffered body.
#[derive(Debug, Clone)]
pub struct Response {
    pub url: Url,
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// Set when the response was served from a cache partition.
    pub from_cache: bool,
    body: Bytes,
}

impl Response {
    /// Create a response.
    pub fn new(url: Url, status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self {
            url,
            status,
            headers,
            from_cache: false,
            body: body.into(),
        }
    }

    /// Create a `200 OK` HTML document.
    pub fn html(url: Url, body: impl Into<String>) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/html"));
        Self::new(url, StatusCode::OK, headers, body.into())
    }

    /// Check if request was successful (2xx).
    pub fn ok(&self) -> bool {
        self.status.is_success()
    }

    /// Borrow the body.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Get the body as bytes.
    pub fn bytes(&self) -> Bytes {
        self.body.clone()
    }

    /// Get the body as text.
    pub fn text(&self) -> Result<String, NetError> {
        String::from_utf8(self.body.to_vec()).map_err(|e| NetError::RequestFailed(e.to_string()))
    }

    /// Get the body as JSON.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, NetError> {
        serde_json::from_slice(&self.body).map_err(|e| NetError::RequestFailed(e.to_string()))
    }

    /// Parsed `Content-Type`.
    pub fn content_type(&self) -> Option<Mime> {
        self.header(CONTENT_TYPE.as_str())
            .and_then(|s| s.parse::<Mime>().ok())
    }

    /// Get a header value as a string.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Mark the response as served from cache.
    pub fn into_cached(mut self) -> Self {
        self.from_cache = true;
        self
    }
}

/// Something that can perform a network fetch.
///
/// Resolving with any status is a completed fetch; only transport failures
/// reject.
pub trait Fetcher: Send + Sync + 'static {
    fn fetch(&self, request: Request) -> impl Future<Output = Result<Response, NetError>> + Send;
}

/// Resource loader configuration.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// User agent string.
    pub user_agent: String,
    /// Overall timeout for requests that set none. Unset by default: a
    /// strategy waits for the network as long as the network takes.
    pub default_timeout: Option<Duration>,
    /// Connection establishment limit, in place of the browser's own
    /// connect timeout. Hitting it rejects the fetch as offline.
    pub connect_timeout: Duration,
    /// Maximum redirects.
    pub max_redirects: usize,
    /// Origin sent with CORS-mode requests.
    pub origin: Option<Url>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("Leela/{}", env!("CARGO_PKG_VERSION")),
            default_timeout: None,
            connect_timeout: Duration::from_secs(30),
            max_redirects: 10,
            origin: None,
        }
    }
}

/// reqwest-backed [`Fetcher`].
#[derive(Debug, Clone)]
pub struct ResourceLoader {
    client: Client,
    config: LoaderConfig,
}

impl ResourceLoader {
    /// Create a new resource loader.
    pub fn new(config: LoaderConfig) -> Result<Self, NetError> {
        let mut builder = Client::builder()
            .user_agent(&config.user_agent)
            .connect_timeout(config.connect_timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects));
        if let Some(timeout) = config.default_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| NetError::RequestFailed(e.to_string()))?;

        info!(user_agent = %config.user_agent, "ResourceLoader initialized");

        Ok(Self { client, config })
    }

    fn map_error(&self, request: &Request, err: reqwest::Error) -> NetError {
        if err.is_connect() {
            NetError::Offline(format!("{}: {err}", request.url))
        } else if err.is_timeout() {
            let limit = request
                .timeout
                .or(self.config.default_timeout)
                .unwrap_or(self.config.connect_timeout);
            NetError::Timeout(limit)
        } else {
            NetError::Http(err)
        }
    }

    async fn send(&self, request: Request) -> Result<Response, NetError> {
        debug!(url = %request.url, method = %request.method, cache = ?request.cache, "Fetching resource");

        let mut req_builder = self
            .client
            .request(request.method.clone(), request.url.clone());

        for (name, value) in request.headers.iter() {
            req_builder = req_builder.header(name, value);
        }

        if request.cache == CacheMode::NoCache {
            req_builder = req_builder
                .header(CACHE_CONTROL, "no-cache")
                .header(PRAGMA, "no-cache");
        }

        if request.mode == RequestMode::Cors {
            if let Some(ref origin) = self.config.origin {
                req_builder = req_builder.header(ORIGIN, origin.origin().ascii_serialization());
            }
        }

        if let Some(timeout) = request.timeout {
            req_builder = req_builder.timeout(timeout);
        }

        let response = req_builder
            .send()
            .await
            .map_err(|e| self.map_error(&request, e))?;

        let status = response.status();
        let headers = response.headers().clone();
        let url = response.url().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| self.map_error(&request, e))?;

        trace!(
            url = %url,
            status = %status,
            body_len = body.len(),
            "Response received"
        );

        Ok(Response::new(url, status, headers, body))
    }
}

impl Fetcher for ResourceLoader {
    fn fetch(&self, request: Request) -> impl Future<Output = Result<Response, NetError>> + Send {
        self.send(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_request_builder() {
        let url = Url::parse("https://example.com/api/services").unwrap();
        let request = Request::get(url.clone())
            .accept("application/json")
            .cache_mode(CacheMode::NoCache)
            .mode(RequestMode::Cors)
            .timeout(Duration::from_secs(10));

        assert_eq!(request.url, url);
        assert_eq!(request.method, Method::GET);
        assert_eq!(request.header_str("accept"), Some("application/json"));
        assert_eq!(request.cache, CacheMode::NoCache);
        assert_eq!(request.mode, RequestMode::Cors);
        assert_eq!(request.timeout, Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_request_id_uniqueness() {
        let id1 = RequestId::new();
        let id2 = RequestId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_accepts_html() {
        let nav = Request::parse("https://example.com/")
            .unwrap()
            .accept("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8");
        assert!(nav.accepts_html());

        let img = Request::parse("https://example.com/a.png")
            .unwrap()
            .accept("image/avif,image/webp,*/*");
        assert!(!img.accepts_html());

        let bare = Request::parse("https://example.com/").unwrap();
        assert!(!bare.accepts_html());
    }

    #[test]
    fn test_is_http() {
        assert!(Request::parse("https://example.com/").unwrap().is_http());
        assert!(Request::parse("http://example.com/").unwrap().is_http());
        assert!(!Request::parse("chrome-extension://abc/x.js")
            .unwrap()
            .is_http());
    }

    #[test]
    fn test_html_response() {
        let url = Url::parse("https://example.com/").unwrap();
        let response = Response::html(url, "<h1>hi</h1>");

        assert!(response.ok());
        assert!(!response.from_cache);
        assert_eq!(response.content_type(), Some(mime::TEXT_HTML));
        assert_eq!(response.text().unwrap(), "<h1>hi</h1>");
        assert!(response.into_cached().from_cache);
    }

    #[tokio::test]
    async fn test_loader_fetches_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/services"))
            .respond_with(ResponseTemplate::new(200).set_body_string("[\"thai\"]"))
            .mount(&server)
            .await;

        let loader = ResourceLoader::new(LoaderConfig::default()).unwrap();
        let request = Request::parse(&format!("{}/api/services", server.uri())).unwrap();
        let response = loader.fetch(request).await.unwrap();

        assert!(response.ok());
        let services: Vec<String> = response.json().unwrap();
        assert_eq!(services, vec!["thai".to_string()]);
    }

    #[tokio::test]
    async fn test_loader_resolves_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let loader = ResourceLoader::new(LoaderConfig::default()).unwrap();
        let request = Request::parse(&format!("{}/missing", server.uri())).unwrap();
        let response = loader.fetch(request).await.unwrap();

        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert!(!response.ok());
    }

    #[tokio::test]
    async fn test_loader_sends_no_cache() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/manifest.json"))
            .and(header("cache-control", "no-cache"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let loader = ResourceLoader::new(LoaderConfig::default()).unwrap();
        let request = Request::parse(&format!("{}/manifest.json", server.uri()))
            .unwrap()
            .cache_mode(CacheMode::NoCache);
        let response = loader.fetch(request).await.unwrap();

        assert!(response.ok());
    }

    #[tokio::test]
    async fn test_loader_rejects_when_unreachable() {
        let server = MockServer::start().await;
        let uri = server.uri();
        drop(server);

        let loader = ResourceLoader::new(LoaderConfig {
            connect_timeout: Duration::from_secs(2),
            ..Default::default()
        })
        .unwrap();
        let err = loader
            .fetch(Request::parse(&format!("{uri}/")).unwrap())
            .await
            .unwrap_err();

        assert!(err.is_offline());
    }

    #[test]
    fn test_default_config_has_no_overall_timeout() {
        let config = LoaderConfig::default();
        assert!(config.default_timeout.is_none());
        assert_eq!(config.connect_timeout, Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_slow_response_waits_without_request_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(300)))
            .mount(&server)
            .await;

        let loader = ResourceLoader::new(LoaderConfig::default()).unwrap();
        let url = format!("{}/slow", server.uri());

        let response = loader.fetch(Request::parse(&url).unwrap()).await.unwrap();
        assert!(response.ok());

        let err = loader
            .fetch(Request::parse(&url).unwrap().timeout(Duration::from_millis(50)))
            .await
            .unwrap_err();
        assert!(matches!(err, NetError::Timeout(d) if d == Duration::from_millis(50)));
    }
}
